//! Offset pagination over the EIA data routes.
//!
//! Pages are requested one at a time; the next request is only issued once
//! every record of the previous page has been consumed. Callers wanting
//! parallel retrieval run independent fetches, each with its own cursor.

use std::future::Future;

use async_stream::try_stream;
use futures::Stream;
use serde_json::{Map, Value};

use crate::error::RenewVizError;

/// A record as it comes off the wire, before mapping.
pub type RawRecord = Map<String, Value>;

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Upstream's count of matching records, when it reports one.
    pub total: Option<usize>,
}

impl Page {
    pub fn new(records: Vec<RawRecord>, total: Option<usize>) -> Self {
        Self { records, total }
    }

    pub fn returned(&self) -> usize {
        self.records.len()
    }
}

/// Position of one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCursor {
    pub offset: usize,
    pub emitted: usize,
    pub max_records: Option<usize>,
}

impl FetchCursor {
    pub fn new(max_records: Option<usize>) -> Self {
        Self {
            offset: 0,
            emitted: 0,
            max_records,
        }
    }

    /// Counts one emitted record and reports whether the cap is reached.
    pub fn record_emitted(&mut self) -> bool {
        self.emitted += 1;
        self.cap_reached()
    }

    pub fn cap_reached(&self) -> bool {
        self.max_records.is_some_and(|max| self.emitted >= max)
    }

    /// Moves past a page and reports whether another page should be requested.
    ///
    /// A short page is taken as the last one. That is an assumption about the
    /// upstream rather than a documented contract, so the reported total is
    /// checked as well and either condition ends the fetch.
    pub fn advance(&mut self, page: &Page, page_size: usize) -> bool {
        self.offset += page.returned();
        let short_page = page.returned() < page_size;
        let past_total = page.total.is_some_and(|total| self.offset >= total);
        !(short_page || past_total)
    }
}

/// Streams every record produced by `request_page`, one page at a time.
///
/// `request_page` receives `(offset, page_size)`. The stream ends on an empty
/// page, a short page, once the reported total is reached, or as soon as
/// `max_records` records were yielded (without requesting another page).
/// The first error ends the stream.
pub fn fetch_all<F, Fut>(
    mut request_page: F,
    page_size: usize,
    max_records: Option<usize>,
) -> impl Stream<Item = Result<RawRecord, RenewVizError>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Page, RenewVizError>>,
{
    let page_size = page_size.max(1);
    try_stream! {
        let mut cursor = FetchCursor::new(max_records);
        'pages: while !cursor.cap_reached() {
            let page = request_page(cursor.offset, page_size).await?;
            if page.records.is_empty() {
                break;
            }

            let more = cursor.advance(&page, page_size);
            for record in page.records {
                yield record;
                if cursor.record_emitted() {
                    break 'pages;
                }
            }
            if !more {
                break;
            }
        }
    }
}
