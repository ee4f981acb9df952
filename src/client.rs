//! EIA API v2 client.
//!
//! Every call goes through the retry policy and is re-fetched from the
//! remote source; nothing is cached.

use std::sync::Arc;

use futures::{Stream, TryStreamExt};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, MAX_PAGE_SIZE};
use crate::error::RenewVizError;
use crate::models::{FacetValue, FromRecord};
use crate::pagination::{self, Page, RawRecord};
use crate::query::{page_pairs, FilterSpec, QueryPairs};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, RawResponse, Transport};

/// Longest slice of an error body echoed into error messages.
const ERROR_EXCERPT_CHARS: usize = 200;

pub struct EiaClient {
    config: Config,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl EiaClient {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let retry = RetryPolicy::new(config.max_retries);
        Self {
            config,
            transport,
            retry,
        }
    }

    /// Client over a pooled reqwest transport.
    pub fn from_config(config: Config) -> Result<Self, RenewVizError> {
        Ok(Self::new(config, Arc::new(HttpTransport::new()?)))
    }

    /// Page size to use when at most `max_records` records are wanted.
    pub fn page_size_for(&self, max_records: Option<usize>) -> usize {
        match max_records {
            Some(max) => max.clamp(1, self.config.page_size),
            None => self.config.page_size,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }

    fn data_url(&self, route: &str) -> String {
        let route = route.trim_matches('/');
        if route.ends_with("/data") {
            self.url(route)
        } else {
            self.url(&format!("{route}/data"))
        }
    }

    fn credentials(&self) -> QueryPairs {
        vec![("api_key".to_string(), self.config.api_key.clone())]
    }

    /// GET with retries, returning the decoded JSON body.
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, RenewVizError> {
        let timeout = self.config.timeout;
        let response = self
            .retry
            .run(|attempt| async move {
                if attempt > 0 {
                    debug!("Retry {} for {}", attempt, url);
                }
                let response = self.transport.send(Method::GET, url, query, timeout).await?;
                check_status(url, response)
            })
            .await?;

        serde_json::from_slice(&response.body).map_err(|e| {
            RenewVizError::InvalidApiResponse(format!("body from {url} is not JSON: {e}"))
        })
    }

    /// Fetches one page of `route`.
    pub async fn get_data(
        &self,
        route: &str,
        filter: &FilterSpec,
        offset: usize,
        length: usize,
    ) -> Result<Page, RenewVizError> {
        let mut query = self.credentials();
        query.extend(filter.to_query_pairs());
        query.extend(page_pairs(offset, length));

        debug!(route, offset, length, "Requesting page");
        let body = self.get_json(&self.data_url(route), &query).await?;
        let page = parse_page(body)?;
        debug!(
            route,
            offset,
            returned = page.returned(),
            total = ?page.total,
            "Received page"
        );
        Ok(page)
    }

    /// Streams raw records of `route`, page by page.
    ///
    /// `page_size` is clamped to what a single request may return.
    pub fn fetch_all<'a>(
        &'a self,
        route: &'a str,
        filter: &'a FilterSpec,
        page_size: usize,
        max_records: Option<usize>,
    ) -> impl Stream<Item = Result<RawRecord, RenewVizError>> + Send + 'a {
        pagination::fetch_all(
            move |offset, length| self.get_data(route, filter, offset, length),
            page_size.clamp(1, MAX_PAGE_SIZE),
            max_records,
        )
    }

    /// Fetches and maps every record of `route`, up to `max_records`.
    pub async fn fetch_typed<E: FromRecord>(
        &self,
        route: &str,
        filter: &FilterSpec,
        page_size: usize,
        max_records: Option<usize>,
    ) -> Result<Vec<E>, RenewVizError> {
        self.fetch_all(route, filter, page_size, max_records)
            .map_ok(|raw| E::from_record(&raw))
            .try_collect()
            .await
    }

    /// [`fetch_typed`](Self::fetch_typed) with a page size fitted to the cap.
    pub async fn fetch_capped<E: FromRecord>(
        &self,
        route: &str,
        filter: &FilterSpec,
        max_records: Option<usize>,
    ) -> Result<Vec<E>, RenewVizError> {
        let page_size = self.page_size_for(max_records);
        self.fetch_typed(route, filter, page_size, max_records).await
    }

    /// Route metadata: description, facets, data columns, frequencies.
    pub async fn route_metadata(&self, route: &str) -> Result<Value, RenewVizError> {
        self.get_json(&self.url(route), &self.credentials()).await
    }

    /// Selectable values of one facet of `route`.
    pub async fn facet_values(
        &self,
        route: &str,
        facet: &str,
    ) -> Result<Vec<FacetValue>, RenewVizError> {
        let url = self.url(&format!("{}/facet/{}", route.trim_matches('/'), facet));
        let mut body = self.get_json(&url, &self.credentials()).await?;
        let facets = body
            .get_mut("response")
            .and_then(|r| r.get_mut("facets"))
            .map(Value::take)
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(facets)?)
    }
}

/// Maps HTTP statuses onto the error taxonomy.
fn check_status(url: &str, response: RawResponse) -> Result<RawResponse, RenewVizError> {
    match response.status {
        401 => Err(RenewVizError::AuthenticationFailure),
        429 => Err(RenewVizError::RateLimited),
        404 => Err(RenewVizError::NotFound(url.to_string())),
        status if status >= 400 => Err(RenewVizError::RequestFailed {
            status: Some(status),
            message: format!("HTTP {}: {}", status, error_excerpt(&response)),
        }),
        _ => Ok(response),
    }
}

/// The `error` field of a JSON error body, or the start of the raw text.
fn error_excerpt(response: &RawResponse) -> String {
    let text = match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Object(map)) => match map.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => response.text(),
        },
        _ => response.text(),
    };
    text.chars().take(ERROR_EXCERPT_CHARS).collect()
}

/// Reads `response.data` and `response.total` from a data-route body.
fn parse_page(body: Value) -> Result<Page, RenewVizError> {
    let Value::Object(mut root) = body else {
        return Err(RenewVizError::InvalidApiResponse(
            "expected a JSON object".into(),
        ));
    };
    let Some(Value::Object(mut response)) = root.remove("response") else {
        return Err(RenewVizError::InvalidApiResponse(
            "missing `response` object".into(),
        ));
    };

    let records = match response.remove("data") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(RenewVizError::InvalidApiResponse(format!(
                "`response.data` is not an array: {other}"
            )))
        }
    };

    // The API reports `total` as a string; accept numbers too.
    let total = match response.get("total") {
        Some(Value::Number(n)) => n.as_u64().map(|t| t as usize),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Ok(Page::new(records, total))
}
