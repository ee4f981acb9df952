//! Filter specifications and their EIA wire encoding.
//!
//! The EIA v2 API takes bracketed, repeated query keys (`data[]`,
//! `facets[stateid][]`, `sort[0][column]`), so the encoding is an ordered
//! list of pairs rather than a map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::config::MAX_PAGE_SIZE;
use crate::error::RenewVizError;

/// An ordered list of query parameters.
pub type QueryPairs = Vec<(String, String)>;

/// Sampling frequency of time-series routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Hourly,
    Daily,
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::Hourly,
        Frequency::Daily,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::Annual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annual => "annual",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = RenewVizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RenewVizError::BadRequest(format!(
                    "unknown frequency {s:?}, expected one of {}",
                    Self::ALL.map(Frequency::as_str).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = RenewVizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(RenewVizError::BadRequest(format!(
                "unknown sort direction {other:?}, expected asc or desc"
            ))),
        }
    }
}

/// What to ask the API for, independent of pagination.
///
/// Facet values are OR-ed within a facet and facets are AND-ed together at
/// the remote end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub columns: Vec<String>,
    pub facets: BTreeMap<String, BTreeSet<String>>,
    pub frequency: Option<Frequency>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub sort: Vec<(String, SortDirection)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds values to a facet. An empty value list leaves the facet unset.
    pub fn facet<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.facets.entry(name.into()).or_default().extend(values);
        }
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((column.into(), direction));
        self
    }

    /// Encodes the filter as query pairs: columns, facets, sort, then scalars.
    pub fn to_query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();

        for column in &self.columns {
            pairs.push(("data[]".into(), column.clone()));
        }

        for (name, values) in &self.facets {
            let key = format!("facets[{name}][]");
            for value in values {
                pairs.push((key.clone(), value.clone()));
            }
        }

        for (i, (column, direction)) in self.sort.iter().enumerate() {
            pairs.push((format!("sort[{i}][column]"), column.clone()));
            pairs.push((format!("sort[{i}][direction]"), direction.as_str().into()));
        }

        if let Some(frequency) = self.frequency {
            pairs.push(("frequency".into(), frequency.as_str().into()));
        }
        if let Some(ref start) = self.start {
            pairs.push(("start".into(), start.clone()));
        }
        if let Some(ref end) = self.end {
            pairs.push(("end".into(), end.clone()));
        }

        pairs
    }
}

/// Pagination scalars, appended after the filter pairs.
///
/// `length` is clamped to the API ceiling instead of failing, and a zero
/// offset is left out the way the API's own examples do.
pub fn page_pairs(offset: usize, length: usize) -> QueryPairs {
    let mut pairs = vec![("length".to_string(), length.min(MAX_PAGE_SIZE).to_string())];
    if offset > 0 {
        pairs.push(("offset".into(), offset.to_string()));
    }
    pairs
}
