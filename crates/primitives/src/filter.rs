//! In-memory filtering and pagination over bulk-fetched documents
//!
//! Collections are fetched whole (see [`crate::entity`]) and narrowed here.
//! Predicates apply to top-level fields only and combine with AND
//! semantics. A document lacking a filtered field never matches.
//!
//! Pages keep the order of the input. Nothing here sorts unless the caller
//! asks for it with [`sort_by_field`].

use canvass_core::{JsonScalar, Timestamp};
use canvass_engine::StoreConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Limit used when the caller gives none
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// A single predicate on one top-level field
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals a scalar
    Eq {
        /// Field name
        field: String,
        /// Expected value
        value: JsonScalar,
    },
    /// Field holds a date within `[from, to]`; either bound may be open
    DateRange {
        /// Field name
        field: String,
        /// Inclusive lower bound
        from: Option<Timestamp>,
        /// Inclusive upper bound
        to: Option<Timestamp>,
    },
}

impl Predicate {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Predicate::Eq { field, value } => {
                doc.get(field).is_some_and(|actual| value.matches_json(actual))
            }
            Predicate::DateRange { field, from, to } => {
                let Some(at) = doc.get(field).and_then(date_of) else {
                    return false;
                };
                from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
            }
        }
    }
}

/// Document filter (AND of predicates)
///
/// ```
/// use canvass_primitives::filter::Filter;
/// use serde_json::json;
///
/// let filter = Filter::new().status("active").eq("territoryId", "t1");
/// assert!(filter.matches(&json!({"status": "active", "territoryId": "t1"})));
/// assert!(!filter.matches(&json!({"status": "active"})));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonScalar>) -> Self {
        self.predicates.push(Predicate::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Shorthand for `eq("status", ..)`
    pub fn status(self, status: impl Into<String>) -> Self {
        self.eq("status", JsonScalar::String(status.into()))
    }

    /// Shorthand for `eq("type", ..)`
    pub fn kind(self, kind: impl Into<String>) -> Self {
        self.eq("type", JsonScalar::String(kind.into()))
    }

    /// Add an inclusive date range on `field`
    ///
    /// The field may hold an RFC 3339 string, a `YYYY-MM-DD` date, or a
    /// number of epoch millis.
    pub fn date_range(
        mut self,
        field: impl Into<String>,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Self {
        self.predicates.push(Predicate::DateRange {
            field: field.into(),
            from,
            to,
        });
        self
    }

    /// Whether `doc` satisfies every predicate
    pub fn matches(&self, doc: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }

    /// Check if filter is empty (matches all)
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// The predicates, in insertion order
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC)
pub fn parse_date(s: &str) -> Option<Timestamp> {
    if let Some(ts) = Timestamp::parse_rfc3339(s) {
        return Some(ts);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let millis = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
    u64::try_from(millis).ok().map(Timestamp::from_millis)
}

fn date_of(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n.as_u64().map(Timestamp::from_millis),
        _ => None,
    }
}

/// Offset/limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Items to skip
    pub offset: usize,
    /// Maximum items returned
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Window of `limit` items starting at `offset`
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// First page with the configured default limit
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            offset: 0,
            limit: config.pagination.default_limit,
        }
    }

    /// Cap the limit at `max_limit`
    pub fn clamp(self, max_limit: usize) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.min(max_limit),
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Size of the whole (filtered) result
    pub total: usize,
    /// Offset this page starts at
    pub offset: usize,
    /// Limit requested
    pub limit: usize,
}

impl<T> Page<T> {
    /// Whether items remain past this page
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }
}

/// Slice `items` to the window; out-of-range windows give an empty page
pub fn paginate<T>(items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len();
    let page: Vec<T> = items
        .into_iter()
        .skip(pagination.offset)
        .take(pagination.limit)
        .collect();
    Page {
        items: page,
        total,
        offset: pagination.offset,
        limit: pagination.limit,
    }
}

/// Something with a JSON view the filter can inspect
pub trait Document {
    /// JSON form of the document
    fn as_json(&self) -> &Value;
}

impl Document for Value {
    fn as_json(&self) -> &Value {
        self
    }
}

impl Document for (String, Value) {
    fn as_json(&self) -> &Value {
        &self.1
    }
}

/// Keep matching items, then paginate
pub fn filter_and_paginate<T: Document>(
    items: Vec<T>,
    filter: &Filter,
    pagination: Pagination,
) -> Page<T> {
    let matching: Vec<T> = items
        .into_iter()
        .filter(|item| filter.matches(item.as_json()))
        .collect();
    paginate(matching, pagination)
}

/// Stable sort on a top-level field
///
/// Mixed values order as missing < null < bool < number < string; arrays
/// and objects sort after strings and compare equal to each other.
pub fn sort_by_field<T: Document>(items: &mut [T], field: &str, order: SortOrder) {
    items.sort_by(|a, b| {
        let ord = compare_field(a.as_json().get(field), b.as_json().get(field));
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(_) => 5,
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
