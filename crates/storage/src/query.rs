//! Query model
//!
//! A small typed operator algebra over one table. Operators fall into three
//! families, and the family decides how the filter value string is read:
//!
//! | Family  | Ops                     | Value                               |
//! |---------|-------------------------|-------------------------------------|
//! | Integer | eq ne lt lte gt gte     | signed integer literal              |
//! | String  | exact like prefix suffix| raw string                          |
//! | Time    | since until             | `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d`, or a duration meaning `now - d` |
//!
//! `after`/`before` are exclusive cursor bounds. `since` cannot be combined
//! with `after` (nor `until` with `before`): the combination has no useful
//! pagination meaning, so such queries return no rows by definition.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::QueryError;

const TIME_LAYOUT_FULL: &str = "%Y-%m-%d %H:%M:%S";
const TIME_LAYOUT_DATE: &str = "%Y-%m-%d";

/// One filter predicate with its parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub op: FilterOp,
}

/// Typed filter operator. The value is parsed when the filter is added, so
/// the storage driver never sees raw client input.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(i64),
    Ne(i64),
    Lt(i64),
    Lte(i64),
    Gt(i64),
    Gte(i64),
    Exact(String),
    Like(String),
    Prefix(String),
    Suffix(String),
    /// Records at or after the instant (exclusive, epoch ms).
    Since(i64),
    /// Records before the instant (exclusive, epoch ms).
    Until(i64),
}

/// Builder for one table query.
#[derive(Debug, Clone)]
pub struct Query {
    name: String,
    limit: Option<i64>,
    after: Option<i64>,
    before: Option<i64>,
    filters: Vec<Filter>,
}

impl Query {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            after: None,
            before: None,
            filters: Vec::new(),
        }
    }

    pub fn set_limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    /// Exclusive lower cursor bound; forces an ascending scan.
    pub fn set_after(&mut self, cursor: i64) {
        self.after = Some(cursor);
    }

    /// Exclusive upper cursor bound; forces a descending scan.
    pub fn set_before(&mut self, cursor: i64) {
        self.before = Some(cursor);
    }

    /// Add a filter, parsing `value` according to the operator family.
    pub fn set_filter(&mut self, name: &str, op: &str, value: &str) -> Result<(), QueryError> {
        self.set_filter_at(name, op, value, Utc::now())
    }

    /// Like [`set_filter`](Self::set_filter) with the wall clock injected,
    /// so relative time values are testable.
    pub fn set_filter_at(
        &mut self,
        name: &str,
        op: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueryError> {
        let op = match op {
            "eq" => FilterOp::Eq(parse_int(name, value)?),
            "ne" => FilterOp::Ne(parse_int(name, value)?),
            "lt" => FilterOp::Lt(parse_int(name, value)?),
            "lte" => FilterOp::Lte(parse_int(name, value)?),
            "gt" => FilterOp::Gt(parse_int(name, value)?),
            "gte" => FilterOp::Gte(parse_int(name, value)?),
            "exact" => FilterOp::Exact(value.to_string()),
            "like" => FilterOp::Like(value.to_string()),
            "prefix" => FilterOp::Prefix(value.to_string()),
            "suffix" => FilterOp::Suffix(value.to_string()),
            "since" => FilterOp::Since(parse_time(name, value, now)?),
            "until" => FilterOp::Until(parse_time(name, value, now)?),
            unknown => return Err(QueryError::UnknownOp(unknown.to_string())),
        };

        self.filters.push(Filter {
            name: name.to_string(),
            op,
        });
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn after(&self) -> Option<i64> {
        self.after
    }

    pub fn before(&self) -> Option<i64> {
        self.before
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

fn parse_int(field: &str, value: &str) -> Result<i64, QueryError> {
    value.parse().map_err(|_| QueryError::InvalidInt {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Absolute `%Y-%m-%d %H:%M:%S` or `%Y-%m-%d` (midnight UTC), otherwise a
/// duration interpreted as `now - duration`.
fn parse_time(field: &str, value: &str, now: DateTime<Utc>) -> Result<i64, QueryError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, TIME_LAYOUT_FULL) {
        return Ok(dt.and_utc().timestamp_millis());
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, TIME_LAYOUT_DATE) {
        return Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
    }

    if let Ok(duration) = lodge_timing::duration::parse(value) {
        return Ok(now.timestamp_millis() - duration.as_millis() as i64);
    }

    Err(QueryError::InvalidTime {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
#[path = "query_model_test.rs"]
mod query_model_test;
