use chrono::{TimeZone, Utc};

use super::{FilterOp, Query};
use crate::error::QueryError;

#[test]
fn test_integer_ops() {
    let mut q = Query::new("t");
    q.set_filter("status", "eq", "200").unwrap();
    q.set_filter("status", "ne", "-1").unwrap();
    q.set_filter("status", "lt", "500").unwrap();
    q.set_filter("status", "lte", "500").unwrap();
    q.set_filter("status", "gt", "100").unwrap();
    q.set_filter("status", "gte", "100").unwrap();

    assert_eq!(q.filters().len(), 6);
    assert_eq!(q.filters()[0].op, FilterOp::Eq(200));
    assert_eq!(q.filters()[1].op, FilterOp::Ne(-1));
}

#[test]
fn test_integer_op_rejects_non_integer() {
    let mut q = Query::new("t");
    assert_eq!(
        q.set_filter("status", "eq", "abc"),
        Err(QueryError::InvalidInt {
            field: "status".to_string(),
            value: "abc".to_string(),
        })
    );
}

#[test]
fn test_string_ops_take_raw_value() {
    let mut q = Query::new("t");
    q.set_filter("message", "exact", "apple").unwrap();
    q.set_filter("message", "like", "app le").unwrap();
    q.set_filter("message", "prefix", "123").unwrap();
    q.set_filter("message", "suffix", "").unwrap();

    assert_eq!(q.filters()[0].op, FilterOp::Exact("apple".to_string()));
    assert_eq!(q.filters()[1].op, FilterOp::Like("app le".to_string()));
    assert_eq!(q.filters()[2].op, FilterOp::Prefix("123".to_string()));
}

#[test]
fn test_unknown_op() {
    let mut q = Query::new("t");
    assert_eq!(
        q.set_filter("status", "between", "1"),
        Err(QueryError::UnknownOp("between".to_string()))
    );
}

#[test]
fn test_time_absolute_datetime() {
    let mut q = Query::new("t");
    q.set_filter("time", "since", "2025-01-02 13:00:00").unwrap();
    assert_eq!(q.filters()[0].op, FilterOp::Since(1735822800000));
}

#[test]
fn test_time_absolute_date_is_midnight() {
    let mut q = Query::new("t");
    q.set_filter("time", "until", "2025-01-02").unwrap();

    let want = Utc
        .with_ymd_and_hms(2025, 1, 2, 0, 0, 0)
        .unwrap()
        .timestamp_millis();
    assert_eq!(q.filters()[0].op, FilterOp::Until(want));
}

#[test]
fn test_time_relative_duration() {
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 13, 0, 0).unwrap();
    let mut q = Query::new("t");
    q.set_filter_at("time", "since", "1h", now).unwrap();

    let want = Utc
        .with_ymd_and_hms(2025, 1, 2, 12, 0, 0)
        .unwrap()
        .timestamp_millis();
    assert_eq!(q.filters()[0].op, FilterOp::Since(want));
}

#[test]
fn test_time_invalid_value() {
    let mut q = Query::new("t");
    assert_eq!(
        q.set_filter("time", "since", "yesterday"),
        Err(QueryError::InvalidTime {
            field: "time".to_string(),
            value: "yesterday".to_string(),
        })
    );
}

#[test]
fn test_builder_accessors() {
    let mut q = Query::new("nginx");
    q.set_limit(10);
    q.set_after(2);

    assert_eq!(q.name(), "nginx");
    assert_eq!(q.limit(), Some(10));
    assert_eq!(q.after(), Some(2));
    assert_eq!(q.before(), None);
}
