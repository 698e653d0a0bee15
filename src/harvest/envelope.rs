//! Envelope normalization. The endpoint has returned several envelope layouts
//! over time; extraction dispatches over the known shapes in precedence order
//! and degrades to "no records, zero totals" when none match. It never fails.

use crate::model::Record;
use serde_json::Value;

/// Normalized content of one page: records plus the pagination counters the
/// envelope carried (0 when absent).
#[derive(Debug, Default, PartialEq)]
pub struct PageData {
    pub records: Vec<Record>,
    pub total_rows: u64,
    pub total_pages: u32,
}

/// Extract records and pagination counters from an envelope.
///
/// Shape precedence:
/// 1. `data` is an object: records from `data.list`, else `data.records`.
/// 2. `data` is an array: records are that array.
/// 3. top-level `records` array.
/// 4. the envelope itself is an array.
/// 5. anything else: empty.
///
/// Counters come from `data.totalRow`/`data.totalPage` when `data` is an
/// object, otherwise from top-level `total`/`pages`. The same records yield
/// the same result regardless of which shape carried them.
pub fn extract(envelope: &Value) -> PageData {
    let records = match envelope.get("data") {
        Some(Value::Object(data)) => data
            .get("list")
            .and_then(Value::as_array)
            .or_else(|| data.get("records").and_then(Value::as_array))
            .map(|a| collect_records(a))
            .unwrap_or_default(),
        Some(Value::Array(data)) => collect_records(data),
        _ => match envelope.get("records") {
            Some(Value::Array(records)) => collect_records(records),
            _ => match envelope {
                Value::Array(records) => collect_records(records),
                _ => Vec::new(),
            },
        },
    };

    let (total_rows, total_pages) = match envelope.get("data") {
        Some(Value::Object(data)) => (
            counter(data.get("totalRow")),
            counter(data.get("totalPage")) as u32,
        ),
        _ => (
            counter(envelope.get("total")),
            counter(envelope.get("pages")) as u32,
        ),
    };

    PageData {
        records,
        total_rows,
        total_pages,
    }
}

/// Keep object entries only; anything else in a record array is malformed and
/// dropped rather than faulted on.
fn collect_records(entries: &[Value]) -> Vec<Record> {
    entries
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

fn counter(v: Option<&Value>) -> u64 {
    v.and_then(Value::as_u64).unwrap_or(0)
}
