//! Canonical data model for harvested records.
//!
//! Records are schema-free: the endpoint does not publish a column list, so a
//! record is whatever JSON object a page carried. The exporter derives its
//! table schema from the union of keys observed across all records.

use serde::Serialize;

/// One harvested record: field name to JSON value, insertion order preserved.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Per-job statistics, printed after each category and serializable for
/// programmatic use.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    /// Category the job ran for (wire value, e.g. "bacteria").
    pub category: String,
    /// Pages fetched or attempted, including the first page.
    pub attempted_pages: u32,
    /// Pages that contributed no records (transport failure or empty page).
    pub skipped_pages: u32,
    /// Records accumulated across all successful pages.
    pub record_count: usize,
    /// Total row count the server reported on the first page.
    pub total_rows: u64,
    /// Total page count discovered from the first page (after any cap).
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_all_counters() {
        let summary = HarvestSummary {
            category: "bacteria".to_string(),
            attempted_pages: 10,
            skipped_pages: 2,
            record_count: 400,
            total_rows: 5000,
            total_pages: 100,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["category"], "bacteria");
        assert_eq!(json["attempted_pages"], 10);
        assert_eq!(json["skipped_pages"], 2);
        assert_eq!(json["record_count"], 400);
        assert_eq!(json["total_rows"], 5000);
        assert_eq!(json["total_pages"], 100);
    }

    #[test]
    fn record_preserves_insertion_order() {
        let mut record = Record::new();
        record.insert("zeta".into(), 1.into());
        record.insert("alpha".into(), 2.into());
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }
}
