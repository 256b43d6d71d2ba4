//! Scan result model.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use veritag::ids::{BatchUuid, ProductUuid, TagUuid};

/// Provenance returned for a resolved tag.
///
/// `scan_count` is the post-increment value for the scan that produced this
/// result; it never decreases across sequential resolutions of the same tag.
/// `first_scan_at`, once set, is never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub tag_id: TagUuid,
    pub product_id: ProductUuid,
    pub batch_id: BatchUuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_scan_at: Option<Timestamp>,

    pub scan_count: i64,
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_first_scan_when_unset() {
        let result = ScanResult {
            tag_id: TagUuid::nil(),
            product_id: ProductUuid::nil(),
            batch_id: BatchUuid::nil(),
            first_scan_at: None,
            scan_count: 3,
            valid: true,
        };

        let json = serde_json::to_string(&result).expect("result serializes");

        assert!(!json.contains("first_scan_at"));
    }

    #[test]
    fn round_trips_with_first_scan_set() {
        let result = ScanResult {
            tag_id: TagUuid::new(),
            product_id: ProductUuid::new(),
            batch_id: BatchUuid::new(),
            first_scan_at: Some(Timestamp::now()),
            scan_count: 7,
            valid: true,
        };

        let json = serde_json::to_vec(&result).expect("result serializes");
        let decoded: ScanResult = serde_json::from_slice(&json).expect("result deserializes");

        assert_eq!(decoded, result);
    }
}
