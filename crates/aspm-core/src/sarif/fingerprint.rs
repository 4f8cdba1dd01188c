//! Location fingerprints.
//!
//! A fingerprint is `uri(startLine:startColumn-endLine:endColumn)`, where
//! each region component is emitted only when present. The region group
//! requires a start line. Zero and negative numbers are treated as absent:
//! SARIF lines and columns are 1-based, and some tools emit `0` or `-1` for
//! "unknown".

use super::{Region, SarifResult};

/// Builds the fingerprint of a result's first location.
///
/// Results without a location or without an artifact URI fingerprint to the
/// empty string.
pub fn location_fingerprint(result: &SarifResult) -> String {
    let Some(physical) = result
        .locations
        .first()
        .and_then(|location| location.physical_location.as_ref())
    else {
        return String::new();
    };

    let uri = physical
        .artifact_location
        .as_ref()
        .and_then(|artifact| artifact.uri.as_deref())
        .unwrap_or_default();

    fingerprint(uri, physical.region.as_ref())
}

fn fingerprint(uri: &str, region: Option<&Region>) -> String {
    let mut out = String::from(uri);
    if uri.is_empty() {
        return out;
    }

    let Some(region) = region else {
        return out;
    };
    let Some(start_line) = present(region.start_line) else {
        return out;
    };

    out.push_str(&format!("({start_line}"));
    if let Some(start_column) = present(region.start_column) {
        out.push_str(&format!(":{start_column}"));
    }
    if let Some(end_line) = present(region.end_line) {
        out.push_str(&format!("-{end_line}"));
    }
    if let Some(end_column) = present(region.end_column) {
        out.push_str(&format!(":{end_column}"));
    }
    out.push(')');
    out
}

fn present(value: Option<i64>) -> Option<i64> {
    value.filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn result_at(location: serde_json::Value) -> SarifResult {
        serde_json::from_value(json!({ "ruleId": "R", "locations": [location] })).unwrap()
    }

    fn region(start_line: Option<i64>, start_column: Option<i64>) -> Region {
        Region {
            start_line,
            start_column,
            ..Region::default()
        }
    }

    #[test]
    fn test_start_line_and_column() {
        assert_eq!(fingerprint("a.go", Some(&region(Some(10), Some(5)))), "a.go(10:5)");
    }

    #[test]
    fn test_start_line_only() {
        assert_eq!(fingerprint("a.go", Some(&region(Some(10), None))), "a.go(10)");
    }

    #[test]
    fn test_full_region() {
        let full = Region {
            start_line: Some(3),
            start_column: Some(1),
            end_line: Some(7),
            end_column: Some(12),
        };
        assert_eq!(fingerprint("src/main.go", Some(&full)), "src/main.go(3:1-7:12)");
    }

    #[test]
    fn test_end_line_without_columns() {
        let partial = Region {
            start_line: Some(3),
            end_line: Some(7),
            ..Region::default()
        };
        assert_eq!(fingerprint("x.go", Some(&partial)), "x.go(3-7)");
    }

    #[test]
    fn test_region_without_start_line_is_dropped() {
        let partial = Region {
            end_line: Some(7),
            end_column: Some(2),
            ..Region::default()
        };
        assert_eq!(fingerprint("x.go", Some(&partial)), "x.go");
        assert_eq!(fingerprint("x.go", None), "x.go");
    }

    #[test]
    fn test_zero_is_absent() {
        assert_eq!(fingerprint("a.go", Some(&region(Some(10), Some(0)))), "a.go(10)");
        assert_eq!(fingerprint("a.go", Some(&region(Some(0), Some(5)))), "a.go");
    }

    #[test]
    fn test_negative_is_absent() {
        assert_eq!(fingerprint("a.go", Some(&region(Some(10), Some(-1)))), "a.go(10)");
        assert_eq!(fingerprint("a.go", Some(&region(Some(-3), Some(5)))), "a.go");

        let partial = Region {
            start_line: Some(3),
            end_line: Some(-1),
            ..Region::default()
        };
        assert_eq!(fingerprint("a.go", Some(&partial)), "a.go(3)");
    }

    #[test]
    fn test_missing_uri_is_empty() {
        assert_eq!(fingerprint("", Some(&region(Some(10), Some(5)))), "");

        let result = result_at(json!({
            "physicalLocation": { "region": { "startLine": 10, "startColumn": 5 } }
        }));
        assert_eq!(location_fingerprint(&result), "");
    }

    #[test]
    fn test_uses_first_location_only() {
        let result: SarifResult = serde_json::from_value(json!({
            "locations": [
                { "physicalLocation": {
                    "artifactLocation": { "uri": "a.go" },
                    "region": { "startLine": 10, "startColumn": 5 }
                } },
                { "physicalLocation": {
                    "artifactLocation": { "uri": "b.go" },
                    "region": { "startLine": 1 }
                } }
            ]
        }))
        .unwrap();
        assert_eq!(location_fingerprint(&result), "a.go(10:5)");
    }

    #[test]
    fn test_no_locations() {
        assert_eq!(location_fingerprint(&SarifResult::default()), "");
    }
}
