//! Read-only JSON views of stored rows.
//!
//! Timestamps are rendered as RFC 3339. Engagements expose the length of
//! the stored report instead of the report itself.

use aspm_core::model::{ArtefactKind, Engagement, Link, Product, ProductionMethod, Vulnerability};
use aspm_core::sarif::Level;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

fn rfc3339(created_at_ns: u64) -> String {
    let nanos = i64::try_from(created_at_ns).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<ArtefactKind>,
    pub project: String,
    pub author: String,
    pub worker: String,
    pub created_at: String,
}

impl From<Product> for ProductView {
    fn from(p: Product) -> Self {
        Self {
            created_at: rfc3339(p.created_at_ns),
            id: p.id,
            name: p.name,
            kind: p.kind,
            project: p.project,
            author: p.author,
            worker: p.worker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub id: u64,
    pub product_id: String,
    pub origin_id: String,
    pub production_method: ProductionMethod,
    pub created_at: String,
}

impl From<Link> for LinkView {
    fn from(l: Link) -> Self {
        Self {
            id: l.id,
            created_at: rfc3339(l.created_at_ns),
            product_id: l.product_id,
            origin_id: l.origin_id,
            production_method: l.method,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementView {
    pub id: u64,
    pub product_id: String,
    pub report_name: String,
    pub tool: String,
    /// Length of the stored (base64) report.
    pub report_length: usize,
    pub created_at: String,
}

impl From<Engagement> for EngagementView {
    fn from(e: Engagement) -> Self {
        Self {
            id: e.id,
            report_length: e.raw_report.len(),
            created_at: rfc3339(e.created_at_ns),
            product_id: e.product_id,
            report_name: e.report_name,
            tool: e.tool,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerabilityView {
    pub id: u64,
    pub engagement_id: u64,
    pub product_id: String,
    pub rule_id: String,
    pub location: String,
    pub level: Level,
    pub message: String,
    pub cwe: Option<String>,
    pub cve: Option<String>,
    pub created_at: String,
}

impl From<Vulnerability> for VulnerabilityView {
    fn from(v: Vulnerability) -> Self {
        Self {
            id: v.id,
            engagement_id: v.engagement_id,
            created_at: rfc3339(v.created_at_ns),
            product_id: v.product_id,
            rule_id: v.rule_id,
            location: v.location_fingerprint,
            level: v.level,
            message: v.message,
            cwe: v.cwe,
            cve: v.cve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionView {
    pub version: &'static str,
}

impl VersionView {
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_render_as_rfc3339() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00.000000Z");
        assert_eq!(rfc3339(1_500_000_000), "1970-01-01T00:00:01.500000Z");
    }

    #[test]
    fn test_engagement_view_hides_report() {
        let view = EngagementView::from(Engagement {
            id: 7,
            product_id: "p".into(),
            report_name: "gosec.sarif".into(),
            tool: "gosec".into(),
            raw_report: "YWJjZA==".into(),
            created_at_ns: 0,
        });
        assert_eq!(view.report_length, 8);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("raw_report").is_none());
        assert_eq!(json["report_length"], 8);
    }

    #[test]
    fn test_product_view_serializes_kind_as_type() {
        let view = ProductView::from(Product {
            id: "sha".into(),
            name: "server".into(),
            kind: Some(ArtefactKind::Binary),
            project: String::new(),
            author: String::new(),
            worker: String::new(),
            created_at_ns: 0,
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "binary");
    }
}
