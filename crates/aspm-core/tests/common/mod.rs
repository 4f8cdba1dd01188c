//! Shared fixtures for aspm-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use aspm_core::ingest::{ArtefactDescriptor, CollectRequest, OriginRequest};
use aspm_core::model::{ArtefactKind, ProductionMethod};
use aspm_core::store::{Store, StoreOptions};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tempfile::TempDir;

/// On-disk store in a fresh temp directory.
pub fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store =
        Store::open(dir.path().join("aspm.db"), StoreOptions::default()).expect("open store");
    (store, dir)
}

pub fn encode(report: &Value) -> String {
    STANDARD.encode(report.to_string())
}

/// A result at `uri:line:column`.
pub fn result(rule_id: &str, uri: &str, line: i64, column: i64) -> Value {
    json!({
        "ruleId": rule_id,
        "level": "warning",
        "message": { "text": format!("{rule_id} finding") },
        "locations": [{ "physicalLocation": {
            "artifactLocation": { "uri": uri },
            "region": { "startLine": line, "startColumn": column }
        } }]
    })
}

/// gosec report whose `G101` rule maps to CWE-798.
pub fn gosec_report(results: &[Value]) -> String {
    encode(&json!({
        "version": "2.1.0",
        "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
        "runs": [{
            "tool": { "driver": {
                "name": "gosec",
                "semanticVersion": "2.18.2",
                "rules": [{
                    "id": "G101",
                    "relationships": [{
                        "target": {
                            "id": "798",
                            "guid": "3e5bd2a8-0d6f-5e2b-9d0b-d5a1b8a2e0aa",
                            "toolComponent": { "name": "CWE" }
                        },
                        "kinds": ["superset"]
                    }]
                }]
            } },
            "taxonomies": [{
                "name": "CWE",
                "taxa": [{ "id": "798", "guid": "3e5bd2a8-0d6f-5e2b-9d0b-d5a1b8a2e0aa" }]
            }],
            "results": results
        }]
    }))
}

/// govulncheck report whose `GO-2023-1987` rule carries a CVE tag.
pub fn govulncheck_report(results: &[Value]) -> String {
    encode(&json!({
        "version": "2.1.0",
        "runs": [{
            "tool": { "driver": {
                "name": "govulncheck",
                "rules": [{
                    "id": "GO-2023-1987",
                    "properties": { "tags": ["GHSA-2q89-485c-9j2x", "CVE-2023-39319"] }
                }]
            } },
            "results": results
        }]
    }))
}

pub fn descriptor(id: &str) -> ArtefactDescriptor {
    ArtefactDescriptor {
        id: id.to_string(),
        ..ArtefactDescriptor::default()
    }
}

pub fn ci_environment() -> HashMap<String, String> {
    HashMap::from([
        ("CI_PROJECT_PATH".to_string(), "group/app".to_string()),
        ("GITLAB_USER_NAME".to_string(), "ci-bot".to_string()),
        (
            "CI_RUNNER_DESCRIPTION".to_string(),
            "runner-3/autoscaler".to_string(),
        ),
    ])
}

pub fn collect(artefact: &str, reports: &[(&str, String)]) -> CollectRequest {
    CollectRequest {
        environment: HashMap::new(),
        artefact: ArtefactDescriptor {
            kind: Some(ArtefactKind::Binary),
            ..descriptor(artefact)
        },
        reports: reports
            .iter()
            .map(|(name, raw)| ((*name).to_string(), raw.clone()))
            .collect(),
    }
}

pub fn origin(product: &str, origins: &[&str], method: ProductionMethod) -> OriginRequest {
    OriginRequest {
        environment: HashMap::new(),
        product: descriptor(product),
        origins: origins.iter().map(|id| descriptor(id)).collect(),
        production_method: method,
    }
}
