//! CWE/CVE resolution from tool-specific SARIF conventions.
//!
//! Only two conventions are understood:
//!
//! - **gosec** ships a `CWE` taxonomy and links each rule to a taxon through
//!   `relationships[].target.guid`.
//! - **govulncheck** lists the advisory's aliases in the rule property bag
//!   under `tags`; the `CVE-*` entry is the CVE id.
//!
//! Any other tool resolves to nothing. Resolution is pure: a [`RunTaxonomy`]
//! is built once per run by whoever iterates its results.

use std::collections::HashMap;

use serde_json::Value;

use super::Run;

/// Driver name of the gosec scanner.
pub const GOSEC_DRIVER: &str = "gosec";

/// Driver name of the govulncheck scanner.
pub const GOVULNCHECK_DRIVER: &str = "govulncheck";

const CWE_TAXONOMY: &str = "CWE";
const CVE_PREFIX: &str = "CVE";

/// Rule-id keyed CWE/CVE lookups for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTaxonomy {
    cwe: HashMap<String, String>,
    cve: HashMap<String, String>,
}

impl RunTaxonomy {
    /// Resolves both mappings for `run`.
    pub fn resolve(run: &Run) -> Self {
        Self {
            cwe: resolve_cwe(run),
            cve: resolve_cve(run),
        }
    }

    /// CWE id (`CWE-<n>`) for a rule.
    pub fn cwe(&self, rule_id: &str) -> Option<&str> {
        self.cwe.get(rule_id).map(String::as_str)
    }

    /// CVE id for a rule.
    pub fn cve(&self, rule_id: &str) -> Option<&str> {
        self.cve.get(rule_id).map(String::as_str)
    }
}

fn driver_is(run: &Run, name: &str) -> bool {
    run.tool.driver.name.trim().eq_ignore_ascii_case(name)
}

/// Maps rule ids to `CWE-<n>` for gosec runs.
///
/// For each taxon of the first taxonomy named `CWE`, the first rule holding a
/// relationship whose target GUID equals the taxon GUID is mapped. Taxa
/// without a GUID or without a referencing rule are skipped.
pub fn resolve_cwe(run: &Run) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    if !driver_is(run, GOSEC_DRIVER) {
        return mapping;
    }

    let Some(taxonomy) = run.taxonomies.iter().find(|t| t.name == CWE_TAXONOMY) else {
        return mapping;
    };

    for taxon in &taxonomy.taxa {
        let Some(guid) = taxon.guid.as_deref().filter(|g| !g.is_empty()) else {
            continue;
        };
        let rule = run.tool.driver.rules.iter().find(|rule| {
            rule.relationships
                .iter()
                .any(|rel| rel.target.guid.as_deref() == Some(guid))
        });
        if let Some(rule) = rule.filter(|rule| !rule.id.is_empty()) {
            mapping.insert(rule.id.clone(), format!("CWE-{}", taxon.id));
        }
    }

    mapping
}

/// Maps rule ids to CVE ids for govulncheck runs.
///
/// The property bag must be an object whose `tags` member is an array; any
/// other shape is ignored. When several tags carry the prefix the last wins.
pub fn resolve_cve(run: &Run) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    if !driver_is(run, GOVULNCHECK_DRIVER) {
        return mapping;
    }

    for rule in &run.tool.driver.rules {
        let Some(Value::Object(properties)) = &rule.properties else {
            continue;
        };
        let Some(Value::Array(tags)) = properties.get("tags") else {
            continue;
        };
        let cve = tags
            .iter()
            .rev()
            .filter_map(Value::as_str)
            .find(|tag| tag.starts_with(CVE_PREFIX));
        if let Some(cve) = cve {
            mapping.insert(rule.id.clone(), cve.to_string());
        }
    }

    mapping
}
