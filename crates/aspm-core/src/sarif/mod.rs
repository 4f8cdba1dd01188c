//! SARIF report normalization.
//!
//! Scanner reports arrive base64-encoded inside collect submissions. This
//! module decodes them into a typed [`Report`] covering the subset of SARIF
//! 2.1.0 the ledger needs, and turns each result into a [`Finding`]: a rule
//! id, a location fingerprint, a severity level, a message and the CWE/CVE
//! identifiers resolved from tool-specific conventions.
//!
//! Unknown SARIF properties are ignored. Property bags stay as
//! [`serde_json::Value`] and are only narrowed where a tool convention is read
//! (see [`taxonomy`]).
//!
//! # Example
//!
//! ```rust
//! use base64::Engine;
//! use base64::engine::general_purpose::STANDARD;
//!
//! let raw = r#"{"version":"2.1.0","runs":[{"tool":{"driver":{"name":"gosec"}},"results":[]}]}"#;
//! let report = aspm_core::sarif::decode(&STANDARD.encode(raw)).unwrap();
//! assert_eq!(report.tool_name(), Some("gosec"));
//! ```

mod fingerprint;
pub mod taxonomy;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::fingerprint::location_fingerprint;
pub use self::taxonomy::{RunTaxonomy, resolve_cve, resolve_cwe};

/// Errors raised while decoding a submitted report.
///
/// Both variants are the submitter's fault, never a storage failure.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The transport encoding is not valid base64.
    #[error("report is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The decoded bytes are not a SARIF JSON document.
    #[error("report is not a valid SARIF document: {0}")]
    Structure(#[from] serde_json::Error),
}

/// Decodes a base64-encoded SARIF document.
///
/// Leading and trailing whitespace around the encoded text is ignored.
///
/// # Errors
///
/// Returns [`DecodeError::Encoding`] if the text is not standard base64 and
/// [`DecodeError::Structure`] if the payload is not a SARIF log.
pub fn decode(encoded: &str) -> Result<Report, DecodeError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    from_slice(&bytes)
}

/// Parses an already decoded SARIF document.
///
/// # Errors
///
/// Returns [`DecodeError::Structure`] if the payload is not a SARIF log.
pub fn from_slice(bytes: &[u8]) -> Result<Report, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Top-level SARIF log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Report {
    /// SARIF format version (e.g. `2.1.0`).
    pub version: String,

    /// Schema URI, if the producer declared one.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Individual tool invocations.
    pub runs: Vec<Run>,
}

impl Report {
    /// Name of the tool that produced the first run.
    ///
    /// Returns `None` when the report has no runs or the driver is unnamed.
    pub fn tool_name(&self) -> Option<&str> {
        self.runs
            .first()
            .map(|run| run.tool.driver.name.trim())
            .filter(|name| !name.is_empty())
    }

    /// Normalizes every result of every run.
    ///
    /// CWE/CVE resolution happens once per run; results keep their order of
    /// appearance, duplicates included.
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for run in &self.runs {
            let taxonomy = RunTaxonomy::resolve(run);
            findings.extend(
                run.results
                    .iter()
                    .map(|result| Finding::from_result(result, &taxonomy)),
            );
        }
        findings
    }
}

/// A single invocation of an analysis tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Run {
    /// The tool that produced this run.
    pub tool: Tool,

    /// Findings reported by the tool.
    pub results: Vec<SarifResult>,

    /// Taxonomies (e.g. CWE) the tool's rules refer to.
    pub taxonomies: Vec<Taxonomy>,
}

/// Analysis tool description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tool {
    /// The primary tool component.
    pub driver: ToolComponent,
}

/// A tool component (driver or extension).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolComponent {
    /// Component name, e.g. `gosec`.
    pub name: String,

    /// Version string as reported by the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_version: Option<String>,

    /// Rules the component can report.
    pub rules: Vec<ReportingDescriptor>,
}

/// Rule metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportingDescriptor {
    /// Rule identifier, e.g. `G101`.
    pub id: String,

    /// Relationships to taxonomy entries.
    pub relationships: Vec<Relationship>,

    /// Free-form property bag. Only narrowed where a tool convention is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// Relationship between a rule and another descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Relationship {
    /// The related descriptor.
    pub target: DescriptorReference,

    /// Relationship kinds such as `superset` or `relevant`.
    pub kinds: Vec<String>,
}

/// Reference to a reporting descriptor by id and/or GUID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DescriptorReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

/// A taxonomy shipped with a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Taxonomy {
    /// Taxonomy name, e.g. `CWE`.
    pub name: String,

    /// Entries of the taxonomy.
    pub taxa: Vec<Taxon>,
}

/// One taxonomy entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Taxon {
    /// Entry id within the taxonomy, e.g. `79` for CWE-79.
    pub id: String,

    /// GUID rules use to reference this entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

/// A single SARIF result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SarifResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Rule reference, used when `ruleId` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<DescriptorReference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// Where the result was detected. Only the first entry is fingerprinted.
    pub locations: Vec<Location>,
}

impl SarifResult {
    /// The result's rule id, falling back to the embedded rule reference.
    pub fn rule_id(&self) -> &str {
        self.rule_id
            .as_deref()
            .or_else(|| self.rule.as_ref().and_then(|rule| rule.id.as_deref()))
            .unwrap_or_default()
    }

    /// Plain-text message, falling back to markdown.
    pub fn message_text(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|message| message.text.as_deref().or(message.markdown.as_deref()))
            .unwrap_or_default()
    }
}

/// SARIF result severity.
///
/// Decoding never fails on the level: spelling is matched ASCII
/// case-insensitively and an unrecognized value reads as [`Level::Warning`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    None,
    Note,
    /// SARIF's default when a result carries no level.
    #[default]
    Warning,
    Error,
}

impl Level {
    /// Wire/storage spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Reads a tool-supplied level, defaulting anything unrecognized.
    #[must_use]
    pub fn lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::None, Self::Note, Self::Warning, Self::Error]
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown SARIF level: {s}"))
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(value) => Self::lenient(&value),
            _ => Self::default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_location: Option<PhysicalLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicalLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<ArtifactLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArtifactLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Source region. Lines and columns are 1-based; tools that emit `0` or a
/// negative number mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Region {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<i64>,
}

/// A result normalized for the vulnerability ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Rule identifier (empty when the tool gave none).
    pub rule_id: String,

    /// Location fingerprint, see [`location_fingerprint`].
    pub fingerprint: String,

    /// Severity level.
    pub level: Level,

    /// Human-readable message.
    pub message: String,

    /// Resolved CWE identifier (`CWE-<n>`).
    pub cwe: Option<String>,

    /// Resolved CVE identifier.
    pub cve: Option<String>,
}

impl Finding {
    /// Normalizes a result using its run's resolved taxonomy.
    pub fn from_result(result: &SarifResult, taxonomy: &RunTaxonomy) -> Self {
        let rule_id = result.rule_id();
        Self {
            rule_id: rule_id.to_string(),
            fingerprint: location_fingerprint(result),
            level: result.level.unwrap_or_default(),
            message: result.message_text().to_string(),
            cwe: taxonomy.cwe(rule_id).map(str::to_string),
            cve: taxonomy.cve(rule_id).map(str::to_string),
        }
    }

    /// The deduplication key within one engagement.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.rule_id, &self.fingerprint)
    }
}
