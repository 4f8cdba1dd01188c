//! Provenance graph and vulnerability ledger entities.
//!
//! Optional [`Product`] attributes use the empty string for "unset". This
//! matches the storage representation and keeps merge-only-if-empty a plain
//! per-field comparison.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};

use crate::sarif::Level;

/// Artefact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtefactKind {
    /// A source tree identified by its commit id.
    #[serde(alias = "git")]
    Source,
    /// A binary identified by its content hash.
    #[serde(alias = "bin")]
    Binary,
}

impl ArtefactKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for ArtefactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtefactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" | "git" => Ok(Self::Source),
            "binary" | "bin" => Ok(Self::Binary),
            other => Err(format!("unknown artefact type: {other}")),
        }
    }
}

/// How a product was produced from its origins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionMethod {
    #[default]
    Compile,
    Pack,
}

impl ProductionMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Pack => "pack",
        }
    }
}

impl fmt::Display for ProductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Self::Compile),
            "pack" => Ok(Self::Pack),
            other => Err(format!("unknown production method: {other}")),
        }
    }
}

impl ToSql for ProductionMethod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProductionMethod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Deserializes an optional enum where `null`, a missing field or an empty
/// string all mean "unset".
///
/// # Errors
///
/// Fails when the string is non-empty and does not parse as `T`.
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Deserializes a [`ProductionMethod`], defaulting to `compile` when the
/// value is `null` or empty.
///
/// # Errors
///
/// Fails on an unknown method name.
pub fn method_or_default<'de, D>(deserializer: D) -> Result<ProductionMethod, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(empty_as_none(deserializer)?.unwrap_or_default())
}

/// Optional product attributes subject to merge-only-if-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Name,
    Kind,
    Project,
    Author,
    Worker,
}

impl ProductField {
    pub const ALL: [Self; 5] = [
        Self::Name,
        Self::Kind,
        Self::Project,
        Self::Author,
        Self::Worker,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Kind => "kind",
            Self::Project => "project",
            Self::Author => "author",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field values offered for a product by one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductCandidate {
    pub id: String,
    pub name: String,
    pub kind: Option<ArtefactKind>,
    pub project: String,
    pub author: String,
    pub worker: String,
}

impl ProductCandidate {
    /// A candidate carrying only the identity key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: Option<ArtefactKind>) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn with_worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }

    /// Builds the product this candidate creates.
    #[must_use]
    pub fn into_product(self, created_at_ns: u64) -> Product {
        Product {
            id: self.id,
            name: self.name,
            kind: self.kind,
            project: self.project,
            author: self.author,
            worker: self.worker,
            created_at_ns,
        }
    }

    fn text(&self, field: ProductField) -> &str {
        match field {
            ProductField::Name => &self.name,
            ProductField::Kind => self.kind.map_or("", ArtefactKind::as_str),
            ProductField::Project => &self.project,
            ProductField::Author => &self.author,
            ProductField::Worker => &self.worker,
        }
    }
}

/// An artefact node of the provenance graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Content hash (binaries) or commit id (source trees).
    pub id: String,
    pub name: String,
    pub kind: Option<ArtefactKind>,
    pub project: String,
    pub author: String,
    /// Build worker identity.
    pub worker: String,
    pub created_at_ns: u64,
}

impl Product {
    fn text(&self, field: ProductField) -> &str {
        match field {
            ProductField::Name => &self.name,
            ProductField::Kind => self.kind.map_or("", ArtefactKind::as_str),
            ProductField::Project => &self.project,
            ProductField::Author => &self.author,
            ProductField::Worker => &self.worker,
        }
    }

    /// Fields the candidate would set if they were empty here.
    pub fn fillable(&self, candidate: &ProductCandidate) -> Vec<ProductField> {
        ProductField::ALL
            .into_iter()
            .filter(|&f| self.text(f).is_empty() && !candidate.text(f).is_empty())
            .collect()
    }

    /// Fields where the candidate disagrees with an already stored value.
    ///
    /// These values are dropped by [`Product::merge`].
    pub fn conflicts(&self, candidate: &ProductCandidate) -> Vec<ProductField> {
        ProductField::ALL
            .into_iter()
            .filter(|&f| {
                let stored = self.text(f);
                let offered = candidate.text(f);
                !stored.is_empty() && !offered.is_empty() && stored != offered
            })
            .collect()
    }

    /// Copies candidate values into fields that are still empty.
    ///
    /// Returns the fields that were filled. Populated fields never change.
    pub fn merge(&mut self, candidate: &ProductCandidate) -> Vec<ProductField> {
        let filled = self.fillable(candidate);
        for field in &filled {
            match field {
                ProductField::Name => self.name.clone_from(&candidate.name),
                ProductField::Kind => self.kind = candidate.kind,
                ProductField::Project => self.project.clone_from(&candidate.project),
                ProductField::Author => self.author.clone_from(&candidate.author),
                ProductField::Worker => self.worker.clone_from(&candidate.worker),
            }
        }
        filled
    }
}

/// A provenance edge: `product` was produced from `origin` by `method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: u64,
    pub product_id: String,
    pub origin_id: String,
    pub method: ProductionMethod,
    pub created_at_ns: u64,
}

/// One recorded scan submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engagement {
    pub id: u64,
    pub product_id: String,
    /// File name the report was submitted under.
    pub report_name: String,
    /// Producing tool, or [`crate::store::UNKNOWN_TOOL`].
    pub tool: String,
    /// The report exactly as submitted (base64).
    pub raw_report: String,
    pub created_at_ns: u64,
}

/// A finding stored in the vulnerability ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub id: u64,
    pub engagement_id: u64,
    pub product_id: String,
    pub rule_id: String,
    pub location_fingerprint: String,
    pub level: Level,
    pub message: String,
    pub cwe: Option<String>,
    pub cve: Option<String>,
    pub created_at_ns: u64,
}
