//! Submission bodies accepted by the orchestrator.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::IngestError;
use crate::model::{ArtefactKind, ProductCandidate, ProductionMethod, empty_as_none, method_or_default};

/// Environment key carrying the originating project path.
pub const PROJECT_KEY: &str = "CI_PROJECT_PATH";

/// Environment key carrying the author.
pub const AUTHOR_KEY: &str = "GITLAB_USER_NAME";

/// Environment key carrying the build worker identity.
pub const WORKER_KEY: &str = "CI_RUNNER_DESCRIPTION";

/// An artefact as declared by a submitter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtefactDescriptor {
    /// Content hash or commit id.
    pub id: String,
    pub name: String,
    #[serde(
        rename = "type",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<ArtefactKind>,
    pub author: String,
}

impl ArtefactDescriptor {
    /// Product candidate from the declared fields, with `env` filling the
    /// attributes that are still empty.
    pub fn candidate(&self, env: Option<&CiEnvironment>) -> ProductCandidate {
        let mut candidate = ProductCandidate::new(self.id.clone())
            .with_name(self.name.clone())
            .with_kind(self.kind)
            .with_author(self.author.clone());

        if let Some(env) = env {
            if candidate.project.is_empty() {
                candidate.project.clone_from(&env.project);
            }
            if candidate.author.is_empty() {
                candidate.author.clone_from(&env.author);
            }
            if candidate.worker.is_empty() {
                candidate.worker.clone_from(&env.worker);
            }
        }
        candidate
    }
}

/// Attributes recognised in a submission's environment map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiEnvironment {
    pub project: String,
    pub author: String,
    /// Runner identity, cut before its first `/`.
    pub worker: String,
}

impl CiEnvironment {
    /// Picks the recognised keys out of `env`; unknown keys are ignored.
    pub fn from_map(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let worker = get(WORKER_KEY)
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        Self {
            project: get(PROJECT_KEY),
            author: get(AUTHOR_KEY),
            worker,
        }
    }
}

/// Body of a collect submission: scan reports for one artefact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectRequest {
    pub environment: HashMap<String, String>,
    pub artefact: ArtefactDescriptor,
    /// Base64-encoded SARIF reports keyed by file name.
    pub reports: BTreeMap<String, String>,
}

/// Body of an origin submission: a product and what it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginRequest {
    pub environment: HashMap<String, String>,
    pub product: ArtefactDescriptor,
    pub origins: Vec<ArtefactDescriptor>,
    #[serde(deserialize_with = "method_or_default")]
    pub production_method: ProductionMethod,
}

impl CollectRequest {
    /// Parses a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSubmission`] for malformed JSON,
    /// including an unknown artefact type.
    pub fn from_json(body: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(body).map_err(IngestError::invalid)
    }

    pub(crate) fn validate(&self) -> Result<(), IngestError> {
        if self.artefact.id.trim().is_empty() {
            return Err(IngestError::invalid("artefact id is empty"));
        }
        Ok(())
    }
}

impl OriginRequest {
    /// Parses a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSubmission`] for malformed JSON,
    /// including an unknown artefact type or production method.
    pub fn from_json(body: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(body).map_err(IngestError::invalid)
    }

    pub(crate) fn validate(&self) -> Result<(), IngestError> {
        if self.product.id.trim().is_empty() {
            return Err(IngestError::invalid("product id is empty"));
        }
        if let Some(index) = self.origins.iter().position(|o| o.id.trim().is_empty()) {
            return Err(IngestError::invalid(format!("origin {index} has an empty id")));
        }
        Ok(())
    }
}
