//! Ingestion orchestrator.
//!
//! [`Ingestor`] implements the two submission flows on top of the store:
//!
//! - **collect**: one transaction per report. The artefact is upserted, the
//!   report is appended as an engagement and its findings are extracted. A
//!   failing report leaves no trace and does not stop the others.
//! - **origin**: one transaction for the whole submission. Either the target,
//!   every origin and every link are stored, or nothing is.
//!
//! Submission errors are reported before any transaction is opened.

mod request;

use std::fmt;

use thiserror::Error;
use tracing::{error, info, warn};

pub use self::request::{
    AUTHOR_KEY, ArtefactDescriptor, CiEnvironment, CollectRequest, OriginRequest, PROJECT_KEY,
    WORKER_KEY,
};
use crate::model::{Link, ProductionMethod};
use crate::store::graph::{upsert_link, upsert_product};
use crate::store::ledger::{ExtractionSummary, insert_findings, record_engagement};
use crate::store::{Store, StoreError};

/// Errors raised by the orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The submission is malformed or incomplete. Nothing was stored.
    #[error("invalid submission: {reason}")]
    InvalidSubmission {
        /// What is wrong with it.
        reason: String,
    },

    /// The store failed; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub(crate) fn invalid(reason: impl fmt::Display) -> Self {
        Self::InvalidSubmission {
            reason: reason.to_string(),
        }
    }

    /// Whether the submitter is at fault.
    pub const fn is_submission_error(&self) -> bool {
        matches!(self, Self::InvalidSubmission { .. })
    }
}

/// What happened to one report of a collect submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// Recorded and its findings extracted.
    Ingested {
        engagement_id: u64,
        summary: ExtractionSummary,
    },
    /// Recorded with an unknown tool; no findings could be read.
    Undecodable { engagement_id: u64, reason: String },
    /// The transaction failed and was rolled back.
    Failed { reason: String },
}

/// Per-report result of [`Ingestor::collect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub report_name: String,
    pub status: ReportStatus,
}

/// Result of [`Ingestor::collect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOutcome {
    pub product_id: String,
    /// Whether this submission created the product.
    pub product_created: bool,
    /// One entry per report, in file-name order.
    pub reports: Vec<ReportOutcome>,
}

impl CollectOutcome {
    /// Whether any report's transaction failed.
    pub fn has_failures(&self) -> bool {
        self.reports
            .iter()
            .any(|r| matches!(r.status, ReportStatus::Failed { .. }))
    }
}

/// Result of [`Ingestor::origin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginOutcome {
    pub product_id: String,
    pub method: ProductionMethod,
    /// The links for every declared origin, in declaration order.
    pub links: Vec<Link>,
    /// How many of them this submission created.
    pub created_links: usize,
}

/// Runs submissions against a [`Store`].
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: Store,
}

impl Ingestor {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Ingests the reports of a collect submission.
    ///
    /// Storage failures are per report and show up as
    /// [`ReportStatus::Failed`] in the outcome rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSubmission`] if the artefact id is
    /// empty, or a store error if a submission without reports cannot upsert
    /// its artefact.
    pub fn collect(&self, request: &CollectRequest) -> Result<CollectOutcome, IngestError> {
        request.validate()?;
        let env = CiEnvironment::from_map(&request.environment);
        let candidate = request.artefact.candidate(Some(&env));
        let product_id = candidate.id.clone();

        if request.reports.is_empty() {
            let upsert = self.store.write(|tx| upsert_product(tx, &candidate))?;
            info!(product_id = %product_id, "Collected artefact without reports");
            return Ok(CollectOutcome {
                product_id,
                product_created: upsert.created,
                reports: Vec::new(),
            });
        }

        let mut product_created = false;
        let mut reports = Vec::with_capacity(request.reports.len());
        for (report_name, raw_report) in &request.reports {
            let result = self.store.write(|tx| -> Result<_, IngestError> {
                let upsert = upsert_product(tx, &candidate)?;
                let recorded = record_engagement(tx, &product_id, report_name, raw_report)?;
                let engagement_id = recorded.engagement.id;
                let status = match &recorded.report {
                    Ok(report) => ReportStatus::Ingested {
                        engagement_id,
                        summary: insert_findings(tx, &recorded.engagement, report)?,
                    },
                    Err(e) => ReportStatus::Undecodable {
                        engagement_id,
                        reason: e.to_string(),
                    },
                };
                Ok((upsert.created, status))
            });

            let status = match result {
                Ok((created, status)) => {
                    product_created |= created;
                    status
                },
                Err(e) => {
                    error!(
                        product_id = %product_id,
                        report_name = %report_name,
                        error = %e,
                        "Report ingestion failed"
                    );
                    ReportStatus::Failed {
                        reason: e.to_string(),
                    }
                },
            };

            match &status {
                ReportStatus::Ingested {
                    engagement_id,
                    summary,
                } => info!(
                    product_id = %product_id,
                    report_name = %report_name,
                    engagement_id,
                    inserted = summary.inserted,
                    duplicates = summary.duplicates,
                    "Collected report"
                ),
                ReportStatus::Undecodable { engagement_id, .. } => warn!(
                    product_id = %product_id,
                    report_name = %report_name,
                    engagement_id,
                    "Collected undecodable report"
                ),
                ReportStatus::Failed { .. } => {},
            }

            reports.push(ReportOutcome {
                report_name: report_name.clone(),
                status,
            });
        }

        Ok(CollectOutcome {
            product_id,
            product_created,
            reports,
        })
    }

    /// Records that a product was produced from its declared origins.
    ///
    /// Origins are stored with their own declared fields only; the
    /// environment describes the build of the target.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidSubmission`] if the product or an origin
    /// has an empty id, or a store error, in which case nothing was stored.
    pub fn origin(&self, request: &OriginRequest) -> Result<OriginOutcome, IngestError> {
        request.validate()?;
        let env = CiEnvironment::from_map(&request.environment);
        let target = request.product.candidate(Some(&env));
        let method = request.production_method;

        let outcome = self.store.write(|tx| {
            let product_id = upsert_product(tx, &target)?.product.id;
            let mut links = Vec::with_capacity(request.origins.len());
            let mut created_links = 0;
            for origin in &request.origins {
                upsert_product(tx, &origin.candidate(None))?;
                let upsert = upsert_link(tx, &product_id, &origin.id, method)?;
                if upsert.created {
                    created_links += 1;
                }
                links.push(upsert.link);
            }
            Ok::<_, StoreError>(OriginOutcome {
                product_id,
                method,
                links,
                created_links,
            })
        })?;

        info!(
            product_id = %outcome.product_id,
            method = %method,
            origins = outcome.links.len(),
            created_links = outcome.created_links,
            "Recorded origins"
        );
        Ok(outcome)
    }
}
