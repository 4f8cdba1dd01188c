//! Engagement ledger.
//!
//! Engagements are append-only: every submitted report becomes a new row,
//! even when the same bytes were submitted before. Vulnerabilities extracted
//! from an engagement are deduplicated on
//! `(engagement_id, rule_id, location_fingerprint)`.
//!
//! A report is decoded exactly once. [`record_engagement`] hands the decoded
//! value back to the caller, who passes it on to [`insert_findings`].
//! [`extract_findings`] replays a stored engagement by decoding its raw
//! report first.

use rusqlite::{Row, Transaction, params};
use thiserror::Error;
use tracing::{debug, warn};

use super::{StoreError, get_u64, now_ns};
use crate::model::{Engagement, Vulnerability};
use crate::sarif::{self, DecodeError, Finding, Report};

/// Tool name recorded when the report does not name one or cannot be decoded.
pub const UNKNOWN_TOOL: &str = "unknown";

pub(crate) const ENGAGEMENT_COLUMNS: &str =
    "id, product_id, report_name, tool, raw_report, created_at_ns";

pub(crate) const VULNERABILITY_COLUMNS: &str = "id, engagement_id, product_id, rule_id, \
     location_fingerprint, level, message, cwe, cve, created_at_ns";

pub(crate) fn engagement_from_row(row: &Row<'_>) -> rusqlite::Result<Engagement> {
    Ok(Engagement {
        id: get_u64(row, 0)?,
        product_id: row.get(1)?,
        report_name: row.get(2)?,
        tool: row.get(3)?,
        raw_report: row.get(4)?,
        created_at_ns: get_u64(row, 5)?,
    })
}

pub(crate) fn vulnerability_from_row(row: &Row<'_>) -> rusqlite::Result<Vulnerability> {
    let level: String = row.get(5)?;
    Ok(Vulnerability {
        id: get_u64(row, 0)?,
        engagement_id: get_u64(row, 1)?,
        product_id: row.get(2)?,
        rule_id: row.get(3)?,
        location_fingerprint: row.get(4)?,
        level: level.parse().unwrap_or_default(),
        message: row.get(6)?,
        cwe: row.get(7)?,
        cve: row.get(8)?,
        created_at_ns: get_u64(row, 9)?,
    })
}

/// Errors from [`extract_findings`].
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The stored report could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Inserting a finding failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly recorded engagement together with its decoded report.
#[derive(Debug)]
pub struct RecordedEngagement {
    pub engagement: Engagement,
    /// The decoded report, or why decoding failed.
    pub report: Result<Report, DecodeError>,
}

/// Counts from one extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Rows newly inserted.
    pub inserted: usize,
    /// Findings whose key already existed for the engagement.
    pub duplicates: usize,
}

/// Appends an engagement for `product_id`.
///
/// The tool name is read from the decoded report; an undecodable report is
/// still recorded, raw bytes preserved, with [`UNKNOWN_TOOL`].
///
/// # Errors
///
/// Returns a database error if the insert fails, e.g. when the product does
/// not exist.
pub fn record_engagement(
    tx: &Transaction<'_>,
    product_id: &str,
    report_name: &str,
    raw_report: &str,
) -> Result<RecordedEngagement, StoreError> {
    let report = sarif::decode(raw_report);
    let tool = match &report {
        Ok(report) => report.tool_name().unwrap_or(UNKNOWN_TOOL).to_string(),
        Err(e) => {
            warn!(
                product_id = %product_id,
                report_name = %report_name,
                error = %e,
                "Recording undecodable report"
            );
            UNKNOWN_TOOL.to_string()
        },
    };

    let created_at_ns = now_ns();
    tx.execute(
        "INSERT INTO engagements (product_id, report_name, tool, raw_report, created_at_ns)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![product_id, report_name, tool, raw_report, created_at_ns as i64],
    )?;

    let engagement = Engagement {
        id: tx.last_insert_rowid() as u64,
        product_id: product_id.to_string(),
        report_name: report_name.to_string(),
        tool,
        raw_report: raw_report.to_string(),
        created_at_ns,
    };

    debug!(
        engagement_id = engagement.id,
        product_id = %product_id,
        tool = %engagement.tool,
        "Recorded engagement"
    );

    Ok(RecordedEngagement { engagement, report })
}

/// Inserts the findings of `engagement`, ignoring already known keys.
///
/// Pass the report returned by [`record_engagement`] to avoid decoding it a
/// second time; with `None` the stored raw report is decoded here.
///
/// # Errors
///
/// Returns [`ExtractError::Decode`] if the raw report must be decoded and
/// cannot be, or [`ExtractError::Store`] if an insert fails.
pub fn extract_findings(
    tx: &Transaction<'_>,
    engagement: &Engagement,
    report: Option<&Report>,
) -> Result<ExtractionSummary, ExtractError> {
    match report {
        Some(report) => Ok(insert_findings(tx, engagement, report)?),
        None => {
            let decoded = sarif::decode(&engagement.raw_report)?;
            Ok(insert_findings(tx, engagement, &decoded)?)
        },
    }
}

/// Inserts the findings of an already decoded `report` for `engagement`.
///
/// # Errors
///
/// Returns a database error if an insert fails.
pub fn insert_findings(
    tx: &Transaction<'_>,
    engagement: &Engagement,
    report: &Report,
) -> Result<ExtractionSummary, StoreError> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO vulnerabilities
            (engagement_id, product_id, rule_id, location_fingerprint, level, message, cwe, cve, created_at_ns)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (engagement_id, rule_id, location_fingerprint) DO NOTHING",
    )?;

    let mut summary = ExtractionSummary::default();
    let created_at_ns = now_ns() as i64;
    for Finding {
        rule_id,
        fingerprint,
        level,
        message,
        cwe,
        cve,
    } in report.findings()
    {
        let inserted = stmt
            .execute(params![
                engagement.id as i64,
                engagement.product_id,
                rule_id,
                fingerprint,
                level.as_str(),
                message,
                cwe,
                cve,
                created_at_ns,
            ])?;
        if inserted == 1 {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    debug!(
        engagement_id = engagement.id,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "Extracted findings"
    );

    Ok(summary)
}

/// Vulnerabilities recorded for one engagement.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn vulnerabilities_for(
    conn: &rusqlite::Connection,
    engagement_id: u64,
) -> Result<Vec<Vulnerability>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VULNERABILITY_COLUMNS} FROM vulnerabilities
         WHERE engagement_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(params![engagement_id as i64], vulnerability_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
