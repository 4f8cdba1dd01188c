//! HTTP handlers.
//!
//! Bodies are read as raw bytes and parsed here so that every malformed
//! submission answers 400. Store work runs on the blocking pool.

use aspm_core::ingest::{CollectRequest, OriginRequest, ReportStatus};
use aspm_core::store::{Store, StoreError};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::projection::{EngagementView, LinkView, ProductView, VersionView, VulnerabilityView};

/// Liveness text served by the gateway probe.
pub const GW_RESPONSE: &str = "GW endpoint is functional";

/// `POST /api/v1/collect`
pub async fn collect(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request = CollectRequest::from_json(&body).inspect_err(|e| {
        warn!(error = %e, "Rejected collect submission");
    })?;

    let ingestor = state.ingestor.clone();
    let outcome = tokio::task::spawn_blocking(move || ingestor.collect(&request)).await??;

    if outcome.has_failures() {
        let failed = outcome
            .reports
            .iter()
            .filter(|r| matches!(r.status, ReportStatus::Failed { .. }))
            .count();
        return Err(ApiError::Storage(format!(
            "{failed} of {} reports for {} failed",
            outcome.reports.len(),
            outcome.product_id
        )));
    }

    debug!(
        product_id = %outcome.product_id,
        reports = outcome.reports.len(),
        "Collect submission stored"
    );
    Ok(StatusCode::OK)
}

/// `POST /api/v1/origin`
pub async fn origin(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request = OriginRequest::from_json(&body).inspect_err(|e| {
        warn!(error = %e, "Rejected origin submission");
    })?;

    let ingestor = state.ingestor.clone();
    let outcome = tokio::task::spawn_blocking(move || ingestor.origin(&request)).await??;

    debug!(
        product_id = %outcome.product_id,
        links = outcome.links.len(),
        "Origin submission stored"
    );
    Ok(StatusCode::OK)
}

/// `GET /api/v1/gw`
pub async fn gw() -> &'static str {
    GW_RESPONSE
}

async fn project<T, V, F>(state: &AppState, load: F) -> Result<Json<Vec<V>>, ApiError>
where
    T: Send + 'static,
    V: From<T>,
    F: FnOnce(&Store) -> Result<Vec<T>, StoreError> + Send + 'static,
{
    let store = state.ingestor.store().clone();
    let rows = tokio::task::spawn_blocking(move || load(&store)).await??;
    Ok(Json(rows.into_iter().map(V::from).collect()))
}

/// `GET /ui/v1/products`
pub async fn products(State(state): State<AppState>) -> Result<Json<Vec<ProductView>>, ApiError> {
    project(&state, Store::products).await
}

/// `GET /ui/v1/links`
pub async fn links(State(state): State<AppState>) -> Result<Json<Vec<LinkView>>, ApiError> {
    project(&state, Store::links).await
}

/// `GET /ui/v1/engagements`
pub async fn engagements(
    State(state): State<AppState>,
) -> Result<Json<Vec<EngagementView>>, ApiError> {
    project(&state, Store::engagements).await
}

/// `GET /ui/v1/vulnerabilities`
pub async fn vulnerabilities(
    State(state): State<AppState>,
) -> Result<Json<Vec<VulnerabilityView>>, ApiError> {
    project(&state, Store::vulnerabilities).await
}

/// `GET /ui/v1/version`
pub async fn version() -> Json<VersionView> {
    Json(VersionView::current())
}
