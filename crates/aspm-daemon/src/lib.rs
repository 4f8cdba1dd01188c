//! aspm-daemon - HTTP front end for ASPM ingestion
//!
//! Wires [`aspm_core::ingest::Ingestor`] to an `axum` router:
//!
//! | Method | Path                      | Purpose                          |
//! |--------|---------------------------|----------------------------------|
//! | POST   | `/api/v1/collect`         | Scan reports for an artefact     |
//! | POST   | `/api/v1/origin`          | Origins of a product             |
//! | GET    | `/api/v1/gw`              | Liveness probe                   |
//! | GET    | `/ui/v1/products`         | Products                         |
//! | GET    | `/ui/v1/links`            | Links                            |
//! | GET    | `/ui/v1/engagements`      | Engagements (without raw report) |
//! | GET    | `/ui/v1/vulnerabilities`  | Vulnerabilities                  |
//! | GET    | `/ui/v1/version`          | Build version                    |

pub mod api;
pub mod error;
pub mod projection;

use aspm_core::ingest::Ingestor;
use aspm_core::store::Store;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
}

impl AppState {
    pub const fn new(store: Store) -> Self {
        Self {
            ingestor: Ingestor::new(store),
        }
    }
}

/// Builds the router. Request bodies larger than `max_body_bytes` are
/// refused with 413.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/collect", post(api::collect))
        .route("/api/v1/origin", post(api::origin))
        .route("/api/v1/gw", get(api::gw))
        .route("/ui/v1/products", get(api::products))
        .route("/ui/v1/links", get(api::links))
        .route("/ui/v1/engagements", get(api::engagements))
        .route("/ui/v1/vulnerabilities", get(api::vulnerabilities))
        .route("/ui/v1/version", get(api::version))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
