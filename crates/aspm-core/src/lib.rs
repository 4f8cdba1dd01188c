//! aspm-core - ASPM ingestion and provenance graph engine
//!
//! CI pipelines submit two kinds of data: scan reports for a built artefact,
//! and declarations of which artefacts a product was built from. This crate
//! turns both into durable records and merges repeated, overlapping or
//! concurrent submissions without duplicating anything.
//!
//! # Modules
//!
//! - [`sarif`]: SARIF decoding, location fingerprints and CWE/CVE resolution
//! - [`model`]: products, links, engagements and vulnerabilities
//! - [`store`]: `SQLite` persistence for the provenance graph and the
//!   engagement ledger
//! - [`ingest`]: the collect and origin submission flows
//! - [`config`]: daemon configuration
//!
//! The crate emits `tracing` events but never installs a subscriber.

pub mod config;
pub mod ingest;
pub mod model;
pub mod sarif;
pub mod store;
