//! Adhera — patient-education chatbot backend for research cohorts.
//!
//! Core pipelines:
//! - conversation state and history assembly ([`history`], [`chat`])
//! - multi-provider model dispatch with streaming ([`gateway`])
//! - idempotent transcript ingestion and voice-log merge ([`ingest`])
//! - retrospective medication-adherence extraction ([`adherence`])
//!
//! The surrounding request framework, credential mechanics, and provider
//! HTTP APIs are external collaborators; this crate exposes the services
//! they compose.

pub mod admin;
pub mod adherence;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod gateway;
pub mod history;
pub mod ingest;
pub mod models;
pub mod prompts;
pub mod speech;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate.
///
/// Honors `RUST_LOG`; falls back to the crate-level default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
