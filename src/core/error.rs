//! Error types for the research engine.
//!
//! Only misconfiguration is surfaced to the caller of a research run; every
//! other variant is produced and absorbed internally (logged, then the single
//! fetch / crawl / engine is skipped).

use crate::core::types::Role;

/// Top-level library error.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// No selector candidates are registered for the `(engine, role)` pair.
    #[error("no selector candidates registered for {engine}/{role}")]
    NoCandidates { engine: String, role: Role },

    /// Every tried selector, including discovered ones, missed on the page.
    #[error("no working selector for {engine}/{role}")]
    SelectorMiss { engine: String, role: Role },

    /// Invalid configuration, detected before any network activity.
    #[error("config error: {0}")]
    Config(String),

    /// A URL could not be parsed or does not use http(s).
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// Policy state could not be read or written.
    #[error("policy state error: {0}")]
    State(String),
}

/// Failure of the HTTP fetch capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Timeouts, connection resets, 429 and 5xx responses. Worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Everything else (4xx, unsupported scheme, unreadable body).
    #[error("fatal fetch failure: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Failure of the browser-rendering capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("browser timed out: {0}")]
    Timeout(String),

    /// The session was already released.
    #[error("browser session closed")]
    Closed,
}
