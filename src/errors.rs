//! Typed error hierarchy for the support desk.
//!
//! Two top-level enums cover the two failure domains:
//! - `SupportError`: storage, validation and lookup failures
//! - `LlmError`: calls to the external language-model APIs

use thiserror::Error;

/// Errors from the ticket/client/order subsystem.
#[derive(Debug, Error)]
pub enum SupportError {
    #[error("Client {email} not found")]
    ClientNotFound { email: String },

    #[error("A client with email {email} already exists")]
    ClientAlreadyExists { email: String },

    #[error("Ticket {id} not found")]
    TicketNotFound { id: i64 },

    #[error("Order {id} not found")]
    OrderNotFound { id: String },

    #[error("Template {id} not found")]
    TemplateNotFound { id: i64 },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SupportError {
    /// Recover a `SupportError` that was propagated through `anyhow`.
    ///
    /// Storage methods return `anyhow::Result` and wrap domain failures in
    /// `SupportError`; callers that need to branch on the kind (the HTTP
    /// layer) use this to get it back.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<SupportError>() {
            Ok(e) => e,
            Err(other) => SupportError::Other(other),
        }
    }
}

/// Errors from an LLM provider call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No API key configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("API returned no content")]
    EmptyResponse,

    #[error("Could not parse model output as JSON: {0}")]
    InvalidJson(String),
}
