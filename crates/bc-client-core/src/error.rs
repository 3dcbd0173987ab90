//! The unified error type. Every public fallible function in this crate
//! returns `Result<T, BcClientError>`; each variant carries the structured
//! context spec.md §7 asks for (interaction name, form id, timeout_ms) as
//! named fields rather than only a formatted message.

use bc_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum BcClientError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} aborted: {reason}")]
    Aborted { operation: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("field or column resolution failed for '{key}': {reason}. Available: {available:?}")]
    Resolution {
        key: String,
        reason: String,
        available: Vec<String>,
    },

    #[error("validation failed on field '{field}' of form {form_id}: {message}")]
    Validation {
        form_id: String,
        field: String,
        message: String,
    },

    #[error("operation rejected, session is shutting down: {0}")]
    Shutdown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed login page: {0}")]
    MalformedLoginPage(String),

    #[error("login rejected (status {status})")]
    LoginRejected { status: u16 },

    #[error("CSRF token not found in response cookies")]
    CsrfTokenNotFound,

    #[error("HTTP transport failure: {0}")]
    Http(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,

    #[error("socket error: {0}")]
    Socket(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("session not initialized")]
    NotInitialized,
}
