/// Errors raised while decoding or interpreting wire-level BC protocol data.
///
/// This crate never talks to a socket; every variant here is a pure parsing
/// or decoding failure, not a connection failure (those live in
/// `bc-client-core`).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("malformed handler payload: {0}")]
    MalformedHandler(String),

    #[error("unrecognized change discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}
