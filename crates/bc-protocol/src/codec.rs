//! Decompression of `compressedResult`/`compressedData` payloads into
//! handler arrays.
//!
//! `compressedResult` is `base64(gzip(utf8(json(array of handlers))))`.

use base64::Engine as _;
use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::ProtocolError;
use crate::handler::Handler;
use crate::rpc::CompressedPayload;

/// Decode a compressed payload into the handler array it carries.
pub fn decompress(payload: &CompressedPayload) -> Result<Vec<Handler>, ProtocolError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(payload.as_str())
        .map_err(|e| ProtocolError::Decompression(format!("base64 decode failed: {e}")))?;

    let mut gz = GzDecoder::new(raw.as_slice());
    let mut json_text = String::new();
    gz.read_to_string(&mut json_text)
        .map_err(|e| ProtocolError::Decompression(format!("gunzip failed: {e}")))?;

    serde_json::from_str(&json_text).map_err(ProtocolError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::compress_handlers_json;

    #[test]
    fn round_trips_a_handler_array() {
        let payload = compress_handlers_json(
            r#"[{"handlerType":"CachedSessionInitHandler","parameters":[]}]"#,
        );
        let handlers = decompress(&payload).unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].handler_type, "CachedSessionInitHandler");
    }

    #[test]
    fn invalid_base64_is_a_decompression_error() {
        let payload = CompressedPayload::Result("not valid base64!!".to_string());
        assert!(matches!(decompress(&payload), Err(ProtocolError::Decompression(_))));
    }
}
