//! Fixture constructors for downstream integration tests. Compiled into this
//! crate's own test binary, and into `bc-client-core`'s when it opts in via
//! the `test-helpers` feature — the same verbatim feature-gate idiom the
//! teacher's `ironposh-client-core` uses to expose test-only constructors
//! across a crate boundary.

use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::rpc::CompressedPayload;

/// Gzip+base64 a literal handler-array JSON string the way the server does,
/// for round-trip tests against [`crate::codec::decompress`].
#[must_use]
pub fn compress_handlers_json(handlers_json: &str) -> CompressedPayload {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(handlers_json.as_bytes())
        .expect("in-memory gzip write cannot fail");
    let gz = enc.finish().expect("in-memory gzip finish cannot fail");
    let b64 = base64::engine::general_purpose::STANDARD.encode(gz);
    CompressedPayload::Result(b64)
}

/// A minimal but complete `SessionInfo` handler batch, as a JSON-RPC
/// `OpenSession` response would carry it.
#[must_use]
pub fn session_info_handlers_json(session_id: &str, session_key: &str, company: &str, role_center_form_id: &str) -> String {
    format!(
        r#"[{{"handlerType":"CachedSessionInitHandler","parameters":[{{"ServerSessionId":"{session_id}","SessionKey":"{session_key}","CompanyName":"{company}","ServerId":"{role_center_form_id}"}}]}}]"#
    )
}
