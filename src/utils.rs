use md5::{Digest, Md5};
use std::error::Error;

/// Hex-encoded 128-bit digest of a normalized URL.
///
/// Used both as the seen-set identity and as the storage key, so it must
/// stay stable across runs for the same input.
pub fn url_hash(normalized: &str) -> String {
    let digest = Md5::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

/// Render an error and its `source()` chain, one cause per line
pub fn error_trace(error: &(dyn Error + 'static)) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str("\n  caused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    trace
}
