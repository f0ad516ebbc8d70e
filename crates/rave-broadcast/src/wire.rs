//! Line-delimited JSON framing.
//!
//! Every frame is one JSON object followed by `\n`. Fixtures parse one line
//! at a time, so a frame must never contain a raw newline; `serde_json`'s
//! compact output guarantees that.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Encode `value` as a single newline-terminated frame.
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

/// What a client sent us on one line.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// Blank line or bare line ending.
    Empty,
    Json(Value),
    /// Not JSON (or not UTF-8). Carries a lossy rendering for the log.
    Malformed(String),
}

/// Classify one raw line read from a client.
pub fn decode_line(raw: &[u8]) -> InboundLine {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return InboundLine::Empty;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => InboundLine::Json(value),
        Err(_) => InboundLine::Malformed(text.to_string()),
    }
}
