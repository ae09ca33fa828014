//! Manifest parsing seam.
//!
//! The session layer only supplies the fetched byte buffer and receives a
//! pass/fail result plus an opaque metadata tree; the manifest grammar and
//! the wire-chunk decoding both live behind [`ManifestParser`]. The
//! built-in [`DmrParser`] is intentionally shallow: enough for the CLI
//! and end-to-end tests, not a grammar implementation.

use thiserror::Error;

/// Parse/dechunk failure on fetched manifest bytes.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ManifestError {
    pub message: String,
}

impl ManifestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The structured metadata tree handed back by a parser.
///
/// Opaque to the session layer; it only stores, exposes, and eventually
/// drops it.
#[derive(Clone, Debug)]
pub struct ManifestDocument {
    /// Raw manifest text after dechunking.
    text: String,
    /// Length of the wire buffer the document was decoded from.
    raw_len: usize,
}

impl ManifestDocument {
    pub fn new(text: String, raw_len: usize) -> Self {
        Self { text, raw_len }
    }

    /// Dechunked manifest text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Size in bytes of the fetched wire buffer.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }
}

/// Consumes one extracted receive buffer, exactly once per fetch.
pub trait ManifestParser {
    fn parse(&self, raw: Vec<u8>) -> Result<ManifestDocument, ManifestError>;
}

/// Built-in minimal parser: requires a non-empty, UTF-8 buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DmrParser;

impl ManifestParser for DmrParser {
    fn parse(&self, raw: Vec<u8>) -> Result<ManifestDocument, ManifestError> {
        if raw.is_empty() {
            return Err(ManifestError::new("empty manifest response"));
        }
        let raw_len = raw.len();
        let text = String::from_utf8(raw)
            .map_err(|source| ManifestError::new(format!("manifest is not UTF-8: {}", source)))?;
        Ok(ManifestDocument::new(text, raw_len))
    }
}
