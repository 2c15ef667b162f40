//! Per-file enrichment applied while materializing a tree.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record emitted for every file of a materialized directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: None,
        }
    }
}

/// Mutates a record given the raw bytes of its blob.
type Processor = fn(&mut FileRecord, &[u8]);

/// The closed set of content processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Enrichment {
    /// Attach the blob decoded as UTF-8 text.
    #[serde(rename = "Add blob content")]
    AddBlobContent,
    /// Attach the text content encoded as base64.
    #[serde(rename = "Encode blob to Base64")]
    EncodeBlobBase64,
}

impl Enrichment {
    pub const ALL: [Enrichment; 2] = [Enrichment::AddBlobContent, Enrichment::EncodeBlobBase64];

    /// Command-line identifier.
    pub fn id(self) -> &'static str {
        match self {
            Enrichment::AddBlobContent => "add-blob-content",
            Enrichment::EncodeBlobBase64 => "encode-blob-base64",
        }
    }

    /// Human-readable label, also the serialized form.
    pub fn label(self) -> &'static str {
        match self {
            Enrichment::AddBlobContent => "Add blob content",
            Enrichment::EncodeBlobBase64 => "Encode blob to Base64",
        }
    }

    fn processor(self) -> Processor {
        match self {
            Enrichment::AddBlobContent => add_blob_content,
            Enrichment::EncodeBlobBase64 => encode_blob_base64,
        }
    }

    pub fn apply(self, record: &mut FileRecord, raw: &[u8]) {
        (self.processor())(record, raw)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown content processor: {0}")]
pub struct UnknownEnrichment(pub String);

impl FromStr for Enrichment {
    type Err = UnknownEnrichment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Enrichment::ALL
            .into_iter()
            .find(|e| e.id() == s || e.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEnrichment(s.to_string()))
    }
}

impl fmt::Display for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Decode `raw` as UTF-8, falling back to a quoted byte-string literal.
pub fn decode_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(e) => {
            log::debug!("Blob is not valid UTF-8 ({}), using byte repr", e);
            bytes_literal(raw)
        }
    }
}

/// `b'...'` literal of `raw`; double quotes when it holds `'` but no `"`.
fn bytes_literal(raw: &[u8]) -> String {
    let quote = if raw.contains(&b'\'') && !raw.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };

    let mut out = String::with_capacity(raw.len() + 3);
    out.push('b');
    out.push(char::from(quote));
    for &b in raw {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            _ if b == quote => {
                out.push('\\');
                out.push(char::from(b));
            }
            0x20..=0x7e => out.push(char::from(b)),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push(char::from(quote));
    out
}

fn add_blob_content(record: &mut FileRecord, raw: &[u8]) {
    record.content = Some(decode_text(raw));
}

fn encode_blob_base64(record: &mut FileRecord, raw: &[u8]) {
    if record.content.as_deref().is_none_or(str::is_empty) {
        add_blob_content(record, raw);
    }
    let text = record.content.take().unwrap_or_default();
    record.content = Some(STANDARD.encode(text.as_bytes()));
}
