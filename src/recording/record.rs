//! Persisted transaction records.
//!
//! Field names are part of the on-disk contract: files written by `record`
//! are read back by `redo` (and by whatever offline tooling operators point
//! at the capture directory), so the serialized keys are pinned with
//! explicit renames rather than following Rust naming.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Which half of a transaction a record describes. Part of the filename, so
/// the request and response of one transaction never collide on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Request,
    Response,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Request => "request",
            RecordKind::Response => "response",
        }
    }
}

/// Fields shared by both record variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBase {
    /// Per-transaction correlation identity. Assigned exactly once; the
    /// request and response halves of a proxied exchange carry the same
    /// value.
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Date")]
    pub date: DateTime<Local>,
    #[serde(rename = "DateUTC")]
    pub date_utc: DateTime<Utc>,
    #[serde(rename = "DateUnixNano")]
    pub date_unix_nano: i64,
    #[serde(rename = "Protocol")]
    pub protocol: String,
    /// Flattened `"name: value"` lines, one per value, lexicographically
    /// sorted.
    #[serde(rename = "Headers")]
    pub headers: Vec<String>,
    #[serde(rename = "ContentLength")]
    pub content_length: i64,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "Trailers", default)]
    pub trailers: Vec<String>,
    #[serde(rename = "TransferEncodings", default)]
    pub transfer_encodings: Vec<String>,
}

impl RecordBase {
    pub fn new(received: DateTime<Local>) -> Self {
        Self {
            id: String::new(),
            date: received,
            date_utc: received.with_timezone(&Utc),
            date_unix_nano: received.timestamp_nanos_opt().unwrap_or_default(),
            protocol: String::new(),
            headers: Vec::new(),
            content_length: -1,
            body: String::new(),
            trailers: Vec::new(),
            transfer_encodings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(flatten)]
    pub base: RecordBase,
    #[serde(rename = "RemoteAddr")]
    pub remote_addr: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Path")]
    pub path: String,
    /// Sorted, decoded `"name: value"` query parameter lines.
    #[serde(rename = "Query")]
    pub query: Vec<String>,
    /// The raw request target as it appeared on the request line.
    #[serde(rename = "URI")]
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(flatten)]
    pub base: RecordBase,
    /// Full status line text, e.g. `200 OK`.
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    /// The upstream body arrived compressed (no transparent decompression is
    /// applied on the forwarding path).
    #[serde(rename = "Compressed")]
    pub compressed: bool,
}
