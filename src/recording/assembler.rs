//! Turns raw hyper request/response parts into transaction records.
//!
//! Assembly is a pure transformation with one exception: the body is drained
//! out of the transaction's stream, which can only be consumed once. Callers
//! that still need the body downstream (the proxy path does, on both legs)
//! must buffer it first and hand the assembler the buffered copy.

use bytes::Bytes;
use chrono::{DateTime, Local};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Uri};
use http_body_util::BodyExt;

use super::record::{RecordBase, RequestRecord, ResponseRecord};

/// Human-readable one-line description of a request, used for identities,
/// index lines and log output.
pub fn describe_request(remote_addr: &str, parts: &http::request::Parts) -> String {
    format!(
        "[{}] {} http://{}{}",
        remote_addr,
        parts.method,
        request_host(parts),
        parts.uri
    )
}

fn request_host(parts: &http::request::Parts) -> String {
    if let Some(host) = parts.headers.get(HOST).and_then(|v| v.to_str().ok()) {
        return host.to_string();
    }
    parts
        .uri
        .authority()
        .map(|a| a.to_string())
        .unwrap_or_default()
}

/// Flattens a header map into sorted `"name: value"` lines, one line per
/// value of a multi-valued header.
pub fn dump_header_lines(headers: &HeaderMap) -> Vec<String> {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}",
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes())
            )
        })
        .collect();
    lines.sort();
    lines
}

/// Decodes the query string into sorted `"name: value"` lines.
pub fn dump_query_lines(uri: &Uri) -> Vec<String> {
    let Some(query) = uri.query() else {
        return Vec::new();
    };
    let mut lines: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();
    lines.sort();
    lines
}

fn transfer_encodings(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn content_length(headers: &HeaderMap) -> i64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1)
}

fn base_from_headers(headers: &HeaderMap, version: http::Version, received: DateTime<Local>) -> RecordBase {
    let mut base = RecordBase::new(received);
    base.protocol = format!("{:?}", version);
    base.headers = dump_header_lines(headers);
    base.content_length = content_length(headers);
    base.transfer_encodings = transfer_encodings(headers);
    base
}

/// Builds a request record from the request head. The body is captured
/// separately and filled in by the caller.
pub fn build_request_record(
    parts: &http::request::Parts,
    remote_addr: &str,
    received: DateTime<Local>,
) -> RequestRecord {
    RequestRecord {
        base: base_from_headers(&parts.headers, parts.version, received),
        remote_addr: remote_addr.to_string(),
        host: request_host(parts),
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: dump_query_lines(&parts.uri),
        uri: parts.uri.to_string(),
    }
}

/// Builds a response record from the response head. The body is captured
/// separately and filled in by the caller.
pub fn build_response_record(
    parts: &http::response::Parts,
    received: DateTime<Local>,
) -> ResponseRecord {
    let compressed = parts
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.eq_ignore_ascii_case("identity"))
        .unwrap_or(false);

    let reason = parts.status.canonical_reason().unwrap_or("");
    ResponseRecord {
        base: base_from_headers(&parts.headers, parts.version, received),
        status: format!("{} {}", parts.status.as_u16(), reason)
            .trim_end()
            .to_string(),
        status_code: parts.status.as_u16(),
        compressed,
    }
}

/// Result of draining a body stream.
pub struct CapturedBody {
    pub bytes: Bytes,
    pub trailers: Option<HeaderMap>,
    /// Read failure, if any. Never fatal: the capture keeps whatever arrived
    /// before the failure.
    pub error: Option<String>,
}

/// Drains `body`, keeping at most `max_size` bytes (`-1` for unbounded).
///
/// Frames past the bound are dropped as they arrive rather than buffered, so
/// memory stays bounded no matter what Content-Length the peer claimed. The
/// stream is always drained to the end to pick up trailers.
pub async fn read_body_capped<B>(mut body: B, max_size: i64) -> CapturedBody
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut trailers = None;
    let mut error = None;

    loop {
        match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    if max_size < 0 {
                        buf.extend_from_slice(&data);
                    } else {
                        let room = (max_size as usize).saturating_sub(buf.len());
                        let take = room.min(data.len());
                        buf.extend_from_slice(&data[..take]);
                    }
                }
                Err(frame) => {
                    if let Ok(t) = frame.into_trailers() {
                        trailers = Some(t);
                    }
                }
            },
            Some(Err(e)) => {
                error = Some(e.to_string());
                break;
            }
            None => break,
        }
    }

    CapturedBody {
        bytes: Bytes::from(buf),
        trailers,
        error,
    }
}

/// Renders already-buffered body bytes as record text, honoring the size cap.
pub fn cap_text(bytes: &[u8], max_size: i64) -> String {
    let end = if max_size < 0 {
        bytes.len()
    } else {
        bytes.len().min(max_size as usize)
    };
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
