//! Replays a previously recorded request and prints the response.
//!
//! The input file is a request record as written by `record` mode, though
//! any JSON file with the same fields works; unknown fields are ignored and
//! every field is optional, so a hand-written minimal file is a valid input
//! too.

use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use log::debug;
use serde::Deserialize;

use crate::error_handling::RedoError;
use crate::server::proxy::https_client;

/// Command-line arguments for the `redo` subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct RedoArgs {
    /// Path of the JSON request file to replay.
    #[arg(long)]
    pub request: String,

    /// Override the host the request is sent to.
    #[arg(long)]
    pub host: Option<String>,

    /// Override the request target.
    #[arg(long)]
    pub url: Option<String>,

    /// How long to wait for the response, in seconds (a trailing `s` is
    /// accepted).
    #[arg(long, default_value = "60", value_parser = parse_timeout)]
    pub timeout: u64,

    /// Log the rebuilt request before sending it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

/// The subset of a request record that replay needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RedoRequest {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "Host", default)]
    pub host: String,
    #[serde(rename = "Method", default)]
    pub method: String,
    #[serde(rename = "URI", default)]
    pub uri: String,
    #[serde(rename = "Headers", default)]
    pub headers: Vec<String>,
}

pub async fn run(args: RedoArgs) -> Result<(), RedoError> {
    let raw = std::fs::read(&args.request).map_err(RedoError::ReadFailed)?;
    let mut record: RedoRequest = serde_json::from_slice(&raw).map_err(RedoError::ParseFailed)?;
    if let Some(host) = &args.host {
        record.host = host.clone();
    }
    if let Some(url) = &args.url {
        record.uri = url.clone();
    }

    let request = build_request(&record)?;
    if args.verbose {
        debug!("replaying {} {}", request.method(), request.uri());
        for (name, value) in request.headers() {
            debug!("  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
        }
    }

    let response = dispatch(request, args.timeout).await?;
    print_response(response).await
}

fn parse_timeout(value: &str) -> Result<u64, String> {
    value
        .strip_suffix('s')
        .unwrap_or(value)
        .parse()
        .map_err(|_| format!("not a duration in seconds: {}", value))
}

/// Rebuilds an HTTP request from the record fields.
///
/// Records store the request target as it appeared on the wire, usually just
/// a path. A relative target is resolved against the record's host (or the
/// `--host` override) over plain HTTP; an absolute target is used as is.
fn build_request(record: &RedoRequest) -> Result<Request<Full<Bytes>>, RedoError> {
    let uri = resolve_target(record)?;
    let method = if record.method.is_empty() {
        Method::GET
    } else {
        Method::from_str(&record.method)
            .map_err(|_| RedoError::InvalidRequest(format!("bad method: {}", record.method)))?
    };

    let mut request = Request::new(Full::new(Bytes::from(record.body.clone().into_bytes())));
    *request.method_mut() = method;
    *request.uri_mut() = uri;

    for line in &record.headers {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_str(name.trim()),
            HeaderValue::from_str(value.trim()),
        ) {
            request.headers_mut().append(name, value);
        }
    }
    if !record.host.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&record.host) {
            request.headers_mut().insert(HOST, value);
        }
    }
    Ok(request)
}

fn resolve_target(record: &RedoRequest) -> Result<Uri, RedoError> {
    let target = if record.uri.starts_with("http://") || record.uri.starts_with("https://") {
        record.uri.clone()
    } else if record.host.is_empty() {
        return Err(RedoError::InvalidRequest(
            "record has a relative URI and no host".to_string(),
        ));
    } else {
        format!("http://{}{}", record.host, record.uri)
    };
    target
        .parse()
        .map_err(|e| RedoError::InvalidRequest(format!("{}: {}", target, e)))
}

async fn dispatch(
    request: Request<Full<Bytes>>,
    timeout_secs: u64,
) -> Result<Response<Incoming>, RedoError> {
    let client = https_client().map_err(|e| RedoError::SendFailed(e.to_string()))?;
    tokio::time::timeout(Duration::from_secs(timeout_secs), client.request(request))
        .await
        .map_err(|_| RedoError::TimedOut(timeout_secs))?
        .map_err(|e| RedoError::SendFailed(e.to_string()))
}

async fn print_response(response: Response<Incoming>) -> Result<(), RedoError> {
    let (parts, body) = response.into_parts();
    println!(
        "{:?} {} {}",
        parts.version,
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    );
    let mut lines: Vec<String> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()))
        })
        .collect();
    lines.sort();
    for line in lines {
        println!("{}", line);
    }
    println!();

    let bytes = body
        .collect()
        .await
        .map_err(|e| RedoError::SendFailed(e.to_string()))?
        .to_bytes();
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}
