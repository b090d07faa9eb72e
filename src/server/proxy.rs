//! Proxy recording mode: forward to the configured upstream while capturing
//! both halves of the exchange under one correlation identity.
//!
//! The identity and the request arrival time travel to the upstream in two
//! injected headers. The response hook reads them back, so the response
//! record carries the same identity and lands next to the request record on
//! disk even though the two are assembled at different moments. A response
//! that arrives without the headers (the upstream answered from outside the
//! forwarded exchange, or a test drives the hook directly) gets a fresh
//! identity instead.

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone};
use http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, error, warn};
use url::Url;

use crate::configuration::RecordConfig;
use crate::error_handling::NetworkError;
use crate::recording::assembler::{
    build_request_record, build_response_record, cap_text, describe_request, dump_header_lines,
    read_body_capped,
};
use crate::recording::identity::make_transaction_id;
use crate::recording::{Recorder, RecordingTimeline};
use crate::server::direct::text_response;
use crate::server::filter::FilterDecision;

pub const REQUEST_ID_HEADER: &str = "x-hrec-request-id";
pub const REQUEST_RECEIVED_HEADER: &str = "x-hrec-request-received";
pub const RESPONSE_ID_HEADER: &str = "x-hrec-response-id";

static CRYPTO_PROVIDER: OnceLock<()> = OnceLock::new();

/// Builds the shared outbound client: plain HTTP or TLS with native roots,
/// HTTP/1.1 and HTTP/2 both negotiable.
pub(crate) fn https_client(
) -> Result<Client<HttpsConnector<HttpConnector>, Full<Bytes>>, NetworkError> {
    CRYPTO_PROVIDER.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
    let connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| NetworkError::ClientInitFailed(e.to_string()))?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Reusable upstream HTTP client bound to one target base URL.
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    target: Url,
}

impl Forwarder {
    pub fn new(target: Url) -> Result<Self, NetworkError> {
        Ok(Self {
            client: https_client()?,
            target,
        })
    }

    /// Sends the buffered request to the upstream, rewriting the target. The
    /// Host header is dropped so the client derives it from the target URL;
    /// Connection is hop-by-hop and never forwarded.
    pub async fn forward(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
    ) -> Result<Response<Incoming>, NetworkError> {
        let uri = join_target(&self.target, &parts.uri)?;
        let mut request = Request::new(Full::new(body));
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = uri;
        for (name, value) in &parts.headers {
            if name == HOST || name == CONNECTION {
                continue;
            }
            request.headers_mut().append(name, value.clone());
        }
        self.client
            .request(request)
            .await
            .map_err(|e| NetworkError::UpstreamFailed(e.to_string()))
    }
}

/// Joins the target base URL with the inbound request target.
fn join_target(target: &Url, uri: &Uri) -> Result<Uri, NetworkError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}{}", target.as_str().trim_end_matches('/'), path_and_query)
        .parse()
        .map_err(|e: http::uri::InvalidUri| NetworkError::InvalidTarget(e.to_string()))
}

/// Reads the correlation identity and request arrival time back out of the
/// injected headers.
fn recover_identity(headers: &HeaderMap) -> Option<(String, DateTime<Local>)> {
    let id = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.to_string();
    let nanos: i64 = headers
        .get(REQUEST_RECEIVED_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    Some((id, Local.timestamp_nanos(nanos)))
}

/// Handles one request in proxy mode.
///
/// Write ordering is response first, then request: the response record is
/// persisted inside the response hook before the client sees anything, and
/// the request record follows on a detached blocking task.
pub async fn handle<B>(
    config: Arc<RecordConfig>,
    recorder: Arc<Recorder>,
    forwarder: Arc<Forwarder>,
    remote_addr: String,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let mut timeline = RecordingTimeline::started_now();
    let (mut parts, body) = request.into_parts();

    let decision = config.filter.evaluate(parts.uri.path());
    if decision != FilterDecision::Record {
        debug!(
            "forwarding {} {} without recording: {}",
            parts.method,
            parts.uri,
            match decision {
                FilterDecision::NotWhitelisted => "not whitelisted",
                _ => "blacklisted",
            }
        );
        let captured = read_body_capped(body, -1).await;
        return Ok(forward_only(&forwarder, &parts, captured.bytes).await);
    }

    let description = describe_request(&remote_addr, &parts);
    if config.verbose {
        debug!("{}", description);
    }

    let id = make_transaction_id(&description, timeline.request_received);

    // Injection happens before assembly: the record shows the headers as
    // they actually went upstream, correlation fields included.
    if let Ok(value) = HeaderValue::from_str(&id) {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }
    let nanos = timeline.request_received.timestamp_nanos_opt().unwrap_or_default();
    if let Ok(value) = HeaderValue::from_str(&nanos.to_string()) {
        parts.headers.insert(REQUEST_RECEIVED_HEADER, value);
    }

    let captured = read_body_capped(body, -1).await;
    if let Some(e) = &captured.error {
        warn!("body read failed for {}: {}", description, e);
    }

    let mut record = build_request_record(&parts, &remote_addr, timeline.request_received);
    record.base.id = id.clone();
    record.base.body = cap_text(&captured.bytes, config.max_body_size);
    if let Some(trailers) = &captured.trailers {
        record.base.trailers = dump_header_lines(trailers);
    }

    timeline.request_forwarded = Some(Local::now());
    let response = match forwarder.forward(&parts, captured.bytes).await {
        Ok(upstream) => {
            timeline.response_received = Some(Local::now());
            inspect_response(&config, &recorder, &parts.headers, &description, upstream).await
        }
        Err(e) => {
            error!("{}: {}", description, e);
            text_response(StatusCode::BAD_GATEWAY, "Upstream request failed.")
        }
    };

    {
        let recorder = Arc::clone(&recorder);
        let description = description.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = recorder.save_request(record, &description) {
                error!("could not record {}: {}", description, e);
            }
        });
    }

    timeline.response_sent = Some(Local::now());
    if config.verbose {
        debug!("proxied in {}ms", timeline.elapsed_ms());
    }
    Ok(response)
}

async fn forward_only(
    forwarder: &Forwarder,
    parts: &http::request::Parts,
    body: Bytes,
) -> Response<Full<Bytes>> {
    match forwarder.forward(parts, body).await {
        Ok(upstream) => {
            let (mut resp_parts, resp_body) = upstream.into_parts();
            let captured = read_body_capped(resp_body, -1).await;
            resp_parts.headers.remove(TRANSFER_ENCODING);
            Response::from_parts(resp_parts, Full::new(captured.bytes))
        }
        Err(e) => {
            error!("{}", e);
            text_response(StatusCode::BAD_GATEWAY, "Upstream request failed.")
        }
    }
}

/// Response hook: captures the upstream response, persists its record and
/// rebuilds the response for the client with the identity header attached.
async fn inspect_response<B>(
    config: &RecordConfig,
    recorder: &Recorder,
    request_headers: &HeaderMap,
    description: &str,
    response: Response<B>,
) -> Response<Full<Bytes>>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let received = Local::now();
    let (mut parts, body) = response.into_parts();

    // The client must see the complete body, so the capture here is
    // unbounded; the record body is capped separately below.
    let captured = read_body_capped(body, -1).await;
    if let Some(e) = &captured.error {
        warn!("response body read failed for {}: {}", description, e);
    }

    let (id, path_date) = recover_identity(request_headers)
        .unwrap_or_else(|| (make_transaction_id(description, received), received));

    let mut record = build_response_record(&parts, received);
    record.base.id = id.clone();
    record.base.body = cap_text(&captured.bytes, config.max_body_size);
    if let Some(trailers) = &captured.trailers {
        record.base.trailers = dump_header_lines(trailers);
    }

    if let Err(e) = recorder.save_response(record, description, path_date) {
        error!("could not record response for {}: {}", description, e);
    }

    if let Ok(value) = HeaderValue::from_str(&id) {
        parts.headers.insert(RESPONSE_ID_HEADER, value);
    }
    // The relayed body is a plain buffered one: upstream HTTP/1.1 trailers
    // end up in the record but are not re-emitted to the client.
    parts.headers.remove(TRANSFER_ENCODING);
    Response::from_parts(parts, Full::new(captured.bytes))
}
