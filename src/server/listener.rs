//! Accept loop: one spawned task per connection, HTTP/1.1 served by hyper.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::configuration::RecordConfig;
use crate::error_handling::NetworkError;
use crate::recording::Recorder;
use crate::server::proxy::Forwarder;
use crate::server::{direct, proxy};

/// Binds the configured address and serves until the process is stopped.
pub async fn serve(config: RecordConfig, recorder: Recorder) -> Result<(), NetworkError> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(NetworkError::BindFailed)?;
    info!(
        "hrec is listening on {} ({} mode)...",
        config.listen,
        if config.proxy { "proxy" } else { "direct" }
    );
    run(listener, config, recorder).await
}

/// Serves on an already-bound listener. Split out from [`serve`] so tests can
/// bind an ephemeral port themselves.
pub async fn run(
    listener: TcpListener,
    config: RecordConfig,
    recorder: Recorder,
) -> Result<(), NetworkError> {
    let config = Arc::new(config);
    let recorder = Arc::new(recorder);
    let forwarder = match (config.proxy, &config.target_url) {
        (true, Some(url)) => Some(Arc::new(Forwarder::new(url.clone())?)),
        _ => None,
    };

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{}", NetworkError::AcceptFailed(e));
                continue;
            }
        };

        let config = Arc::clone(&config);
        let recorder = Arc::clone(&recorder);
        let forwarder = forwarder.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |request| {
                let config = Arc::clone(&config);
                let recorder = Arc::clone(&recorder);
                let forwarder = forwarder.clone();
                let remote_addr = remote.to_string();
                async move {
                    match forwarder {
                        Some(forwarder) => {
                            proxy::handle(config, recorder, forwarder, remote_addr, request).await
                        }
                        None => direct::handle(config, recorder, remote_addr, request).await,
                    }
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("connection from {} ended with error: {}", remote, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::config::RecordArgs;
    use crate::recording::{RequestRecord, ResponseRecord};
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use http_body_util::{BodyExt, Full};
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn start_server(tweak: impl FnOnce(&mut RecordArgs)) -> (SocketAddr, TempDir) {
        let mut args = RecordArgs {
            listen: "127.0.0.1:0".into(),
            date_format: "rec_".into(),
            only_path: None,
            except_path: None,
            max_body_size: -1,
            redact_body: Vec::new(),
            redact_headers: Vec::new(),
            target_url: None,
            echo: false,
            index: false,
            proxy: false,
            verbose: false,
        };
        tweak(&mut args);
        let config = RecordConfig::from_args(args).expect("config");
        let dir = TempDir::new().expect("tempdir");
        let recorder = Recorder::new(&config, dir.path()).expect("recorder");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = run(listener, config, recorder).await;
        });
        (addr, dir)
    }

    /// Minimal fixed-response upstream for proxy tests.
    async fn start_upstream(body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let service = service_fn(move |_request: Request<hyper::body::Incoming>| async move {
                        Ok::<_, std::convert::Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("content-type", "text/plain")
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    async fn find_record(dir: &TempDir, suffix: &str) -> PathBuf {
        for _ in 0..50 {
            let found = std::fs::read_dir(dir.path())
                .expect("read_dir")
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| p.to_string_lossy().ends_with(suffix));
            if let Some(path) = found {
                return path;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no {} file appeared", suffix);
    }

    #[tokio::test]
    async fn direct_mode_records_over_a_real_socket() {
        let (addr, dir) = start_server(|_| {}).await;
        let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

        let request = Request::builder()
            .method("POST")
            .uri(format!("http://{}/api/items?tag=a", addr))
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();
        let response = client.request(request).await.expect("request succeeds");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Recorded.");

        let path = find_record(&dir, "request.json").await;
        let record: RequestRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(record.method, "POST");
        assert_eq!(record.path, "/api/items");
        assert_eq!(record.query, vec!["tag: a".to_string()]);
        assert_eq!(record.base.body, "payload");
    }

    #[tokio::test]
    async fn proxy_mode_forwards_and_records_both_halves() {
        let upstream = start_upstream("pong from upstream").await;
        let (addr, dir) = start_server(|args| {
            args.proxy = true;
            args.target_url = Some(format!("http://{}", upstream));
        })
        .await;
        let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

        let request = Request::builder()
            .uri(format!("http://{}/ping", addr))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = client.request(request).await.expect("request succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        let tagged = response
            .headers()
            .get(proxy::RESPONSE_ID_HEADER)
            .expect("identity header on proxied response")
            .to_str()
            .unwrap()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"pong from upstream");

        let response_path = find_record(&dir, "response.json").await;
        let request_path = find_record(&dir, "request.json").await;

        let req_record: RequestRecord =
            serde_json::from_slice(&std::fs::read(&request_path).unwrap()).unwrap();
        let resp_record: ResponseRecord =
            serde_json::from_slice(&std::fs::read(&response_path).unwrap()).unwrap();
        assert_eq!(req_record.base.id, tagged);
        assert_eq!(resp_record.base.id, tagged);
        // The recorded request headers are the ones sent upstream, so the
        // injected correlation headers appear in the record too.
        assert!(req_record
            .base
            .headers
            .contains(&format!("x-hrec-request-id: {}", tagged)));
        assert!(req_record
            .base
            .headers
            .iter()
            .any(|line| line.starts_with("x-hrec-request-received: ")));
        assert_eq!(resp_record.status_code, 200);
        assert_eq!(resp_record.base.body, "pong from upstream");

        // Both halves share the rendered filename prefix.
        let req_name = request_path.file_name().unwrap().to_string_lossy().into_owned();
        let resp_name = response_path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(
            req_name.strip_suffix("request.json"),
            resp_name.strip_suffix("response.json")
        );
    }

    #[tokio::test]
    async fn proxy_mode_answers_502_when_upstream_is_down() {
        // Bind then drop, so the port is very likely unused.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let (addr, _dir) = start_server(|args| {
            args.proxy = true;
            args.target_url = Some(format!("http://{}", dead_addr));
        })
        .await;
        let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

        let request = Request::builder()
            .uri(format!("http://{}/anything", addr))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = client.request(request).await.expect("request succeeds");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
