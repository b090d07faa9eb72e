//! Direct recording mode: every inbound request is captured and answered
//! locally, nothing is forwarded.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use log::{debug, error, warn};

use crate::configuration::RecordConfig;
use crate::recording::assembler::{
    build_request_record, describe_request, dump_header_lines, read_body_capped,
};
use crate::recording::{Recorder, RecordingTimeline};
use crate::server::filter::FilterDecision;

pub(crate) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Handles one request in direct mode.
///
/// The 201 is written before the record hits disk; persistence runs on a
/// blocking task so storage latency and storage failures never reach the
/// client. Echo mode is the exception, it must wait for the serialized
/// record to send it back.
pub async fn handle<B>(
    config: Arc<RecordConfig>,
    recorder: Arc<Recorder>,
    remote_addr: String,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let mut timeline = RecordingTimeline::started_now();
    let (parts, body) = request.into_parts();

    match config.filter.evaluate(parts.uri.path()) {
        FilterDecision::NotWhitelisted => {
            debug!("skipping {} {}: not whitelisted", parts.method, parts.uri);
            return Ok(text_response(StatusCode::OK, "Skipped: not whitelisted."));
        }
        FilterDecision::Blacklisted => {
            debug!("skipping {} {}: blacklisted", parts.method, parts.uri);
            return Ok(text_response(StatusCode::OK, "Skipped: blacklisted."));
        }
        FilterDecision::Record => {}
    }

    let description = describe_request(&remote_addr, &parts);
    if config.verbose {
        debug!("{}", description);
    }

    let captured = read_body_capped(body, config.max_body_size).await;
    if let Some(e) = &captured.error {
        warn!("body read failed for {}: {}", description, e);
    }

    let mut record = build_request_record(&parts, &remote_addr, timeline.request_received);
    record.base.body = String::from_utf8_lossy(&captured.bytes).into_owned();
    if let Some(trailers) = &captured.trailers {
        record.base.trailers = dump_header_lines(trailers);
    }

    let response = if config.echo {
        // Serialization happens up front so the echoed record is in the
        // response regardless of how the disk write goes; the write itself
        // still runs off the client path.
        match recorder.prepare_request(record, &description) {
            Ok(prepared) => {
                let mut body = prepared.json.clone();
                body.extend_from_slice(b"\n\nRecorded.");
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = recorder.persist_prepared(&prepared, &description) {
                        error!("could not record {}: {}", description, e);
                    }
                });
                text_response(StatusCode::CREATED, body)
            }
            Err(e) => {
                error!("could not record {}: {}", description, e);
                text_response(StatusCode::CREATED, "Recorded.")
            }
        }
    } else {
        tokio::task::spawn_blocking(move || {
            if let Err(e) = recorder.save_request(record, &description) {
                error!("could not record {}: {}", description, e);
            }
        });
        text_response(StatusCode::CREATED, "Recorded.")
    };

    timeline.response_sent = Some(chrono::Local::now());
    if config.verbose {
        debug!("handled in {}ms", timeline.elapsed_ms());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::config::RecordArgs;
    use crate::recording::RequestRecord;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(tweak: impl FnOnce(&mut RecordArgs)) -> (Arc<RecordConfig>, Arc<Recorder>, TempDir) {
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
        let config = Arc::new(RecordConfig::from_args(args).expect("config"));
        let dir = TempDir::new().expect("tempdir");
        let recorder = Arc::new(Recorder::new(&config, dir.path()).expect("recorder"));
        (config, recorder, dir)
    }

    fn post(path: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("host", "example.test")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .expect("request")
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn wait_for_record(dir: &TempDir) -> std::path::PathBuf {
        for _ in 0..50 {
            let found = std::fs::read_dir(dir.path())
                .expect("read_dir")
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| p.extension().map(|e| e == "json").unwrap_or(false));
            if let Some(path) = found {
                return path;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no record file appeared");
    }

    #[tokio::test]
    async fn request_is_recorded_and_acknowledged() {
        let (config, recorder, dir) = setup(|_| {});
        let response = handle(config, recorder, "127.0.0.1:4000".into(), post("/api/x", "hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, "Recorded.");

        let path = wait_for_record(&dir).await;
        let record: RequestRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).expect("record parses");
        assert_eq!(record.method, "POST");
        assert_eq!(record.path, "/api/x");
        assert_eq!(record.base.body, "hello");
        assert!(!record.base.id.is_empty());
    }

    #[tokio::test]
    async fn non_whitelisted_path_is_skipped() {
        let (config, recorder, dir) = setup(|args| args.only_path = Some("^/api".into()));
        let response = handle(config, recorder, "127.0.0.1:4000".into(), post("/health", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Skipped: not whitelisted.");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn blacklisted_path_is_skipped() {
        let (config, recorder, _dir) = setup(|args| args.except_path = Some("/admin".into()));
        let response = handle(config, recorder, "127.0.0.1:4000".into(), post("/admin/x", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Skipped: blacklisted.");
    }

    #[tokio::test]
    async fn echo_returns_the_persisted_record() {
        let (config, recorder, _dir) = setup(|args| args.echo = true);
        let response = handle(config, recorder, "127.0.0.1:4000".into(), post("/api/x", "ping"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let echoed = body_text(response).await;
        let json = echoed
            .strip_suffix("\n\nRecorded.")
            .expect("echo ends with the acknowledgement");
        let record: RequestRecord = serde_json::from_str(json).expect("echo is a record");
        assert_eq!(record.method, "POST");
        assert_eq!(record.base.body, "ping");
    }

    #[tokio::test]
    async fn echo_does_not_depend_on_the_disk_write() {
        // Root the recorder below a regular file so every write fails; the
        // echoed record must still reach the client.
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("blocker"), b"").expect("blocker file");

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
        args.echo = true;
        let config = Arc::new(RecordConfig::from_args(args).expect("config"));
        let recorder = Arc::new(
            Recorder::new(&config, dir.path().join("blocker").join("sub")).expect("recorder"),
        );

        let response = handle(config, recorder, "127.0.0.1:4000".into(), post("/api/x", "ping"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let echoed = body_text(response).await;
        let json = echoed
            .strip_suffix("\n\nRecorded.")
            .expect("echo ends with the acknowledgement");
        let record: RequestRecord = serde_json::from_str(json).expect("echo is a record");
        assert_eq!(record.base.body, "ping");
    }

    #[tokio::test]
    async fn body_is_truncated_to_the_cap() {
        let (config, recorder, dir) = setup(|args| args.max_body_size = 4);
        handle(config, recorder, "127.0.0.1:4000".into(), post("/api/x", "0123456789"))
            .await
            .unwrap();

        let path = wait_for_record(&dir).await;
        let record: RequestRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(record.base.body, "0123");
    }
}
