use std::net::SocketAddr;

use url::Url;

use crate::redaction::rules::RedactRules;
use crate::server::filter::PathFilter;

/// Validated, immutable runtime configuration for `record` mode.
///
/// Built once at startup from the raw command-line arguments and then passed
/// by `Arc` into every component. Nothing in here changes while the process
/// serves traffic.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Address the listener binds to.
    pub listen: SocketAddr,
    /// chrono strftime template rendered over the arrival time to produce the
    /// record file path prefix. Directories in the rendered portion are
    /// created on demand.
    pub date_format: String,
    /// Allow/deny path filter applied before any capture happens.
    pub filter: PathFilter,
    /// Upper bound on captured body bytes, `-1` for unbounded.
    pub max_body_size: i64,
    /// Rules applied to the body before persistence.
    pub redact_body: RedactRules,
    /// Rules applied to each header and trailer line before persistence.
    pub redact_headers: RedactRules,
    /// Upstream target; present exactly when `proxy` is set.
    pub target_url: Option<Url>,
    /// Echo the assembled request record in the 201 response body.
    pub echo: bool,
    /// Append an identity/path/description line per record to `index.log`.
    pub index: bool,
    /// Forward traffic to `target_url` while recording it.
    pub proxy: bool,
    /// Log per-transaction processing at debug level.
    pub verbose: bool,
}
