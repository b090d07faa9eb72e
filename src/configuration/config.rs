use std::fmt::Write as _;
use std::str::FromStr;

use chrono::Local;
use clap::Args;
use log::info;
use regex::Regex;
use url::Url;

use super::types::RecordConfig;
use crate::error_handling::types::ConfigError;
use crate::redaction::rules::{RedactRule, RedactRules};
use crate::server::filter::PathFilter;

/// Raw command-line arguments for the `record` subcommand.
///
/// These are unvalidated strings; [`RecordConfig::from_args`] compiles the
/// patterns, parses the target URL and checks the date template once at
/// startup. Any failure there is fatal before the listener binds.
#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Interface and port to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// chrono format of the date used in record filenames; required
    /// subfolders are created automatically.
    #[arg(long, default_value = "%Y-%m-%d/%H-%M-%S_")]
    pub date_format: String,

    /// If set, record only requests whose URL path matches this pattern.
    #[arg(long)]
    pub only_path: Option<String>,

    /// If set, skip requests whose URL path matches this pattern.
    #[arg(long)]
    pub except_path: Option<String>,

    /// Maximum size of body in bytes that will be recorded, `-1` for no limit.
    #[arg(long, default_value_t = -1)]
    pub max_body_size: i64,

    /// Redact matching parts of the request/response body. A rule is
    /// `pattern` or `pattern/replacement`; may be given multiple times.
    #[arg(long = "redact-body", value_parser = RedactRule::from_str)]
    pub redact_body: Vec<RedactRule>,

    /// Redact matching parts of header and trailer lines. Same syntax as
    /// `--redact-body`; may be given multiple times.
    #[arg(long = "redact-headers", value_parser = RedactRule::from_str)]
    pub redact_headers: Vec<RedactRule>,

    /// Target URL used when proxy mode is enabled.
    #[arg(long)]
    pub target_url: Option<String>,

    /// Echo the recorded request back in the response body.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub echo: bool,

    /// Append one identity/path/description line per record to `index.log`.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub index: bool,

    /// Enable proxy mode: forward to --target-url while recording.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub proxy: bool,

    /// Log per-request processing details.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl RecordConfig {
    /// Validates the raw arguments into an immutable configuration.
    pub fn from_args(args: RecordArgs) -> Result<Self, ConfigError> {
        let listen = args
            .listen
            .parse()
            .map_err(|e| ConfigError::BadListenAddress(format!("{}: {}", args.listen, e)))?;

        check_date_format(&args.date_format)?;

        let filter = PathFilter::new(
            compile_pattern(args.only_path.as_deref())?,
            compile_pattern(args.except_path.as_deref())?,
        );

        let target_url = match args.target_url.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| ConfigError::BadTargetUrl(format!("{}: {}", raw, e)))?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ConfigError::BadTargetUrl(format!(
                        "{}: scheme must be http or https",
                        raw
                    )));
                }
                Some(url)
            }
        };

        if args.proxy && target_url.is_none() {
            return Err(ConfigError::MissingTargetUrl);
        }

        Ok(Self {
            listen,
            date_format: args.date_format,
            filter,
            max_body_size: args.max_body_size,
            redact_body: RedactRules::new(args.redact_body),
            redact_headers: RedactRules::new(args.redact_headers),
            target_url,
            echo: args.echo,
            index: args.index,
            proxy: args.proxy,
            verbose: args.verbose,
        })
    }

    /// Logs the effective configuration, one line per setting.
    pub fn log_settings(&self) {
        info!("  listen: {}", self.listen);
        info!("  date-format: {}", self.date_format);
        info!("  only-path: {}", self.filter.only_pattern().unwrap_or("-"));
        info!(
            "  except-path: {}",
            self.filter.except_pattern().unwrap_or("-")
        );
        info!("  max-body-size: {}", self.max_body_size);
        info!("  redact-body: {}", self.redact_body);
        info!("  redact-headers: {}", self.redact_headers);
        info!(
            "  target-url: {}",
            self.target_url.as_ref().map(Url::as_str).unwrap_or("-")
        );
        info!("  echo: {}", self.echo);
        info!("  index: {}", self.index);
        info!("  proxy: {}", self.proxy);
        info!("  verbose: {}", self.verbose);
    }
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| ConfigError::BadPathPattern(format!("{}: {}", p, e))),
    }
}

/// chrono reports unknown specifiers only when the formatted value is
/// actually written out, so render a sample timestamp to surface them now.
fn check_date_format(format: &str) -> Result<(), ConfigError> {
    let mut rendered = String::new();
    write!(rendered, "{}", Local::now().format(format))
        .map_err(|_| ConfigError::BadDateFormat(format.to_string()))?;
    Ok(())
}
