use std::fmt;

/// Startup-time configuration failures. Any of these is fatal: the process
/// reports the problem and exits before serving traffic.
#[derive(Debug)]
pub enum ConfigError {
    BadRedactRule(String),
    BadPathPattern(String),
    BadDateFormat(String),
    BadListenAddress(String),
    BadTargetUrl(String),
    MissingTargetUrl,
    IndexOpenFailed(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadRedactRule(e) => write!(f, "Redaction rule error: {}", e),
            ConfigError::BadPathPattern(e) => write!(f, "Path pattern error: {}", e),
            ConfigError::BadDateFormat(e) => write!(f, "Date format error: {}", e),
            ConfigError::BadListenAddress(e) => write!(f, "Listen address error: {}", e),
            ConfigError::BadTargetUrl(e) => write!(f, "Target URL error: {}", e),
            ConfigError::MissingTargetUrl => {
                write!(f, "Target URL is required when proxy mode is enabled")
            }
            ConfigError::IndexOpenFailed(e) => write!(f, "Index log error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-transaction persistence failures. These are logged and abandon the
/// record at the failing step; the client-facing response is never affected.
#[derive(Debug)]
pub enum StorageError {
    CreateDirFailed(std::io::Error),
    SerializeFailed(serde_json::Error),
    WriteFailed(std::io::Error),
    IndexAppendFailed(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDirFailed(e) => write!(f, "Directory creation failed: {}", e),
            StorageError::SerializeFailed(e) => write!(f, "Record serialization failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Record write failed: {}", e),
            StorageError::IndexAppendFailed(e) => write!(f, "Index append failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum NetworkError {
    BindFailed(std::io::Error),
    AcceptFailed(std::io::Error),
    ClientInitFailed(String),
    InvalidTarget(String),
    UpstreamFailed(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindFailed(e) => write!(f, "Network bind error: {}", e),
            NetworkError::AcceptFailed(e) => write!(f, "Accept error: {}", e),
            NetworkError::ClientInitFailed(e) => write!(f, "HTTP client init error: {}", e),
            NetworkError::InvalidTarget(e) => write!(f, "Invalid forward target: {}", e),
            NetworkError::UpstreamFailed(e) => write!(f, "Upstream request failed: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum RedoError {
    ReadFailed(std::io::Error),
    ParseFailed(serde_json::Error),
    InvalidRequest(String),
    SendFailed(String),
    TimedOut(u64),
}

impl fmt::Display for RedoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedoError::ReadFailed(e) => write!(f, "Request file read error: {}", e),
            RedoError::ParseFailed(e) => write!(f, "Request file parse error: {}", e),
            RedoError::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            RedoError::SendFailed(e) => write!(f, "Request send error: {}", e),
            RedoError::TimedOut(secs) => write!(f, "Request timed out after {}s", secs),
        }
    }
}

impl std::error::Error for RedoError {}
