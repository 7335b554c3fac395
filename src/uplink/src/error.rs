use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Failure surfaced to callers of the sync engine. Exactly one of these is
/// returned when no source yields usable data.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no such package available: {0}")]
    NotFound(String),

    #[error("this version doesn't exist: {0}")]
    VersionNotFound(String),

    #[error("uplink unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("uplinks replied not modified but no data is cached for {0}")]
    NotModifiedWithoutData(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failure of a single uplink. Recorded per outcome and never propagated on
/// its own; the aggregator decides what the caller sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    #[error("request timed out")]
    Timeout,

    #[error("package not found on uplink")]
    NotFound,

    #[error("uplink returned status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("uplink is offline after repeated failures")]
    Offline,

    #[error("request cancelled")]
    Cancelled,
}

impl UplinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UplinkError::Timeout)
    }

    /// Whether another attempt against the same uplink may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UplinkError::Timeout | UplinkError::Transport(_) => true,
            UplinkError::Status(code) => *code >= 500,
            _ => false,
        }
    }

    /// Whether the failure counts against the uplink's health. A clean 404 means
    /// the uplink answered correctly.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            UplinkError::NotFound | UplinkError::Offline | UplinkError::Cancelled
        )
    }
}

impl From<reqwest::Error> for UplinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UplinkError::Timeout
        } else if e.is_decode() {
            UplinkError::Malformed(e.to_string())
        } else {
            UplinkError::Transport(e.to_string())
        }
    }
}
