use provd_proto::{InvalidRequest, Status};

/// Failure reported by a collaborator or detected while validating a request
///
/// Every variant maps to exactly one wire status, see [`ServiceError::status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("authentication failed")]
    Auth,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no network connection")]
    NoConnection,
    #[error("device error: {0}")]
    Device(String),
    #[error("{0} API is disabled")]
    Disabled(&'static str),
    #[error("no SIM present")]
    NoSim,
    #[error("bad configuration: {0}")]
    BadConfig(String),
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::Invalid(msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            ServiceError::Invalid(_) => Status::ErrInvalid,
            ServiceError::Auth => Status::ErrAuth,
            ServiceError::NotFound(_) => Status::ErrNotFound,
            ServiceError::NoConnection => Status::ErrNoConn,
            ServiceError::Device(_) => Status::ErrDevice,
            ServiceError::Disabled(_) => Status::ErrApiDisabled,
            ServiceError::NoSim => Status::ErrNoSim,
            ServiceError::BadConfig(_) => Status::ErrBadConfig,
            ServiceError::Timeout => Status::ErrTimeout,
            ServiceError::Other(_) => Status::ErrUnknown,
        }
    }
}

impl From<InvalidRequest> for ServiceError {
    fn from(e: InvalidRequest) -> Self {
        ServiceError::Invalid(e.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
