/// Crate-wide result alias.
pub type VestureResult<T> = Result<T, VestureError>;

/// Coarse failure bucket used by callers to pick a recovery action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network transfer failed; the user may retry the download.
    Transport,
    /// Local model files are missing or corrupt; offer a restart from scratch.
    Asset,
    /// Inference failed or produced nothing usable.
    Inference,
    /// The operation was requested in a state that does not allow it.
    Precondition,
    /// Invalid input, configuration, or an unexpected internal failure.
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum VestureError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {detail}")]
    Transport { detail: String, status: Option<u16> },

    #[error("asset error: {0}")]
    Asset(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VestureError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            detail: msg.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16, url: &str) -> Self {
        Self::Transport {
            detail: format!("HTTP {status} from {url}"),
            status: Some(status),
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// The generation engine is not loaded.
    pub fn engine_not_available() -> Self {
        Self::Precondition("engine not available: the generative model is not loaded".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Asset(_) => ErrorKind::Asset,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Validation(_) | Self::Serde(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for VestureError {
    fn from(err: std::io::Error) -> Self {
        VestureError::Asset(err.to_string())
    }
}

impl From<image::ImageError> for VestureError {
    fn from(err: image::ImageError) -> Self {
        VestureError::Validation(format!("image: {err}"))
    }
}

impl From<serde_json::Error> for VestureError {
    fn from(err: serde_json::Error) -> Self {
        VestureError::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
