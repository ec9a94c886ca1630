use clipbot_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("probe binary not found: {binary}")]
    ProbeUnavailable { binary: String },

    #[error("probe exited with an error: {stderr}")]
    ProbeFailed { stderr: String },

    #[error("probe timed out after {timeout_ms}ms")]
    ProbeTimeout { timeout_ms: u64 },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn probe_unavailable(binary: impl Into<String>) -> Self {
        Self::ProbeUnavailable {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn probe_failed(stderr: impl Into<String>) -> Self {
        Self::ProbeFailed {
            stderr: stderr.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

clipbot_common::impl_context!();
