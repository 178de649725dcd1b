use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ScoringError {
    #[error("invalid scoring input: {0}")]
    InvalidInput(String),
    #[error("AI request failed: {0}")]
    Transport(String),
    #[error("AI request timed out after {0}s")]
    Timeout(u64),
    #[error("AI endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

impl ScoringError {
    /// Short label used for metrics and structured logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    pub(super) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}
