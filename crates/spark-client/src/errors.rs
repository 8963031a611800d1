/// Failures that end a single stream session.
///
/// These are stored in `SessionOutcome` and shown on the render target, so
/// they carry owned strings rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A recognized event carried a payload that does not match its schema.
    #[error("malformed `{event}` payload: {reason}")]
    MalformedPayload { event: String, reason: String },
    /// The service reported a failure through an `error` event.
    #[error("{message}")]
    Server { message: String },
    /// The byte stream failed while the reply was being received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The caller aborted the session.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub(crate) fn malformed(event: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Top-level error type for the client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to a request builder.
    #[error("validation error: {0}")]
    Validation(String),
    /// The service answered with a non-success status.
    #[error("request to {url} failed with status {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },
    /// The request could not be sent or its response could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// A JSON response did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),
    /// A stream session ended without completing.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ClientError {
    /// Returns the HTTP status when the service rejected the request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
