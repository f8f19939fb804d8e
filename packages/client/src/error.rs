use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-2xx status.
    #[error("{message} ({status} {code})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("File is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("Not signed in")]
    NotSignedIn,
    /// The exchange reported an `error` event.
    #[error("{0}")]
    Turn(String),
    #[error("Event stream ended before `done`")]
    StreamClosed,
    #[error("Malformed event stream: {0}")]
    EventStream(String),
}

impl ClientError {
    /// Stable code for the `{success: false, error}` outcome.
    pub fn code(&self) -> &str {
        match self {
            Self::Api { code, .. } => code,
            Self::Http(_) => "NETWORK_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::NotSignedIn => "NOT_SIGNED_IN",
            Self::Turn(_) => "TURN_FAILED",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::EventStream(_) => "STREAM_ERROR",
        }
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
