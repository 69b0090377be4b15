use reqwest::StatusCode;

/// Everything that can go wrong talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level HTTP failure: connect, timeout, body decode.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// Gateway socket failure.
    #[error("gateway: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A gateway frame that did not parse as an envelope.
    #[error("malformed gateway frame: {0}")]
    Frame(#[from] serde_json::Error),

    /// An authenticated call was made before any session existed.
    #[error("no session token")]
    MissingToken,
}

impl ClientError {
    /// Status of the server rejection, when this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
