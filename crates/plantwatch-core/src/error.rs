//! Error taxonomy shared by every layer of the engine.

use thiserror::Error;

/// Result alias used throughout `plantwatch-core`.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Everything that can go wrong between the plant backend and a consumer.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// No credential, or the backend rejected it. Never retried.
    #[error("not authenticated: {0}")]
    Auth(String),

    /// Transport failure (connect, read, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("server returned {status}: {detail}")]
    Server { status: u16, detail: String },

    /// A push frame that is not valid structured data.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Whether retrying later may succeed: the transport or the remote side
    /// failed, not the credential, a frame or local state.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::Server {
                status: status.as_u16(),
                detail: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TelemetryError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TelemetryError::Network("reset".into()).is_transient());
        assert!(
            TelemetryError::Server {
                status: 502,
                detail: "bad gateway".into()
            }
            .is_transient()
        );
        assert!(!TelemetryError::Auth("no token".into()).is_transient());
        assert!(!TelemetryError::MalformedFrame("eof".into()).is_transient());
    }

    #[tokio::test]
    async fn test_reqwest_send_failure_is_network() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/plant/history")
            .send()
            .await
            .unwrap_err();
        let err = TelemetryError::from(err);
        assert!(matches!(err, TelemetryError::Network(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_server_error_display_includes_detail() {
        let e = TelemetryError::Server {
            status: 500,
            detail: "database offline".into(),
        };
        assert_eq!(e.to_string(), "server returned 500: database offline");
    }
}
