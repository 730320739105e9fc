//! Error types for the remote state layer

use thiserror::Error;

/// Errors surfaced by `RemoteStateClient` implementations.
///
/// Conflicts ("already exists") are never errors here; they are absorbed
/// into `CreateOutcome::AlreadyExists` by the client implementations.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connection-level failure (DNS, TLS, refused connection)
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The remote answered with a non-success HTTP status
    #[error("remote returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// Credentials were rejected; fatal for the whole run
    #[error("authorization rejected: {0}")]
    Authorization(String),

    /// The response body could not be decoded
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// Timeouts, transport failures, 5xx responses, and rate limiting are
    /// transient. Client errors and rejected credentials are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status { code, .. } => *code >= 500 || *code == 429,
            RemoteError::Authorization(_) | RemoteError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Transport("refused".into()).is_transient());
        assert!(RemoteError::Timeout("30s".into()).is_transient());
        assert!(RemoteError::Status {
            code: 502,
            message: "bad gateway".into()
        }
        .is_transient());
        assert!(RemoteError::Status {
            code: 429,
            message: "slow down".into()
        }
        .is_transient());

        assert!(!RemoteError::Status {
            code: 422,
            message: "validation".into()
        }
        .is_transient());
        assert!(!RemoteError::Authorization("bad credentials".into()).is_transient());
        assert!(!RemoteError::Decode("truncated json".into()).is_transient());
    }
}
