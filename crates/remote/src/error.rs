use thiserror::Error;

/// Errors surfaced by remote authority adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("authority responded with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid authority configuration: {0}")]
    Config(String),

    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Map a non-success HTTP status to an error.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => RemoteError::Unauthorized,
            404 => RemoteError::NotFound,
            other => RemoteError::Status(other),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status.as_u16())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(RemoteError::from_status(401), RemoteError::Unauthorized));
        assert!(matches!(RemoteError::from_status(403), RemoteError::Unauthorized));
        assert!(matches!(RemoteError::from_status(404), RemoteError::NotFound));
        assert!(matches!(RemoteError::from_status(503), RemoteError::Status(503)));
    }
}
