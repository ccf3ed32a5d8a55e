//! JobClaw error type — one enum for the whole workspace.

use thiserror::Error;

/// Convenience result alias used across all JobClaw crates.
pub type Result<T> = std::result::Result<T, JobClawError>;

#[derive(Error, Debug)]
pub enum JobClawError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    /// Transport (SMTP/IMAP) failure. `transient` decides whether the
    /// retry wrapper may attempt the call again.
    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    #[error("Composer error: {0}")]
    Composer(String),

    #[error("Status sync error: {0}")]
    Sync(String),

    /// A contact row violates a required precondition (e.g. a follow-up
    /// stage with no recorded reference date). Never auto-repaired.
    #[error("Data integrity fault: {0}")]
    Integrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobClawError {
    /// A transport failure worth retrying: rate limiting, server busy,
    /// connection reset, timeout, DNS resolution.
    pub fn transport_transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            transient: true,
        }
    }

    /// A transport failure that retrying cannot fix: bad recipient,
    /// revoked credentials, malformed message.
    pub fn transport_permanent(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience_classification() {
        assert!(JobClawError::transport_transient("451 busy").is_transient());
        assert!(!JobClawError::transport_permanent("550 no such user").is_transient());
        assert!(!JobClawError::Composer("model refused".into()).is_transient());
    }
}
