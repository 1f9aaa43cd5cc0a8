use std::fmt;

/// Result alias that carries the custom [`LamplightError`] type.
pub type Result<T> = std::result::Result<T, LamplightError>;

/// Host capability the core consumes but does not implement itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Audio,
    Speech,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Audio => f.write_str("audio"),
            Capability::Speech => f.write_str("speech synthesis"),
        }
    }
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LamplightError {
    /// A timed event was scheduled with a negative or non-finite offset.
    #[error("invalid event offset {offset_seconds}s: offsets must be finite and non-negative")]
    InvalidEvent { offset_seconds: f64 },
    /// The host does not provide a capability the caller asked for. Callers
    /// recover from this locally; it is never shown to the user.
    #[error("{0} capability is unavailable on this host")]
    CapabilityUnavailable(Capability),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LamplightError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

/// Outcome of a stop or cancel call. Releasing something twice is not an
/// error, the second call just reports [`Release::AlreadyReleased`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    AlreadyReleased,
}

impl Release {
    pub fn was_released(self) -> bool {
        matches!(self, Release::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_event_mentions_offset() {
        let err = LamplightError::InvalidEvent {
            offset_seconds: -1.5,
        };
        assert!(format!("{err}").contains("-1.5"));
    }

    #[test]
    fn capability_error_names_capability() {
        let err = LamplightError::CapabilityUnavailable(Capability::Speech);
        assert_eq!(
            format!("{err}"),
            "speech synthesis capability is unavailable on this host"
        );
    }
}
