//! Message channel error types

use thiserror::Error;

/// Which processor an endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Main,
    Sound,
}

impl Side {
    pub fn peer(self) -> Self {
        match self {
            Side::Main => Side::Sound,
            Side::Sound => Side::Main,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Main => write!(f, "main"),
            Side::Sound => write!(f, "sound"),
        }
    }
}

/// Errors raised by the message channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The queue stayed full through the retry budget; the channel was reset
    #[error("Message queue to the {peer} side stayed full after {attempts} attempts")]
    Timeout { peer: Side, attempts: u32 },

    /// The channel was reset and this side has not resynchronised yet
    #[error("The {side} side has not acknowledged the last channel reset")]
    ResetPending { side: Side },

    /// The peer endpoint has been dropped
    #[error("The {peer} side endpoint is gone")]
    Disconnected { peer: Side },

    /// Both endpoints of the hub have already been handed out
    #[error("The {0} side endpoint is already registered")]
    AlreadyRegistered(Side),
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
