//! Backend error types

use std::io;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::controller::ControllerError;
use crate::decode::DecodeError;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The frame decoder could not be created
    #[error("Decoder unavailable: {0}")]
    Decoder(#[from] DecodeError),

    /// The worker thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// The worker thread has exited
    #[error("The playback thread is gone")]
    Disconnected,
}

pub type BackendResult<T> = Result<T, BackendError>;
