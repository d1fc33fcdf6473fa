//! Main side of the pipeline
//!
//! - `PlaybackController`: transport intents, refills, play counts
//! - `TrackSlots`: loaded tracks addressed by `TrackId`
//! - `PlaybackEvent`: what the application hears back

mod controller;
mod error;
mod events;
mod slots;

pub use controller::PlaybackController;
pub use error::{ControllerError, ControllerResult};
pub use events::PlaybackEvent;
pub use slots::{TrackId, TrackSlots, TrackState};
