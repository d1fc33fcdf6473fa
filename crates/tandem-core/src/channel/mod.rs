//! Message channel between the main side and the sound side
//!
//! Two lock-free SPSC queues (one per direction) plus a doorbell per side.
//! Sending pushes the message and rings the peer's doorbell, which is the
//! only way one side wakes the other.
//!
//! ```text
//! Main side                                      Sound side
//! ┌──────────────┐   Command (rtrb SPSC)      ┌──────────────┐
//! │ MainEndpoint │───────────────────────────►│SoundEndpoint │
//! │              │◄───────────────────────────│              │
//! └──────────────┘   Notification (rtrb SPSC) └──────────────┘
//!        ▲ ring                                      ▲ ring
//!   main doorbell                              sound doorbell
//! ```
//!
//! Sends block with a bounded retry budget when the queue is full. Running
//! out of budget resets the channel: every message in flight is discarded in
//! both directions, the send fails with [`ChannelError::Timeout`], and each
//! side must acknowledge the reset with [`Endpoint::take_reset`] before it
//! can use the channel again.

mod doorbell;
mod endpoint;
mod error;
mod message;

pub use doorbell::Doorbell;
pub use endpoint::{message_channel, ChannelHub, Endpoint, MainEndpoint, SoundEndpoint};
pub use error::{ChannelError, ChannelResult, Side};
pub use message::{Command, Notification, PackedGeometry, MAX_PACKED_DELTA, MAX_PACKED_HALF_SIZE};
