//! Encoded stream plumbing between the two sides
//!
//! ```text
//!   main side                                         sound side
//!   ┌────────────────┐   publish    ┌─────────────┐   acquire   ┌───────────────┐
//!   │ StreamSupplier │ ───────────► │ halves A, B │ ──────────► │ StreamManager │
//!   │  (TrackSource) │ ◄─ refill ── │  (shared)   │ ◄─ retract ─│ (2H window)   │
//!   └────────────────┘   requests   └─────────────┘             └───────────────┘
//! ```
//!
//! Refill requests and end-of-stream travel over the message channel; the
//! buffer itself only carries bytes and publication state.

mod buffer;
mod error;
mod manager;
mod source;
mod supplier;

pub use buffer::{EncodedDoubleBuffer, StreamGeometry, StreamSettings};
pub use error::{GeometryError, SupplyError, SupplyResult, TrackFormatError};
pub use manager::{ManagerState, StreamManager, StreamStep};
pub use source::{
    Bitrate, Container, TrackInfo, TrackReader, TrackSource, TRACK_HEADER_LEN, TRACK_TAG,
};
pub use supplier::{RefillOutcome, StreamSupplier};
