//! Tandem Core - cross-processor double-buffered MP3 streaming
//!
//! The main side reads an encoded file into a shared double buffer and the
//! sound side decodes it frame by frame, asking for refills as it drains
//! each half. The two sides only talk through the message channel.

pub mod backend;
pub mod channel;
pub mod config;
pub mod controller;
pub mod decode;
pub mod playback;
pub mod stream;
pub mod types;

pub use types::*;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod tests;
