//! Configuration for the streaming pipeline
//!
//! - Generic YAML config loading/saving
//! - Default config location
//! - `StreamConfig`: buffer geometry, queue sizing and service cadence
//!
//! # Usage
//!
//! ```ignore
//! use tandem_core::config::{load_config, default_config_path, StreamConfig};
//!
//! let config: StreamConfig = load_config(&default_config_path("stream.yaml"));
//! ```

mod io;
mod paths;
mod stream;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use stream::StreamConfig;
