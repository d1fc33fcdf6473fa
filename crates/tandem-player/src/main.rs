//! Tandem Player - play one MP3 file through the streaming pipeline
//!
//! Loads the stream config from the default config directory
//! (`stream.yaml`), starts the default backend and drives it until the
//! track has finished. Set RUST_LOG=debug for the refill traffic.

mod args;

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tandem_core::backend::{DefaultBackend, MusicBackend};
use tandem_core::config::{default_config_path, load_config};
use tandem_core::controller::PlaybackEvent;

use args::{Options, USAGE};

const UPDATE_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = match Options::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = options.stream_config(load_config(&default_config_path("stream.yaml")));
    log::info!(
        "tandem-player starting: {:?}, {} byte halves",
        options.path,
        config.half_size
    );

    let mut backend = DefaultBackend::new(&config).context("Failed to start playback")?;
    let events = backend.events();
    let track = backend
        .load(&options.path)
        .with_context(|| format!("Failed to load {:?}", options.path))?;

    match options.fade_in {
        Some(duration) => backend.play_with_fade_in(track, duration, options.count)?,
        None => backend.play(track, options.count)?,
    }
    if let Some(position) = options.seek {
        backend.seek(position)?;
    }

    let started = Instant::now();
    let mut fade_out = options.fade_out_at;
    while backend.is_playing() {
        backend.update(UPDATE_INTERVAL)?;

        if let Some((at, over)) = fade_out {
            if started.elapsed() >= at {
                log::info!("main: fading out over {}ms", over.as_millis());
                backend.fade_out(over)?;
                fade_out = None;
            }
        }

        for event in events.try_iter() {
            match event {
                PlaybackEvent::BufferRefilled { .. } => log::debug!("main: {:?}", event),
                PlaybackEvent::Failed { track, status } => {
                    eprintln!("{} failed: {}", track, status)
                }
                PlaybackEvent::NoChannelAvailable { .. } => {
                    eprintln!("No output channel is available")
                }
                other => log::info!("main: {:?}", other),
            }
        }
    }

    let status = backend.clear_status();
    if !status.is_ok() {
        bail!("Playback ended with {}", status);
    }
    log::info!("tandem-player finished after {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}
