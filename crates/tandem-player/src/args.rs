//! Command line parsing

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tandem_core::config::StreamConfig;
use tandem_core::{PlayCount, MAX_VOLUME};

pub const USAGE: &str = "\
usage: tandem-player <file.mp3> [options]

  --loop                 repeat until interrupted
  --count N              play N times (0 loops)
  --fade-in MS           fade in over MS milliseconds
  --fade-out-at AT:MS    after AT ms, fade out over MS ms
  --seek MS              start MS milliseconds into the track
  --volume V             starting volume, 0-127 (not with --fade-in)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub path: PathBuf,
    pub count: PlayCount,
    pub fade_in: Option<Duration>,
    /// (when, over how long)
    pub fade_out_at: Option<(Duration, Duration)>,
    pub seek: Option<Duration>,
    pub volume: Option<u8>,
}

impl Options {
    pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut path = None;
        let mut count = PlayCount::ONCE;
        let mut fade_in = None;
        let mut fade_out_at = None;
        let mut seek = None;
        let mut volume = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--loop" => count = PlayCount::Loop,
                "--count" => count = PlayCount::from_count(number(&arg, args.next())?),
                "--fade-in" => fade_in = Some(millis(&arg, args.next())?),
                "--seek" => seek = Some(millis(&arg, args.next())?),
                "--fade-out-at" => {
                    let value = args.next().ok_or_else(|| anyhow!("{} needs a value", arg))?;
                    let (at, over) = value
                        .split_once(':')
                        .ok_or_else(|| anyhow!("{} expects AT:MS, got {:?}", arg, value))?;
                    fade_out_at = Some((
                        millis(&arg, Some(at.to_string()))?,
                        millis(&arg, Some(over.to_string()))?,
                    ));
                }
                "--volume" => {
                    let v: u32 = number(&arg, args.next())?;
                    if v > MAX_VOLUME as u32 {
                        bail!("--volume must be at most {}, got {}", MAX_VOLUME, v);
                    }
                    volume = Some(v as u8);
                }
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                file => {
                    if path.replace(PathBuf::from(file)).is_some() {
                        bail!("only one file can be played");
                    }
                }
            }
        }

        // A fade-in always ends at full volume
        if fade_in.is_some() && volume.is_some() {
            bail!("--fade-in and --volume cannot be combined");
        }

        Ok(Self {
            path: path.ok_or_else(|| anyhow!("no file given"))?,
            count,
            fade_in,
            fade_out_at,
            seek,
            volume,
        })
    }

    /// Stream config for this run: `--volume` is the level every play starts at
    pub fn stream_config(&self, base: StreamConfig) -> StreamConfig {
        match self.volume {
            Some(initial_volume) => StreamConfig {
                initial_volume,
                ..base
            },
            None => base,
        }
    }
}

fn number(flag: &str, value: Option<String>) -> Result<u32> {
    let value = value.ok_or_else(|| anyhow!("{} needs a value", flag))?;
    value
        .trim()
        .parse()
        .with_context(|| format!("{} expects a number, got {:?}", flag, value))
}

fn millis(flag: &str, value: Option<String>) -> Result<Duration> {
    Ok(Duration::from_millis(number(flag, value)? as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Options> {
        Options::parse(line.split_whitespace().map(String::from))
    }

    #[test]
    fn test_file_alone_plays_once() {
        let options = parse("theme.mp3").unwrap();
        assert_eq!(options.path, PathBuf::from("theme.mp3"));
        assert_eq!(options.count, PlayCount::ONCE);
        assert_eq!(options.fade_in, None);
    }

    #[test]
    fn test_all_options() {
        let options =
            parse("--count 3 theme.mp3 --fade-in 500 --fade-out-at 9000:1500 --seek 2000").unwrap();
        assert_eq!(options.count, PlayCount::from_count(3));
        assert_eq!(options.fade_in, Some(Duration::from_millis(500)));
        assert_eq!(
            options.fade_out_at,
            Some((Duration::from_millis(9000), Duration::from_millis(1500)))
        );
        assert_eq!(options.seek, Some(Duration::from_secs(2)));
        assert_eq!(options.volume, None);
    }

    #[test]
    fn test_volume_sets_the_starting_level() {
        let options = parse("theme.mp3 --volume 90").unwrap();
        assert_eq!(options.volume, Some(90));

        let config = options.stream_config(StreamConfig::default());
        assert_eq!(config.initial_volume, 90);
        assert_eq!(config.half_size, StreamConfig::default().half_size);

        let untouched = parse("theme.mp3").unwrap().stream_config(StreamConfig::default());
        assert_eq!(untouched.initial_volume, MAX_VOLUME);
    }

    #[test]
    fn test_count_zero_loops() {
        assert_eq!(parse("a.mp3 --count 0").unwrap().count, PlayCount::Loop);
        assert_eq!(parse("a.mp3 --loop").unwrap().count, PlayCount::Loop);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse("").is_err());
        assert!(parse("a.mp3 b.mp3").is_err());
        assert!(parse("a.mp3 --volume 200").is_err());
        assert!(parse("a.mp3 --fade-in").is_err());
        assert!(parse("a.mp3 --fade-out-at 1000").is_err());
        assert!(parse("a.mp3 --shuffle").is_err());
        assert!(parse("a.mp3 --fade-in 500 --volume 90").is_err());
    }
}
