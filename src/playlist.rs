//! Builds a composed source tree from a list of synthetic source specs.
//!
//! Every entry becomes a progressive source over an encoded
//! [`SyntheticStream`], optionally clipped. The entries are concatenated and
//! the playlist as a whole can be looped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use td_buffer::Allocator;
use td_core::config::Config;
use td_source::{
    BytesDataSource, ClippingSource, ConcatenatingSource, LoopingSource, MediaSource,
    ProgressiveSource,
};

use crate::synthetic::{self, SyntheticStream};

/// One playlist entry: `FRAMES` or `FRAMES@START_MS-END_MS`. The end may be
/// left out to clip only the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub frames: u32,
    pub clip: Option<(i64, Option<i64>)>,
}

impl SourceSpec {
    pub fn new(frames: u32) -> Self {
        Self { frames, clip: None }
    }

    /// Clip to `[start_us, end_us)`.
    pub fn clipped(mut self, start_us: i64, end_us: Option<i64>) -> Self {
        self.clip = Some((start_us, end_us));
        self
    }
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (frames, clip) = match s.split_once('@') {
            Some((frames, clip)) => (frames, Some(clip)),
            None => (s, None),
        };
        let frames: u32 = frames
            .trim()
            .parse()
            .map_err(|e| format!("invalid frame count '{frames}': {e}"))?;
        if frames == 0 {
            return Err("a source needs at least one frame".into());
        }
        let Some(clip) = clip else {
            return Ok(Self::new(frames));
        };
        let (start, end) = clip.split_once('-').unwrap_or((clip, ""));
        let start_ms: i64 = start
            .trim()
            .parse()
            .map_err(|e| format!("invalid clip start '{start}': {e}"))?;
        let end_ms = match end.trim() {
            "" => None,
            end => Some(
                end.parse::<i64>()
                    .map_err(|e| format!("invalid clip end '{end}': {e}"))?,
            ),
        };
        Ok(Self::new(frames).clipped(start_ms * 1000, end_ms.map(|ms| ms * 1000)))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.frames)?;
        if let Some((start_us, end_us)) = self.clip {
            write!(f, "@{}-", start_us / 1000)?;
            if let Some(end_us) = end_us {
                write!(f, "{}", end_us / 1000)?;
            }
        }
        Ok(())
    }
}

/// How many times the playlist plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repeat {
    #[default]
    Once,
    Times(usize),
    Forever,
}

#[derive(Debug, Clone)]
pub struct PlaylistSpec {
    pub sources: Vec<SourceSpec>,
    pub repeat: Repeat,
    /// Seed of the first stream; later streams use consecutive seeds.
    pub seed: u64,
}

impl PlaylistSpec {
    pub fn new(sources: Vec<SourceSpec>) -> Self {
        Self {
            sources,
            repeat: Repeat::Once,
            seed: 1,
        }
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// Streams backing each entry, in order.
    pub fn streams(&self) -> Vec<SyntheticStream> {
        self.sources
            .iter()
            .enumerate()
            .map(|(index, spec)| SyntheticStream {
                frames: spec.frames,
                seed: self.seed + index as u64,
                ..SyntheticStream::default()
            })
            .collect()
    }

    /// Build the source tree. All progressive sources share one allocator.
    pub fn build(&self, config: &Config) -> Result<Box<dyn MediaSource>> {
        if self.sources.is_empty() {
            bail!("playlist has no sources");
        }
        let allocator = Arc::new(Allocator::from_config(&config.buffer));
        let extractor_factory = synthetic::factory(&config.seek);

        let mut playlist = ConcatenatingSource::new();
        for (index, (spec, stream)) in self.sources.iter().zip(self.streams()).enumerate() {
            let data_source = Arc::new(BytesDataSource::new(
                format!("synthetic-{index}"),
                stream.encode(),
            ));
            let progressive = ProgressiveSource::with_allocator(
                data_source,
                Arc::clone(&extractor_factory),
                config,
                Arc::clone(&allocator),
            );
            let source: Box<dyn MediaSource> = match spec.clip {
                Some((start_us, end_us)) => {
                    if end_us.is_some_and(|end_us| end_us < start_us) {
                        bail!("source {index} ({spec}): clip end precedes clip start");
                    }
                    Box::new(ClippingSource::new(Box::new(progressive), start_us, end_us))
                }
                None => Box::new(progressive),
            };
            playlist
                .add_source(source)
                .with_context(|| format!("failed to add source {index} ({spec})"))?;
        }

        Ok(match self.repeat {
            Repeat::Once => Box::new(playlist),
            Repeat::Times(0) => bail!("repeat count must be positive"),
            Repeat::Times(count) => Box::new(LoopingSource::new(Box::new(playlist), count)),
            Repeat::Forever => Box::new(LoopingSource::infinite(Box::new(playlist))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_clipped_specs() {
        assert_eq!("120".parse::<SourceSpec>().unwrap(), SourceSpec::new(120));
        assert_eq!(
            "300@1000-4000".parse::<SourceSpec>().unwrap(),
            SourceSpec::new(300).clipped(1_000_000, Some(4_000_000))
        );
        assert_eq!(
            "300@250".parse::<SourceSpec>().unwrap(),
            SourceSpec::new(300).clipped(250_000, None)
        );
    }

    #[test]
    fn rejects_bad_specs() {
        assert!("".parse::<SourceSpec>().is_err());
        assert!("0".parse::<SourceSpec>().is_err());
        assert!("10@x-4".parse::<SourceSpec>().is_err());
        assert!("10@1-y".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for text in ["42", "300@1000-4000", "7@5-"] {
            assert_eq!(text.parse::<SourceSpec>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn streams_get_distinct_seeds() {
        let spec = PlaylistSpec::new(vec![SourceSpec::new(10), SourceSpec::new(20)]);
        let streams = spec.streams();
        assert_eq!(streams[0].seed, 1);
        assert_eq!(streams[1].seed, 2);
        assert_eq!(streams[1].frames, 20);
    }

    #[test]
    fn empty_playlist_is_rejected() {
        let spec = PlaylistSpec::new(Vec::new());
        assert!(spec.build(&Config::default()).is_err());
    }

    #[test]
    fn inverted_clip_is_rejected() {
        let spec = PlaylistSpec::new(vec![SourceSpec::new(10).clipped(5_000, Some(1_000))]);
        let err = spec.build(&Config::default()).err().unwrap();
        assert!(err.to_string().contains("precedes"));
    }
}
