use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tapedeck::playlist::SourceSpec;

#[derive(Parser)]
#[command(name = "tapedeck")]
#[command(author, version, about = "Media sample buffering and timeline composition engine")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a playlist of synthetic streams and report what was read
    Play {
        /// Playlist entry as FRAMES or FRAMES@START_MS-END_MS (repeatable)
        #[arg(short, long = "source", value_name = "SPEC")]
        sources: Vec<SourceSpec>,

        /// Play the whole playlist this many times
        #[arg(long, default_value = "1", conflicts_with = "forever")]
        loops: usize,

        /// Loop the playlist until --max-periods is reached
        #[arg(long)]
        forever: bool,

        /// How playback continues past the last window
        #[arg(long, value_enum, default_value = "off")]
        repeat: Repeat,

        /// Start position in the first window, in milliseconds
        #[arg(long, default_value = "0")]
        start_ms: i64,

        /// Stop after this many periods
        #[arg(long, default_value = "1000")]
        max_periods: usize,

        /// Seed of the first synthetic stream
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a time to a byte position by binary search over a synthetic stream
    Seek {
        /// Target time in milliseconds
        #[arg(required = true)]
        target_ms: i64,

        /// Frames in the stream
        #[arg(long, default_value = "500")]
        frames: u32,

        /// Seed of the stream
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file and print the effective settings
    CheckConfig {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Repeat mode accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Repeat {
    Off,
    One,
    All,
}

impl From<Repeat> for td_timeline::RepeatMode {
    fn from(repeat: Repeat) -> Self {
        match repeat {
            Repeat::Off => Self::Off,
            Repeat::One => Self::One,
            Repeat::All => Self::All,
        }
    }
}
