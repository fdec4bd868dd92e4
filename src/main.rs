mod cli;

use tapedeck::{
    config,
    playback::{PlaybackOptions, PlaybackReport, PlaybackSession},
    playlist::{PlaylistSpec, Repeat as PlaylistRepeat, SourceSpec},
    synthetic::{self, SyntheticStream},
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, Repeat};
use std::path::Path;

/// Playlist used by `play` when no `--source` is given.
const DEFAULT_SOURCES: [u32; 3] = [500, 500, 500];

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: trace for source composition, debug for buffers and seeking
            "tapedeck=trace,td_source=trace,td_timeline=debug,td_seek=debug,td_buffer=debug".to_string()
        } else {
            "tapedeck=info,td_source=info,td_seek=warn,td_buffer=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            sources,
            loops,
            forever,
            repeat,
            start_ms,
            max_periods,
            seed,
            json,
        } => {
            let repeat_playlist = if forever {
                PlaylistRepeat::Forever
            } else if loops > 1 {
                PlaylistRepeat::Times(loops)
            } else {
                PlaylistRepeat::Once
            };
            let options = PlaybackOptions {
                repeat_mode: repeat.into(),
                start_position_us: start_ms * 1000,
                max_periods,
                ..PlaybackOptions::default()
            };
            let mut playlist = PlaylistSpec::new(sources).repeat(repeat_playlist);
            playlist.seed = seed;
            play(playlist, options, cli.config.as_deref(), json)
        }
        Commands::Seek {
            target_ms,
            frames,
            seed,
            json,
        } => seek(target_ms, frames, seed, cli.config.as_deref(), json),
        Commands::CheckConfig {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            check_config(path.as_deref())
        }
        Commands::Version => {
            println!("tapedeck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn play(
    mut playlist: PlaylistSpec,
    options: PlaybackOptions,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if playlist.sources.is_empty() {
        playlist.sources = DEFAULT_SOURCES.into_iter().map(SourceSpec::new).collect();
    }

    let source = playlist.build(&config)?;
    let report = PlaybackSession::new(source, options).run()?;

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &PlaybackReport) {
    println!("Session: {}", report.session_id);
    println!("Periods played: {}", report.periods.len());
    for period in &report.periods {
        print!("  [{}] {} (window {})", period.index, period.uid, period.window_index);
        if let Some(duration) = period.duration_us {
            print!(" {:.3}s", duration as f64 / 1_000_000.0);
        }
        if period.start_position_us != 0 {
            print!(" from {}ms", period.start_position_us / 1000);
        }
        println!();
        for (i, track) in period.tracks.iter().enumerate() {
            print!(
                "      track {}: {} samples, {} bytes",
                i, track.samples, track.bytes
            );
            if track.decode_only > 0 {
                print!(", {} decode-only", track.decode_only);
            }
            if let (Some(first), Some(last)) = (track.first_time_us, track.last_time_us) {
                print!(", {}us..{}us", first, last);
            }
            println!();
        }
    }
    println!();
    println!("Samples: {}", report.total_samples());
    println!("Bytes: {}", report.total_bytes());
    println!("Timeline refreshes: {}", report.timeline_refreshes);
    if report.truncated {
        println!("Stopped at the period limit");
    }
    if !report.recovered_errors.is_empty() {
        println!("Recovered errors:");
        for error in &report.recovered_errors {
            println!("  {}", error);
        }
    }
}

fn seek(
    target_ms: i64,
    frames: u32,
    seed: u64,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if frames == 0 {
        anyhow::bail!("Stream needs at least one frame");
    }
    let stream = SyntheticStream {
        frames,
        seed,
        ..SyntheticStream::default()
    };
    let data = stream.encode();
    let resolution = synthetic::resolve_seek(&data, target_ms * 1000, &config.seek)?;

    if json {
        let json_str = serde_json::to_string_pretty(&resolution)?;
        println!("{}", json_str);
    } else {
        println!("Stream: {} frames, {} bytes", frames, data.len());
        println!("Target: {}us", resolution.target_us);
        println!(
            "Resolved: byte {} ({})",
            resolution.byte_position,
            if resolution.found { "found" } else { "floor" }
        );
        if let Some(time) = resolution.frame_time_us {
            println!("Frame time: {}us", time);
        }
        println!("Probes: {}", resolution.probes);
        println!("Repositions: {}", resolution.repositions);
    }

    Ok(())
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    println!();
    print!("{}", config::to_toml(&config)?);

    Ok(())
}
