//! Engine configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON (or TOML by the CLI) and
//! carries the buffer, seek, and loading sections. Every section defaults
//! sensibly so a completely empty `{}` document is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub seek: SeekConfig,
    pub loading: LoadingConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.buffer.allocation_length == 0 {
            warnings.push(
                "buffer.allocation_length is 0; the allocator cannot make progress".into(),
            );
        }
        if self.buffer.initial_metadata_capacity == 0 {
            warnings.push("buffer.initial_metadata_capacity is 0; 1 will be used".into());
        }
        if self.buffer.target_buffer_bytes < self.buffer.allocation_length {
            warnings.push(format!(
                "buffer.target_buffer_bytes ({}) is smaller than one allocation ({})",
                self.buffer.target_buffer_bytes, self.buffer.allocation_length
            ));
        }

        if self.seek.minimum_search_range == 0 {
            warnings.push(
                "seek.minimum_search_range is 0; binary search may not terminate early".into(),
            );
        }
        if self.seek.scan_window < self.seek.minimum_search_range {
            warnings.push(format!(
                "seek.scan_window ({}) is smaller than seek.minimum_search_range ({}); \
                 the final probe may miss the target",
                self.seek.scan_window, self.seek.minimum_search_range
            ));
        }
        if self.seek.trailing_scan_window < self.seek.minimum_search_range {
            warnings.push(format!(
                "seek.trailing_scan_window ({}) is smaller than seek.minimum_search_range ({})",
                self.seek.trailing_scan_window, self.seek.minimum_search_range
            ));
        }

        if self.loading.read_steps_per_continue == 0 {
            warnings.push(
                "loading.read_steps_per_continue is 0; loading will never progress".into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Sample buffer sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Length in bytes of every allocation block in the ring.
    #[serde(default = "default_allocation_length")]
    pub allocation_length: usize,
    /// Starting capacity of each sample metadata index.
    #[serde(default = "default_metadata_capacity")]
    pub initial_metadata_capacity: usize,
    /// Bytes the shared allocator keeps pooled after a trim.
    #[serde(default = "default_target_buffer_bytes")]
    pub target_buffer_bytes: usize,
}

fn default_allocation_length() -> usize {
    64 * 1024
}
fn default_metadata_capacity() -> usize {
    1000
}
fn default_target_buffer_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            allocation_length: default_allocation_length(),
            initial_metadata_capacity: default_metadata_capacity(),
            target_buffer_bytes: default_target_buffer_bytes(),
        }
    }
}

/// Binary-search seeking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    /// Window size in bytes below which bisection stops.
    #[serde(default = "default_minimum_search_range")]
    pub minimum_search_range: u64,
    /// Largest forward distance skipped in place instead of reopening input.
    #[serde(default = "default_max_skip_bytes")]
    pub max_skip_bytes: u64,
    /// Bytes peeked per probe when looking for frame starts.
    #[serde(default = "default_scan_window")]
    pub scan_window: u64,
    /// Bytes scanned linearly at end of stream to confirm the last frame.
    #[serde(default = "default_trailing_scan_window")]
    pub trailing_scan_window: u64,
}

fn default_minimum_search_range() -> u64 {
    4096
}
fn default_max_skip_bytes() -> u64 {
    256 * 1024
}
fn default_scan_window() -> u64 {
    8192
}
fn default_trailing_scan_window() -> u64 {
    16 * 1024
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            minimum_search_range: default_minimum_search_range(),
            max_skip_bytes: default_max_skip_bytes(),
            scan_window: default_scan_window(),
            trailing_scan_window: default_trailing_scan_window(),
        }
    }
}

/// Loading cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    /// Extractor read steps performed per `continue_loading` call.
    #[serde(default = "default_read_steps")]
    pub read_steps_per_continue: usize,
    /// Loading pauses once every enabled track is buffered this far ahead.
    #[serde(default = "default_max_buffer_us")]
    pub max_buffer_us: i64,
}

fn default_read_steps() -> usize {
    64
}
fn default_max_buffer_us() -> i64 {
    30_000_000
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            read_steps_per_continue: default_read_steps(),
            max_buffer_us: default_max_buffer_us(),
        }
    }
}
