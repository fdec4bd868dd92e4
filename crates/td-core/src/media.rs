//! Media-domain types shared by the buffer, seek, and source crates: sample
//! flags, track types, formats, and per-sample encryption descriptors.
//!
//! Enums serialize in lowercase and implement `Display` manually.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Per-sample flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlags: u32 {
        /// Decodable without reference to earlier samples.
        const KEY_FRAME = 1;
        /// Must be decoded but not rendered.
        const DECODE_ONLY = 1 << 1;
        /// Payload is preceded by an encryption header.
        const ENCRYPTED = 1 << 2;
        /// Marks the end of the stream; carries no payload.
        const END_OF_STREAM = 1 << 3;
        /// Last sample of the stream that does carry a payload.
        const LAST_SAMPLE = 1 << 4;
    }
}

impl SampleFlags {
    pub fn is_key_frame(self) -> bool {
        self.contains(Self::KEY_FRAME)
    }

    pub fn is_encrypted(self) -> bool {
        self.contains(Self::ENCRYPTED)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

// ---------------------------------------------------------------------------
// TrackType
// ---------------------------------------------------------------------------

/// Kind of elementary stream a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
    Text,
    Metadata,
    #[default]
    Unknown,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Text => write!(f, "text"),
            Self::Metadata => write!(f, "metadata"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Description of the samples on one track.
///
/// `subsample_offset_us` is added to sample timestamps relative to the format
/// by the decoder; the sample queue keeps it in step with the queue's own
/// timestamp offset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Format {
    pub id: Option<String>,
    pub sample_mime_type: String,
    pub track_type: TrackType,
    pub codecs: Option<String>,
    pub max_input_size: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u32>,
    pub language: Option<String>,
    #[serde(default)]
    pub subsample_offset_us: i64,
}

impl Format {
    /// A minimal format with only the MIME type and track type set.
    pub fn new(sample_mime_type: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            sample_mime_type: sample_mime_type.into(),
            track_type,
            ..Self::default()
        }
    }

    /// Copy of this format with a different subsample offset.
    #[must_use]
    pub fn with_subsample_offset_us(&self, subsample_offset_us: i64) -> Self {
        Self {
            subsample_offset_us,
            ..self.clone()
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.sample_mime_type, self.track_type)?;
        if let Some(id) = &self.id {
            write!(f, " id={id}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Block cipher mode of an encrypted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoMode {
    #[default]
    Unencrypted,
    #[serde(rename = "aes-ctr")]
    AesCtr,
    #[serde(rename = "aes-cbc")]
    AesCbc,
}

impl fmt::Display for CryptoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unencrypted => write!(f, "unencrypted"),
            Self::AesCtr => write!(f, "aes-ctr"),
            Self::AesCbc => write!(f, "aes-cbc"),
        }
    }
}

/// Key and pattern information committed alongside an encrypted sample.
/// The per-sample IV and subsample layout travel in-band with the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CryptoData {
    pub mode: CryptoMode,
    pub key_id: Vec<u8>,
    pub encrypted_blocks: u32,
    pub clear_blocks: u32,
}

impl CryptoData {
    pub fn new(mode: CryptoMode, key_id: Vec<u8>) -> Self {
        Self {
            mode,
            key_id,
            encrypted_blocks: 0,
            clear_blocks: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Opaque manifest published with a timeline refresh.
pub type Manifest = Arc<serde_json::Value>;
