//! Cold Tier Compression
//!
//! Streams payloads through LZ4 frames (with a content checksum) on their
//! way into the cold tier. Payloads that are tiny or do not shrink are kept
//! raw, and the chosen algorithm is recorded next to the entry so reads
//! never guess.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::compression::CompressionManager;
//!
//! let manager = CompressionManager::new();
//!
//! let data = b"Hello, this is test data that should compress well!".repeat(40);
//! let (compressed, algorithm) = manager.compress(&data);
//!
//! let decompressed = manager.decompress(&compressed, algorithm).unwrap();
//! assert_eq!(decompressed.as_ref(), data.as_slice());
//! ```

use std::io::{Read, Write};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Algorithm a cold data file was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Stored raw
    None,
    /// LZ4 frame
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// Data file extension in the cold directory
    pub fn file_extension(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "raw",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Cold tier compression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Algorithm for cold writes (`none` disables compression)
    pub algorithm: CompressionAlgorithm,
    /// Payloads below this size are stored raw
    pub min_size_bytes: u64,
    /// LZ4 acceleration level (0 = library default)
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            min_size_bytes: 64,
            level: 4,
        }
    }
}

/// A streaming codec
pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Encode `data` into a self-describing frame
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decode a complete frame; truncated or tampered input is an error
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZ4 frame codec with content checksums
#[derive(Debug, Clone, Copy)]
pub struct Lz4FrameCodec {
    level: u32,
}

impl Lz4FrameCodec {
    pub fn with_level(level: u32) -> Self {
        Self { level }
    }

    fn encode_error(e: std::io::Error) -> Error {
        Error::CompressionFailed {
            algorithm: CompressionAlgorithm::Lz4.to_string(),
            reason: e.to_string(),
        }
    }

    fn decode_error(e: std::io::Error) -> Error {
        Error::DecompressionFailed {
            algorithm: CompressionAlgorithm::Lz4.to_string(),
            reason: e.to_string(),
        }
    }
}

impl Compressor for Lz4FrameCodec {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = lz4::EncoderBuilder::new()
            .level(self.level)
            .checksum(lz4::ContentChecksum::ChecksumEnabled)
            .build(Vec::with_capacity(data.len() / 2 + 32))
            .map_err(Self::encode_error)?;
        encoder.write_all(data).map_err(Self::encode_error)?;

        let (frame, finished) = encoder.finish();
        finished.map_err(Self::encode_error)?;
        Ok(frame)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = lz4::Decoder::new(data).map_err(Self::decode_error)?;
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder.read_to_end(&mut out).map_err(Self::decode_error)?;

        // The reader stops quietly at end of input; an unfinished frame
        // only shows up here
        let (_, finished) = decoder.finish();
        finished.map_err(Self::decode_error)?;
        Ok(out)
    }
}

/// Compression adapter used by the cold tier
#[derive(Debug, Clone)]
pub struct CompressionManager {
    config: CompressionConfig,
    lz4: Lz4FrameCodec,
}

impl CompressionManager {
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4FrameCodec::with_level(config.level),
            config,
        }
    }

    /// Encode a payload for the cold tier.
    ///
    /// Returns the bytes to store and the algorithm they were written with.
    /// Falls back to raw when compression is off, the payload is small, the
    /// frame would not be smaller, or the codec fails.
    pub fn compress(&self, data: &[u8]) -> (Bytes, CompressionAlgorithm) {
        let raw = || (Bytes::copy_from_slice(data), CompressionAlgorithm::None);
        if self.config.algorithm == CompressionAlgorithm::None
            || (data.len() as u64) < self.config.min_size_bytes
        {
            return raw();
        }

        match self.lz4.compress(data) {
            Ok(frame) if frame.len() < data.len() => (Bytes::from(frame), self.lz4.algorithm()),
            Ok(_) => raw(),
            Err(e) => {
                warn!(error = %e, bytes = data.len(), "Compression failed, storing raw");
                raw()
            }
        }
    }

    /// Decode bytes written with `algorithm`
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Bytes> {
        match algorithm {
            CompressionAlgorithm::None => Ok(Bytes::copy_from_slice(data)),
            CompressionAlgorithm::Lz4 => self.lz4.decompress(data).map(Bytes::from),
        }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}
