//! Clip identity and raw audio clips
//!
//! A clip is a fixed-length buffer of 16 kHz mono little-endian i16 PCM. Its
//! identity is the SHA-256 of those bytes, so identical uploads share an id.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Sample rate of every stored clip (Hz)
pub const SAMPLE_RATE: u32 = 16_000;

/// Clip duration in seconds
pub const CLIP_SECONDS: usize = 10;

pub const BYTES_PER_SAMPLE: usize = 2;

pub const SAMPLES_PER_CLIP: usize = SAMPLE_RATE as usize * CLIP_SECONDS;

/// Exact byte length of a clip
pub const AUDIO_CLIP_LEN: usize = SAMPLES_PER_CLIP * BYTES_PER_SAMPLE;

/// Default number of labeling strides per clip (100 ms each)
pub const STRIDES_PER_CLIP: usize = 100;

/// Content hash of a clip's raw bytes
///
/// The all-zero value is reserved for "no clip" and never names a stored clip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClipId([u8; 32]);

impl ClipId {
    /// Reserved "no clip" value
    pub const EMPTY: ClipId = ClipId([0u8; 32]);

    /// Hash raw clip bytes
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// 64 lowercase hex characters; safe for file names and URLs
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 hex characters, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Parse the hex form without rejecting the empty id
    ///
    /// Label sets use this so an all-zero id reaches validation and is
    /// reported as [`Error::EmptyClipId`].
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(Error::Malformed(format!(
                "clip id must be 64 hex characters, got {}",
                s.len()
            )));
        }
        let mut id = [0u8; 32];
        for (i, byte) in id.iter_mut().enumerate() {
            let pair = s
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| Error::Malformed("clip id is not ASCII hex".to_string()))?;
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::Malformed(format!("invalid hex in clip id: '{}'", pair)))?;
        }
        Ok(Self(id))
    }
}

impl FromStr for ClipId {
    type Err = Error;

    /// Parse a clip id from a request path; the empty id is rejected
    fn from_str(s: &str) -> Result<Self> {
        let id = Self::from_hex(s)?;
        if id.is_empty() {
            return Err(Error::EmptyClipId);
        }
        Ok(id)
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClipId({})", self.short())
    }
}

impl Serialize for ClipId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ClipId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClipId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Raw clip bytes of exactly [`AUDIO_CLIP_LEN`]
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip(Box<[u8; AUDIO_CLIP_LEN]>);

impl AudioClip {
    /// Take ownership of uploaded bytes
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self> {
        let actual = bytes.len();
        let boxed: Box<[u8; AUDIO_CLIP_LEN]> = bytes
            .into_boxed_slice()
            .try_into()
            .map_err(|_| Error::InvalidLength {
                expected: AUDIO_CLIP_LEN,
                actual,
            })?;
        Ok(Self(boxed))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_vec(bytes.to_vec())
    }

    pub fn id(&self) -> ClipId {
        ClipId::of(&self.0[..])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Decoded PCM samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.0
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("id", &self.id())
            .field("len", &AUDIO_CLIP_LEN)
            .finish()
    }
}
