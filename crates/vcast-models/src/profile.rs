//! Video and audio output profiles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Profile name prefix that selects the VP9 codec path.
pub const VP9_PROFILE_PREFIX: &str = "vp9";

/// RFC 6381 codec tag for the H.264 path.
pub const H264_CODEC_TAG: &str = "avc1.42E01E";
/// RFC 6381 codec tag for the VP9 path.
pub const VP9_CODEC_TAG: &str = "vp09.00.10.08";
/// RFC 6381 codec tag for the AAC audio track.
pub const AAC_CODEC_TAG: &str = "mp4a.40.2";

/// Maximum legal CRF value.
pub const MAX_CRF: u8 = 51;

/// Errors raised while assembling a profile set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("at least one video profile is required")]
    EmptySet,

    #[error("duplicate profile name: {0}")]
    DuplicateName(String),

    #[error("invalid profile {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl ProfileError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// One output rendition: target geometry, bitrate and quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProfile {
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Target video bitrate in kilobits per second
    pub bitrate_kbps: u32,
    /// Constant Rate Factor (0-51, lower is better quality)
    pub quality_crf: u8,
}

impl VideoProfile {
    /// Create a new profile.
    pub fn new(width: u32, height: u32, bitrate_kbps: u32, quality_crf: u8) -> Self {
        Self {
            width,
            height,
            bitrate_kbps,
            quality_crf,
        }
    }

    /// `WxH` string as used in playlist RESOLUTION attributes.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Validate the profile's numeric bounds.
    pub fn validate(&self, name: &str) -> Result<(), ProfileError> {
        if self.width == 0 {
            return Err(ProfileError::invalid(name, "width must be positive"));
        }
        if self.height == 0 {
            return Err(ProfileError::invalid(name, "height must be positive"));
        }
        if self.bitrate_kbps == 0 {
            return Err(ProfileError::invalid(name, "bitrate must be positive"));
        }
        if self.quality_crf > MAX_CRF {
            return Err(ProfileError::invalid(
                name,
                format!("CRF must be at most {}", MAX_CRF),
            ));
        }
        Ok(())
    }
}

/// Global audio rendition applied to every variant.
///
/// A bitrate of 0 is legal but degenerate; what the encoder produces for it
/// is encoder-defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProfile {
    /// Audio bitrate in kilobits per second
    pub bitrate_kbps: u32,
}

impl AudioProfile {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self { bitrate_kbps }
    }
}

/// Video codec path selected by the profile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    Vp9,
}

impl VideoCodec {
    /// Select the codec path for a profile name (`vp9_*` selects VP9).
    pub fn for_profile(name: &str) -> Self {
        if name.starts_with(VP9_PROFILE_PREFIX) {
            Self::Vp9
        } else {
            Self::H264
        }
    }

    /// FFmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Vp9 => "libvpx-vp9",
        }
    }

    /// Value for the encoder's `-tag:v` argument.
    pub fn encoder_tag(&self) -> &'static str {
        match self {
            Self::H264 => H264_CODEC_TAG,
            Self::Vp9 => "vp09",
        }
    }

    /// RFC 6381 tag for the master playlist CODECS attribute.
    pub fn rfc6381_tag(&self) -> &'static str {
        match self {
            Self::H264 => H264_CODEC_TAG,
            Self::Vp9 => VP9_CODEC_TAG,
        }
    }

    /// HLS segment container (`-hls_segment_type` value).
    pub fn hls_segment_type(&self) -> &'static str {
        match self {
            Self::H264 => "mpegts",
            Self::Vp9 => "fmp4",
        }
    }

    /// File extension of the media segments this codec path emits.
    pub fn segment_extension(&self) -> &'static str {
        match self {
            Self::H264 => "ts",
            Self::Vp9 => "m4s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Vp9 => "vp9",
        }
    }
}

/// Ordered collection of named video profiles.
///
/// Insertion order is preserved and drives encode order; names are unique.
/// Sorting by bitrate happens only where an order is required (the master
/// playlist), with ties broken by lexical name order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSet {
    entries: Vec<(String, VideoProfile)>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(name, profile)` pairs, preserving their order.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = (S, VideoProfile)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, profile) in pairs {
            set.insert(name, profile)?;
        }
        Ok(set)
    }

    /// Append a named profile, validating it and rejecting duplicate names.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        profile: VideoProfile,
    ) -> Result<(), ProfileError> {
        let name = name.into();
        profile.validate(&name)?;
        if self.entries.iter().any(|(n, _)| *n == name) {
            return Err(ProfileError::DuplicateName(name));
        }
        self.entries.push((name, profile));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VideoProfile> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VideoProfile)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Entries sorted ascending by bitrate; equal bitrates order by name.
    pub fn sorted_by_bitrate(&self) -> Vec<(&str, &VideoProfile)> {
        let mut sorted: Vec<_> = self.iter().collect();
        sorted.sort_by(|(a_name, a), (b_name, b)| {
            a.bitrate_kbps
                .cmp(&b.bitrate_kbps)
                .then_with(|| a_name.cmp(b_name))
        });
        sorted
    }

    /// Re-check every entry's bounds and name uniqueness.
    ///
    /// `insert` already enforces both; this covers sets built through
    /// deserialization.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.entries.is_empty() {
            return Err(ProfileError::EmptySet);
        }
        for (i, (name, profile)) in self.entries.iter().enumerate() {
            profile.validate(name)?;
            if self.entries[..i].iter().any(|(n, _)| n == name) {
                return Err(ProfileError::DuplicateName(name.clone()));
            }
        }
        Ok(())
    }
}
