//! Shared data models for the Viewcast transcoding pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video and audio output profiles
//! - Codec selection and RFC 6381 codec tags
//! - Run identifiers, segmentation modes and per-profile encode outcomes

pub mod profile;
pub mod run;

// Re-export common types
pub use profile::{
    AudioProfile, ProfileError, ProfileSet, VideoCodec, VideoProfile, AAC_CODEC_TAG,
    H264_CODEC_TAG, VP9_CODEC_TAG, VP9_PROFILE_PREFIX,
};
pub use run::{EncodeOutcome, ProfileOutcome, RunId, RunReport, SegmentationMode};
