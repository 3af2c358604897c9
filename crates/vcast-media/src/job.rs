//! Encode job construction.
//!
//! Pure composition of the parameter resolver, run configuration and
//! global audio profile into one complete encoder invocation per profile.
//! Failures surface only when the job is executed.

use std::path::{Path, PathBuf};

use vcast_models::{AudioProfile, VideoCodec, VideoProfile};

use crate::command::FfmpegCommand;
use crate::config::TranscodeConfig;
use crate::params::{scale_expression, BitrateLadder};

/// Keyframe interval forced on every encode, in seconds.
pub const FORCED_KEYFRAME_INTERVAL_SECS: u32 = 10;

/// Fixed output frame rate.
pub const OUTPUT_FRAME_RATE: u32 = 25;

/// One complete encoder invocation for one profile.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Profile this job encodes
    pub profile_name: String,
    /// Full ordered encoder argument list
    pub args: Vec<String>,
    /// The profile's own output subdirectory
    pub output_dir: PathBuf,
}

/// Build the encode job for one profile.
///
/// `work_dir` is the run workspace; the job writes exclusively into
/// `<work_dir>/<profile-name>/`.
pub fn build_encode_job(
    name: &str,
    profile: &VideoProfile,
    config: &TranscodeConfig,
    audio: &AudioProfile,
    work_dir: &Path,
    threads: usize,
) -> EncodeJob {
    let codec = VideoCodec::for_profile(name);
    let ladder = BitrateLadder::for_target(profile.bitrate_kbps);

    let output_dir = work_dir.join(name);
    let variant_playlist = output_dir.join(format!("{}.m3u8", name));
    let segment_pattern = output_dir.join(format!(
        "{}-%05d.{}",
        config.segment_prefix,
        codec.segment_extension()
    ));

    let mut cmd = FfmpegCommand::new(&config.media_url, &variant_playlist)
        .force_key_frames(format!(
            "expr:gte(t,n_forced*{})",
            FORCED_KEYFRAME_INTERVAL_SECS
        ))
        .video_filter(scale_expression(profile))
        .preset("fast")
        .frame_rate(OUTPUT_FRAME_RATE)
        .video_bitrate(ladder.target_arg())
        .threads(threads)
        .crf(profile.quality_crf)
        .min_rate(ladder.min_arg())
        .max_rate(ladder.max_arg())
        .buffer_size(ladder.buffer_arg());

    cmd = match codec {
        VideoCodec::H264 => cmd
            .video_codec(codec.encoder())
            .hls_segment_type(codec.hls_segment_type())
            .video_tag(codec.encoder_tag())
            .tune("zerolatency"),
        VideoCodec::Vp9 => cmd
            .video_codec(codec.encoder())
            .hls_segment_type(codec.hls_segment_type())
            .video_tag(codec.encoder_tag())
            .output_args(["-tile-columns", "2"]),
    };

    let cmd = cmd
        .audio_codec("aac")
        .audio_bitrate(format!("{}k", audio.bitrate_kbps))
        .format("hls")
        .output_args(["-movflags", "+faststart"])
        .hls_time(config.segment_length)
        .hls_list_size(0)
        .hls_flags("split_by_time")
        .hls_playlist_type("vod")
        .hls_segment_filename(&segment_pattern);

    EncodeJob {
        profile_name: name.to_string(),
        args: cmd.build_args(),
        output_dir,
    }
}
