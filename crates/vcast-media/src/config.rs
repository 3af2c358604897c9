//! Transcode run configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one transcode run.
///
/// Built once at orchestrator construction and read-only thereafter.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Source media URL; fetched by the encoder/prober themselves
    pub media_url: String,
    /// Root under which `output/<run-id>/` is created; defaults to the
    /// current working directory at construction
    pub output_root: Option<PathBuf>,
    /// Encoder binary
    pub ffmpeg_binary: PathBuf,
    /// Prober binary
    pub ffprobe_binary: PathBuf,
    /// HLS segment target duration in seconds (> 0)
    pub segment_length: f64,
    /// Segment filename prefix, e.g. `chunk` in `chunk-00001.ts`
    pub segment_prefix: String,
    /// Whether to probe for keyframe timestamps to align segments
    pub keyframe_aligned: bool,
    /// Maximum encoder processes running at once; 1 = sequential
    pub max_concurrent_encodes: usize,
    /// Optional wall-clock limit per profile encode
    pub encode_timeout: Option<Duration>,

    // Reserved for a future rolling-window mode; not consulted by VOD
    // transcoding.
    /// Segment numbering offset
    pub segment_offset: f64,
    /// Minimum segments available after the playing head
    pub segment_buffer_min: usize,
    /// Maximum segments to be transcoded at once
    pub segment_buffer_max: usize,
}

impl TranscodeConfig {
    /// Create a configuration for the given source URL with default
    /// settings.
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            media_url: media_url.into(),
            output_root: None,
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            ffprobe_binary: PathBuf::from("ffprobe"),
            segment_length: 1.0,
            segment_prefix: "chunk".to_string(),
            keyframe_aligned: true,
            max_concurrent_encodes: 1,
            encode_timeout: None,
            segment_offset: 1.0,
            segment_buffer_min: 1,
            segment_buffer_max: 2,
        }
    }

    /// Set the output root directory.
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    /// Set the encoder and prober binaries.
    pub fn with_binaries(
        mut self,
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
    ) -> Self {
        self.ffmpeg_binary = ffmpeg.into();
        self.ffprobe_binary = ffprobe.into();
        self
    }

    /// Set the HLS segment target duration.
    pub fn with_segment_length(mut self, seconds: f64) -> Self {
        self.segment_length = seconds;
        self
    }

    /// Enable or disable keyframe-aligned segmentation.
    pub fn with_keyframe_aligned(mut self, enabled: bool) -> Self {
        self.keyframe_aligned = enabled;
        self
    }

    /// Set the encoder concurrency cap.
    pub fn with_max_concurrent_encodes(mut self, cap: usize) -> Self {
        self.max_concurrent_encodes = cap;
        self
    }

    /// Set the per-profile encode timeout.
    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TranscodeConfig::new("https://example.com/in.mp4");
        assert_eq!(config.ffmpeg_binary, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_binary, PathBuf::from("ffprobe"));
        assert_eq!(config.segment_length, 1.0);
        assert_eq!(config.segment_prefix, "chunk");
        assert!(config.keyframe_aligned);
        assert_eq!(config.max_concurrent_encodes, 1);
        assert!(config.encode_timeout.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = TranscodeConfig::new("url")
            .with_output_root("/srv/media")
            .with_binaries("/usr/bin/ffmpeg", "/usr/bin/ffprobe")
            .with_segment_length(6.0)
            .with_keyframe_aligned(false)
            .with_max_concurrent_encodes(3)
            .with_encode_timeout(Duration::from_secs(600));

        assert_eq!(config.output_root, Some(PathBuf::from("/srv/media")));
        assert_eq!(config.segment_length, 6.0);
        assert!(!config.keyframe_aligned);
        assert_eq!(config.max_concurrent_encodes, 3);
        assert_eq!(config.encode_timeout, Some(Duration::from_secs(600)));
    }
}
