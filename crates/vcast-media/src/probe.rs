//! Media probing via the FFprobe CLI.
//!
//! Two passes: a general one for container/stream/duration metadata and,
//! when keyframe-aligned segmentation needs them, a targeted packet-level
//! pass for keyframe presentation timestamps.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Technical metadata of the source media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds (0.0 when the container does not
    /// report one)
    pub duration: f64,
    /// First video stream, if present
    pub video: Option<VideoStreamInfo>,
    /// First audio stream, if present
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Video stream metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    /// Source codec name
    pub codec: String,
    /// Source width in pixels
    pub width: u32,
    /// Source height in pixels
    pub height: u32,
    /// Ordered keyframe presentation timestamps in seconds; filled by the
    /// targeted second probe pass, absent until then
    pub keyframes: Option<Vec<f64>>,
}

/// Audio stream metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    /// Source codec name
    pub codec: String,
}

/// FFprobe JSON output for the general pass.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// FFprobe JSON output for the packet-level pass.
#[derive(Debug, Deserialize)]
struct FfprobePackets {
    #[serde(default)]
    packets: Vec<FfprobePacket>,
}

#[derive(Debug, Deserialize)]
struct FfprobePacket {
    pts_time: Option<String>,
    flags: Option<String>,
}

/// FFprobe invoker bound to one prober binary and the run's cancellation
/// signal.
pub struct Prober {
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Prober {
    /// Create a new prober for the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
        }
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// General pass: container, streams and duration.
    pub async fn probe_media(&self, media_url: &str) -> MediaResult<MediaInfo> {
        let stdout = self
            .run(&[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                media_url,
            ])
            .await?;

        parse_media_info(&stdout)
    }

    /// Targeted pass: keyframe presentation timestamps of the first video
    /// stream, from packet-level flags.
    pub async fn probe_keyframes(&self, media_url: &str) -> MediaResult<Vec<f64>> {
        let stdout = self
            .run(&[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-select_streams",
                "v:0",
                "-show_entries",
                "packet=pts_time,flags",
                media_url,
            ])
            .await?;

        parse_keyframes(&stdout)
    }

    async fn run(&self, args: &[&str]) -> MediaResult<Vec<u8>> {
        debug!("running {} {}", self.binary.display(), args.join(" "));

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfprobeNotFound
                } else {
                    MediaError::from(e)
                }
            })?;

        let cancelled = crate::command::wait_for_cancel(self.cancel_rx.clone());
        tokio::pin!(cancelled);

        // On cancellation the future owning the child is dropped and
        // kill_on_drop terminates the prober.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = &mut cancelled => return Err(MediaError::Cancelled),
        };

        if !output.status.success() {
            return Err(MediaError::ffprobe_failed(
                format!(
                    "FFprobe exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        Ok(output.stdout)
    }
}

/// Parse the general pass output into a MediaInfo.
///
/// Tolerates absent video stream, absent audio stream and absent duration.
fn parse_media_info(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| VideoStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            keyframes: None,
        });

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
        });

    Ok(MediaInfo {
        duration,
        video,
        audio,
    })
}

/// Parse the packet-level pass output into keyframe timestamps.
///
/// Keyframe packets carry a `K` in their flags.
fn parse_keyframes(stdout: &[u8]) -> MediaResult<Vec<f64>> {
    let probe: FfprobePackets = serde_json::from_slice(stdout)?;

    let keyframes = probe
        .packets
        .iter()
        .filter(|p| p.flags.as_deref().is_some_and(|f| f.contains('K')))
        .filter_map(|p| p.pts_time.as_ref().and_then(|t| t.parse::<f64>().ok()))
        .collect();

    Ok(keyframes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_media_info() {
        let json = br#"{
            "format": {"duration": "12.500000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;

        let info = parse_media_info(json).unwrap();
        assert!((info.duration - 12.5).abs() < 1e-9);
        assert!(info.has_video());
        assert!(info.has_audio());

        let video = info.video.unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!(video.width, 1920);
        assert_eq!(video.height, 1080);
        assert!(video.keyframes.is_none());
    }

    #[test]
    fn test_parse_audio_only() {
        let json = br#"{
            "format": {"duration": "30.0"},
            "streams": [{"codec_type": "audio", "codec_name": "mp3"}]
        }"#;

        let info = parse_media_info(json).unwrap();
        assert!(!info.has_video());
        assert!(info.has_audio());
    }

    #[test]
    fn test_parse_missing_duration_and_streams() {
        let info = parse_media_info(br#"{"format": {}, "streams": []}"#).unwrap();
        assert_eq!(info.duration, 0.0);
        assert!(!info.has_video());
        assert!(!info.has_audio());

        let info = parse_media_info(br#"{}"#).unwrap();
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_parse_malformed_output_fails() {
        assert!(parse_media_info(b"not json").is_err());
    }

    #[test]
    fn test_parse_keyframes_filters_flags() {
        let json = br#"{
            "packets": [
                {"pts_time": "0.000000", "flags": "K__"},
                {"pts_time": "0.040000", "flags": "___"},
                {"pts_time": "10.000000", "flags": "K__"},
                {"pts_time": "10.040000", "flags": "__"},
                {"flags": "K__"}
            ]
        }"#;

        let keyframes = parse_keyframes(json).unwrap();
        assert_eq!(keyframes, vec![0.0, 10.0]);
    }

    #[test]
    fn test_parse_keyframes_empty() {
        assert!(parse_keyframes(br#"{"packets": []}"#).unwrap().is_empty());
        assert!(parse_keyframes(br#"{}"#).unwrap().is_empty());
    }
}
