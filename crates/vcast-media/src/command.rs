//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for one FFmpeg invocation.
///
/// Arguments are accumulated in order and rendered by [`build_args`]:
/// overwrite flag, log level, input arguments, `-i <input>`, output
/// arguments, output path.
///
/// [`build_args`]: FfmpegCommand::build_args
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input source (media URL or local path)
    input: String,
    /// Output path (for HLS jobs: the variant playlist)
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    /// Whether to overwrite existing outputs
    overwrite: bool,
    /// -loglevel value
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "warning".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the -loglevel value.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Force keyframes on the given expression.
    pub fn force_key_frames(self, expr: impl Into<String>) -> Self {
        self.output_arg("-force_key_frames").output_arg(expr)
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set the encoding preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set the output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Set the target video bitrate (e.g. "5000k").
    pub fn video_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:v").output_arg(bitrate)
    }

    /// Set the encoder thread count.
    pub fn threads(self, threads: usize) -> Self {
        self.output_arg("-threads").output_arg(threads.to_string())
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set the minimum bitrate.
    pub fn min_rate(self, rate: impl Into<String>) -> Self {
        self.output_arg("-minrate").output_arg(rate)
    }

    /// Set the maximum bitrate.
    pub fn max_rate(self, rate: impl Into<String>) -> Self {
        self.output_arg("-maxrate").output_arg(rate)
    }

    /// Set the rate-control buffer size.
    pub fn buffer_size(self, size: impl Into<String>) -> Self {
        self.output_arg("-bufsize").output_arg(size)
    }

    /// Set the video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set the video codec tag.
    pub fn video_tag(self, tag: impl Into<String>) -> Self {
        self.output_arg("-tag:v").output_arg(tag)
    }

    /// Set the encoder tune.
    pub fn tune(self, tune: impl Into<String>) -> Self {
        self.output_arg("-tune").output_arg(tune)
    }

    /// Set the audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set the audio bitrate (e.g. "128k").
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Set the HLS segment target duration in seconds.
    pub fn hls_time(self, seconds: f64) -> Self {
        self.output_arg("-hls_time")
            .output_arg(format!("{:.2}", seconds))
    }

    /// Set the HLS playlist entry cap (0 = keep all segments).
    pub fn hls_list_size(self, size: usize) -> Self {
        self.output_arg("-hls_list_size")
            .output_arg(size.to_string())
    }

    /// Set HLS muxer flags.
    pub fn hls_flags(self, flags: impl Into<String>) -> Self {
        self.output_arg("-hls_flags").output_arg(flags)
    }

    /// Set the HLS playlist type.
    pub fn hls_playlist_type(self, kind: impl Into<String>) -> Self {
        self.output_arg("-hls_playlist_type").output_arg(kind)
    }

    /// Set the HLS segment container type.
    pub fn hls_segment_type(self, kind: impl Into<String>) -> Self {
        self.output_arg("-hls_segment_type").output_arg(kind)
    }

    /// Set the HLS segment filename pattern.
    pub fn hls_segment_filename(self, pattern: impl AsRef<Path>) -> Self {
        self.output_arg("-hls_segment_filename")
            .output_arg(pattern.as_ref().to_string_lossy().to_string())
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-loglevel".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg jobs with cancellation and an optional timeout.
///
/// The child's stdout and stderr are forwarded line-by-line to the
/// process-wide log and never parsed for control decisions.
pub struct FfmpegRunner {
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner for the given encoder binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
            timeout: None,
        }
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set a wall-clock timeout for the whole invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the encoder with the given argument list.
    ///
    /// `label` tags the forwarded diagnostic output (typically the profile
    /// name).
    pub async fn run(&self, args: &[String], label: &str) -> MediaResult<()> {
        debug!(
            label,
            "running {} {}",
            self.binary.display(),
            args.join(" ")
        );

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::from(e)
                }
            })?;

        let forward = spawn_log_forwarders(&mut child, label);

        let waited = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(
                    limit,
                    wait_or_cancel(&mut child, self.cancel_rx.clone()),
                )
                .await
                {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(
                            label,
                            "FFmpeg timed out after {}s, killing process",
                            limit.as_secs()
                        );
                        child.kill().await.ok();
                        Err(MediaError::Timeout(limit.as_secs()))
                    }
                }
            }
            None => wait_or_cancel(&mut child, self.cancel_rx.clone()).await,
        };

        for handle in forward {
            handle.await.ok();
        }

        let status = waited?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Wait for the child, killing and reaping it if cancellation fires first.
async fn wait_or_cancel(
    child: &mut Child,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> MediaResult<std::process::ExitStatus> {
    let cancelled = wait_for_cancel(cancel_rx);
    tokio::pin!(cancelled);

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = &mut cancelled => {
            info!("cancellation observed, killing FFmpeg process");
            // kill() delivers the signal and reaps the child
            child.kill().await.ok();
            Err(MediaError::Cancelled)
        }
    }
}

/// Resolve once the cancellation signal flips to true; never resolves when
/// no signal was configured.
pub(crate) async fn wait_for_cancel(cancel_rx: Option<watch::Receiver<bool>>) {
    match cancel_rx {
        Some(mut rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling; nothing can fire anymore.
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

/// Forward the child's stdout and stderr to the process-wide log.
fn spawn_log_forwarders(child: &mut Child, label: &str) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let label = label.to_string();
        handles.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(profile = %label, "ffmpeg: {}", line);
            }
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        handles.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(profile = %label, "ffmpeg: {}", line);
            }
        }));
    }

    handles
}

/// Check that an FFmpeg binary is invocable.
pub fn check_ffmpeg(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    which::which(binary.as_ref()).map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that an FFprobe binary is invocable.
pub fn check_ffprobe(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    which::which(binary.as_ref()).map_err(|_| MediaError::FfprobeNotFound)
}
