//! Transcode run orchestration.
//!
//! One `Transcoder` owns one run: its workspace directory, its unique run
//! ID and its cancellation signal. Construction validates the profile set
//! and performs no filesystem I/O; `run()` is single-shot and not
//! idempotent (a second call re-probes and re-encodes into the same run
//! directory, overwriting prior outputs).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use vcast_models::{
    AudioProfile, EncodeOutcome, ProfileOutcome, ProfileSet, RunId, RunReport, SegmentationMode,
};

use crate::command::FfmpegRunner;
use crate::config::TranscodeConfig;
use crate::error::{MediaError, MediaResult};
use crate::job::{build_encode_job, EncodeJob};
use crate::params::thread_budget;
use crate::playlist::{build_master_playlist, MASTER_PLAYLIST_NAME};
use crate::probe::{MediaInfo, Prober};

/// Orchestrator for one adaptive-bitrate transcode run.
#[derive(Debug)]
pub struct Transcoder {
    config: TranscodeConfig,
    profiles: ProfileSet,
    audio: AudioProfile,
    run_id: RunId,
    work_dir: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl Transcoder {
    /// Create the orchestrator for one run.
    ///
    /// Fails fast on an empty or inconsistent profile set and on invalid
    /// settings; nothing is written to disk here.
    pub fn new(
        config: TranscodeConfig,
        profiles: ProfileSet,
        audio: AudioProfile,
    ) -> MediaResult<Self> {
        profiles.validate()?;

        if !(config.segment_length > 0.0) {
            return Err(MediaError::config("segment length must be positive"));
        }
        if config.max_concurrent_encodes == 0 {
            return Err(MediaError::config(
                "max concurrent encodes must be at least 1",
            ));
        }

        let run_id = RunId::new();
        let output_root = match &config.output_root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        let work_dir = output_root.join("output").join(run_id.as_str());

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            profiles,
            audio,
            run_id,
            work_dir,
            shutdown,
        })
    }

    /// This run's unique identifier.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// This run's workspace directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Cancel the run: in-flight encoder and prober processes are killed
    /// and profiles not yet started are skipped.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Execute the run and report one outcome per profile.
    ///
    /// Everything after construction degrades per-profile instead of
    /// aborting: a failed workspace write, probe or encode is logged and
    /// reflected in the report while the remaining profiles proceed.
    pub async fn run(&self) -> MediaResult<RunReport> {
        let started_at = Utc::now();
        info!(
            run_id = %self.run_id,
            url = %self.config.media_url,
            profiles = self.profiles.len(),
            "starting transcode run"
        );

        if let Err(e) = fs::create_dir_all(&self.work_dir).await {
            error!(
                error = %e,
                dir = %self.work_dir.display(),
                "failed to create run workspace"
            );
        }

        // The master playlist is written before any encoding so a
        // partially failed run still exposes a navigable entry point.
        let playlist_path = self.work_dir.join(MASTER_PLAYLIST_NAME);
        if let Err(e) = fs::write(&playlist_path, build_master_playlist(&self.profiles)).await {
            error!(
                error = %e,
                path = %playlist_path.display(),
                "failed to write master playlist"
            );
        }

        // Resolved once before profile fan-out; read-only afterwards.
        let (metadata, segmentation) = self.fetch_metadata().await;
        if let Some(info) = &metadata {
            debug!(
                duration = info.duration,
                has_video = info.has_video(),
                has_audio = info.has_audio(),
                segmentation = segmentation.as_str(),
                "probed media metadata"
            );
        }

        let threads = thread_budget();
        let outcomes = self.run_profiles(threads).await;

        let finished_at = Utc::now();
        let completed = outcomes
            .iter()
            .filter(|o| o.outcome.is_completed())
            .count();
        info!(
            run_id = %self.run_id,
            completed,
            total = outcomes.len(),
            "transcode run finished"
        );

        Ok(RunReport {
            run_id: self.run_id.clone(),
            work_dir: self.work_dir.clone(),
            segmentation,
            started_at,
            finished_at,
            outcomes,
        })
    }

    /// Two-phase probe.
    ///
    /// The general pass fetches duration and stream layout. When keyframe
    /// alignment is enabled and the pass yielded no keyframe timestamps
    /// for a present video stream, a targeted packet-level pass fills
    /// them in. Either pass failing leaves the run on fixed-length
    /// segmentation; only the degradation is reported, never an abort.
    async fn fetch_metadata(&self) -> (Option<MediaInfo>, SegmentationMode) {
        let started = Instant::now();
        info!("fetching media metadata");

        let prober =
            Prober::new(&self.config.ffprobe_binary).with_cancel(self.shutdown.subscribe());

        let mut info = match prober.probe_media(&self.config.media_url).await {
            Ok(info) => info,
            Err(e) if e.is_cancelled() => {
                info!("media probe cancelled");
                return (None, SegmentationMode::FixedLength);
            }
            Err(e) => {
                error!(
                    error = %e,
                    "media probe failed; continuing with time-based segmentation"
                );
                return (None, SegmentationMode::FixedLength);
            }
        };

        let mut segmentation = SegmentationMode::FixedLength;
        if self.config.keyframe_aligned {
            if let Some(video) = info.video.as_mut() {
                let known = video.keyframes.as_deref().is_some_and(|k| !k.is_empty());
                if known {
                    segmentation = SegmentationMode::KeyframeAligned;
                } else {
                    match prober.probe_keyframes(&self.config.media_url).await {
                        Ok(keyframes) if !keyframes.is_empty() => {
                            debug!(count = keyframes.len(), "keyframe probe returned timestamps");
                            video.keyframes = Some(keyframes);
                            segmentation = SegmentationMode::KeyframeAligned;
                        }
                        Ok(_) => warn!(
                            "keyframe probe returned no timestamps; \
                             segments fall back to fixed length"
                        ),
                        Err(e) => warn!(
                            error = %e,
                            "keyframe probe failed; segments fall back to fixed length"
                        ),
                    }
                }
            }
        }

        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "fetched media metadata"
        );
        (Some(info), segmentation)
    }

    /// Encode every profile, at most `max_concurrent_encodes` at a time
    /// (1 = the sequential reference behavior).
    ///
    /// Outcomes are reported in profile insertion order regardless of
    /// completion order. Once cancellation is observed, profiles not yet
    /// started are skipped.
    async fn run_profiles(&self, threads: usize) -> Vec<ProfileOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_encodes));
        let mut join_set: JoinSet<(usize, EncodeOutcome)> = JoinSet::new();

        let names: Vec<String> = self.profiles.iter().map(|(n, _)| n.to_string()).collect();
        let mut slots: Vec<Option<EncodeOutcome>> = names.iter().map(|_| None).collect();

        for (idx, (name, profile)) in self.profiles.iter().enumerate() {
            if self.is_cancelled() {
                debug!(profile = name, "skipping profile, run cancelled");
                slots[idx] = Some(EncodeOutcome::Skipped);
                continue;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            // The permit wait may have overlapped a cancellation.
            if self.is_cancelled() {
                debug!(profile = name, "skipping profile, run cancelled");
                slots[idx] = Some(EncodeOutcome::Skipped);
                continue;
            }

            let job = build_encode_job(
                name,
                profile,
                &self.config,
                &self.audio,
                &self.work_dir,
                threads,
            );
            let ffmpeg = self.config.ffmpeg_binary.clone();
            let cancel_rx = self.shutdown.subscribe();
            let timeout = self.config.encode_timeout;

            join_set.spawn(async move {
                let _permit = permit;
                (idx, execute_job(job, ffmpeg, cancel_rx, timeout).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => error!(error = %e, "encode task aborted"),
            }
        }

        names
            .into_iter()
            .zip(slots)
            .map(|(profile, outcome)| ProfileOutcome {
                profile,
                outcome: outcome.unwrap_or(EncodeOutcome::Skipped),
            })
            .collect()
    }
}

/// Execute one encode job and classify its outcome.
async fn execute_job(
    job: EncodeJob,
    ffmpeg: PathBuf,
    cancel_rx: watch::Receiver<bool>,
    timeout: Option<Duration>,
) -> EncodeOutcome {
    let profile = job.profile_name.clone();
    info!(profile = %profile, "starting encode");
    let started = Instant::now();

    if let Err(e) = fs::create_dir_all(&job.output_dir).await {
        // The encoder's own writes into the missing directory will fail
        // and surface below.
        error!(
            profile = %profile,
            error = %e,
            "failed to create profile output directory"
        );
    }

    let mut runner = FfmpegRunner::new(ffmpeg).with_cancel(cancel_rx);
    if let Some(limit) = timeout {
        runner = runner.with_timeout(limit);
    }

    match runner.run(&job.args, &profile).await {
        Ok(()) => {
            let elapsed = started.elapsed();
            info!(
                profile = %profile,
                elapsed_secs = elapsed.as_secs_f64(),
                "finished encode"
            );
            EncodeOutcome::Completed { elapsed }
        }
        Err(e) => {
            error!(profile = %profile, error = %e, "encode failed");
            EncodeOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
