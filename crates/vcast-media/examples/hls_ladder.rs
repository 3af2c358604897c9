//! Demo: transcode one source URL into a full H.264 + VP9 HLS ladder.
//!
//! Run with: cargo run -p vcast-media --example hls_ladder -- <media-url>

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcast_media::{TranscodeConfig, Transcoder};
use vcast_models::{AudioProfile, ProfileSet, VideoProfile};

fn ladder() -> ProfileSet {
    let pairs = [
        ("1080p", VideoProfile::new(1080, 1920, 5000, 32)),
        ("720p", VideoProfile::new(720, 1280, 2800, 32)),
        ("540p", VideoProfile::new(540, 960, 1800, 32)),
        ("480p", VideoProfile::new(480, 854, 480, 32)),
        ("360p", VideoProfile::new(360, 640, 800, 32)),
        ("vp9_1080p", VideoProfile::new(1080, 1920, 5000, 32)),
        ("vp9_720p", VideoProfile::new(720, 1280, 2800, 32)),
        ("vp9_540p", VideoProfile::new(540, 960, 1800, 32)),
        ("vp9_480p", VideoProfile::new(480, 854, 480, 32)),
        ("vp9_360p", VideoProfile::new(360, 640, 800, 32)),
    ];
    ProfileSet::from_pairs(pairs).expect("ladder profiles are valid")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vcast=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();

    let media_url = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: hls_ladder <media-url>"))?;

    let config = TranscodeConfig::new(media_url);
    vcast_media::check_ffmpeg(&config.ffmpeg_binary)?;
    vcast_media::check_ffprobe(&config.ffprobe_binary)?;
    let transcoder = Transcoder::new(config, ladder(), AudioProfile::new(128))?;

    info!(
        run_id = %transcoder.run_id(),
        work_dir = %transcoder.work_dir().display(),
        "starting run; press Ctrl-C to cancel"
    );

    let report = tokio::select! {
        report = transcoder.run() => report?,
        _ = tokio::signal::ctrl_c() => {
            transcoder.cancel();
            anyhow::bail!("run cancelled");
        }
    };

    for outcome in &report.outcomes {
        info!(profile = %outcome.profile, outcome = ?outcome.outcome, "profile result");
    }

    if report.all_completed() {
        info!("all profiles completed");
        Ok(())
    } else {
        error!("some profiles did not complete");
        anyhow::bail!("partial failure")
    }
}
