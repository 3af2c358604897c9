//! End-to-end transcode runs against stub ffmpeg/ffprobe binaries.
//!
//! The stubs are small shell scripts: the prober prints canned JSON placed
//! next to the script, the encoder writes a variant playlist and one media
//! segment into the directory the job points it at. Each invocation is
//! appended to a call log so probe-pass counts can be asserted.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use vcast_media::{MediaError, TranscodeConfig, Transcoder};
use vcast_models::{
    AudioProfile, EncodeOutcome, ProfileError, ProfileSet, SegmentationMode, VideoProfile,
};

const FFPROBE_STUB: &str = r#"#!/bin/sh
echo run >> "$0.calls"
for a in "$@"; do
  if [ "$a" = "packet=pts_time,flags" ]; then
    echo run >> "$0.kf_calls"
    cat "$0.kf.json"
    exit 0
  fi
done
cat "$0.media.json"
"#;

const FFPROBE_FAILING_STUB: &str = "#!/bin/sh\nexit 1\n";

// Fails any job whose variant playlist path mentions "boom"; otherwise
// writes one segment plus the variant playlist, like the real muxer would.
const FFMPEG_STUB: &str = r#"#!/bin/sh
prev=""
seg=""
last=""
for a in "$@"; do
  if [ "$prev" = "-hls_segment_filename" ]; then
    seg="$a"
  fi
  prev="$a"
  last="$a"
done
case "$last" in
  *boom*) exit 3 ;;
esac
if [ -n "$seg" ]; then
  segfile=$(printf "$seg" 0)
  : > "$segfile"
fi
printf '#EXTM3U\n#EXT-X-ENDLIST\n' > "$last"
"#;

const MEDIA_JSON: &str = r#"{
  "format": {"duration": "12.500000"},
  "streams": [
    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
    {"codec_type": "audio", "codec_name": "aac"}
  ]
}
"#;

const KF_JSON_EMPTY: &str = r#"{"packets": []}
"#;

const KF_JSON_ALIGNED: &str = r#"{
  "packets": [
    {"pts_time": "0.000000", "flags": "K__"},
    {"pts_time": "10.000000", "flags": "K__"}
  ]
}
"#;

struct Stubs {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn install_stubs(dir: &Path, kf_json: &str) -> Stubs {
    let ffmpeg = dir.join("ffmpeg-stub");
    let ffprobe = dir.join("ffprobe-stub");
    write_executable(&ffmpeg, FFMPEG_STUB);
    write_executable(&ffprobe, FFPROBE_STUB);
    std::fs::write(dir.join("ffprobe-stub.media.json"), MEDIA_JSON).unwrap();
    std::fs::write(dir.join("ffprobe-stub.kf.json"), kf_json).unwrap();
    Stubs { ffmpeg, ffprobe }
}

fn call_count(stub: &Path, suffix: &str) -> usize {
    let log = PathBuf::from(format!("{}{}", stub.display(), suffix));
    match std::fs::read_to_string(log) {
        Ok(content) => content.lines().count(),
        Err(_) => 0,
    }
}

fn config_with(tmp: &TempDir, stubs: &Stubs) -> TranscodeConfig {
    TranscodeConfig::new("https://example.com/source.mp4")
        .with_output_root(tmp.path())
        .with_binaries(&stubs.ffmpeg, &stubs.ffprobe)
}

fn single_profile(name: &str) -> ProfileSet {
    let mut set = ProfileSet::new();
    set.insert(name, VideoProfile::new(480, 854, 480, 32)).unwrap();
    set
}

#[tokio::test]
async fn run_produces_master_playlist_and_variant_outputs() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    let report = transcoder.run().await.unwrap();
    assert!(report.all_completed());

    let playlist = std::fs::read_to_string(report.work_dir.join("playlist.m3u8")).unwrap();
    let stream_inf: Vec<_> = playlist
        .lines()
        .filter(|l| l.starts_with("#EXT-X-STREAM-INF"))
        .collect();
    assert_eq!(stream_inf.len(), 1);
    assert!(stream_inf[0].contains("BANDWIDTH=480"));

    assert!(report.work_dir.join("480p/480p.m3u8").is_file());
    assert!(report.work_dir.join("480p/chunk-00000.ts").is_file());
}

#[tokio::test]
async fn keyframe_probe_fills_alignment() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_ALIGNED);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    let report = transcoder.run().await.unwrap();
    assert_eq!(report.segmentation, SegmentationMode::KeyframeAligned);
    // One general pass plus one targeted keyframe pass.
    assert_eq!(call_count(&stubs.ffprobe, ".calls"), 2);
    assert_eq!(call_count(&stubs.ffprobe, ".kf_calls"), 1);
}

#[tokio::test]
async fn empty_keyframe_fallback_degrades_without_abort() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    let report = transcoder.run().await.unwrap();
    // The second probe was issued, yielded nothing, and the run proceeded.
    assert_eq!(call_count(&stubs.ffprobe, ".kf_calls"), 1);
    assert_eq!(report.segmentation, SegmentationMode::FixedLength);
    assert!(report.all_completed());
}

#[tokio::test]
async fn keyframe_alignment_disabled_skips_second_probe() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_ALIGNED);

    let config = config_with(&tmp, &stubs).with_keyframe_aligned(false);
    let transcoder =
        Transcoder::new(config, single_profile("480p"), AudioProfile::new(128)).unwrap();

    let report = transcoder.run().await.unwrap();
    assert_eq!(call_count(&stubs.ffprobe, ".kf_calls"), 0);
    assert_eq!(report.segmentation, SegmentationMode::FixedLength);
}

#[tokio::test]
async fn probe_failure_continues_with_time_based_segmentation() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);
    write_executable(&stubs.ffprobe, FFPROBE_FAILING_STUB);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    let report = transcoder.run().await.unwrap();
    assert_eq!(report.segmentation, SegmentationMode::FixedLength);
    assert!(report.all_completed());
}

#[tokio::test]
async fn vp9_profile_writes_fmp4_segments() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("vp9_480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    let report = transcoder.run().await.unwrap();
    assert!(report.all_completed());

    let playlist = std::fs::read_to_string(report.work_dir.join("playlist.m3u8")).unwrap();
    assert!(playlist.contains("CODECS=\"vp09.00.10.08,mp4a.40.2\""));
    assert!(report.work_dir.join("vp9_480p/vp9_480p.m3u8").is_file());
    assert!(report.work_dir.join("vp9_480p/chunk-00000.m4s").is_file());
}

#[tokio::test]
async fn failed_profile_does_not_stop_remaining() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let mut profiles = ProfileSet::new();
    profiles
        .insert("boom", VideoProfile::new(480, 854, 480, 32))
        .unwrap();
    profiles
        .insert("360p", VideoProfile::new(360, 640, 800, 32))
        .unwrap();

    let transcoder =
        Transcoder::new(config_with(&tmp, &stubs), profiles, AudioProfile::new(128)).unwrap();

    let report = transcoder.run().await.unwrap();
    assert!(report.outcome_for("boom").unwrap().is_failed());
    assert!(report.outcome_for("360p").unwrap().is_completed());

    // Outcomes follow profile insertion order.
    let order: Vec<_> = report.outcomes.iter().map(|o| o.profile.as_str()).collect();
    assert_eq!(order, vec!["boom", "360p"]);

    assert!(report.work_dir.join("360p/360p.m3u8").is_file());
}

#[tokio::test]
async fn encoder_start_failure_is_per_profile() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let config = TranscodeConfig::new("https://example.com/source.mp4")
        .with_output_root(tmp.path())
        .with_binaries(tmp.path().join("missing-encoder"), &stubs.ffprobe);
    let transcoder =
        Transcoder::new(config, single_profile("480p"), AudioProfile::new(128)).unwrap();

    let report = transcoder.run().await.unwrap();
    match report.outcome_for("480p").unwrap() {
        EncodeOutcome::Failed { reason } => assert!(reason.contains("FFmpeg")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_profile_set_fails_before_any_io() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let err = Transcoder::new(
        config_with(&tmp, &stubs),
        ProfileSet::new(),
        AudioProfile::new(128),
    )
    .unwrap_err();

    assert!(matches!(err, MediaError::Profile(ProfileError::EmptySet)));
    assert!(!tmp.path().join("output").exists());
}

#[tokio::test]
async fn cancelled_run_skips_all_profiles() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let transcoder = Transcoder::new(
        config_with(&tmp, &stubs),
        single_profile("480p"),
        AudioProfile::new(128),
    )
    .unwrap();

    transcoder.cancel();
    let report = transcoder.run().await.unwrap();

    assert!(report
        .outcomes
        .iter()
        .all(|o| o.outcome == EncodeOutcome::Skipped));
    // The master playlist is still written: it precedes encoding.
    assert!(report.work_dir.join("playlist.m3u8").is_file());
}

#[tokio::test]
async fn bounded_parallel_run_completes_all_profiles() {
    let tmp = TempDir::new().unwrap();
    let stubs = install_stubs(tmp.path(), KF_JSON_EMPTY);

    let mut profiles = ProfileSet::new();
    for (name, bitrate) in [("360p", 800), ("480p", 480), ("540p", 1800)] {
        profiles
            .insert(name, VideoProfile::new(480, 854, bitrate, 32))
            .unwrap();
    }

    let config = config_with(&tmp, &stubs).with_max_concurrent_encodes(3);
    let transcoder = Transcoder::new(config, profiles, AudioProfile::new(128)).unwrap();

    let report = transcoder.run().await.unwrap();
    assert!(report.all_completed());
    for name in ["360p", "480p", "540p"] {
        assert!(report.work_dir.join(name).join(format!("{name}.m3u8")).is_file());
    }

    let order: Vec<_> = report.outcomes.iter().map(|o| o.profile.as_str()).collect();
    assert_eq!(order, vec!["360p", "480p", "540p"]);
}
