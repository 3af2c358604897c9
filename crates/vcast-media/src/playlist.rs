//! Master playlist generation.

use vcast_models::{ProfileSet, VideoCodec, AAC_CODEC_TAG};

/// Filename of the master playlist inside the run workspace.
pub const MASTER_PLAYLIST_NAME: &str = "playlist.m3u8";

/// Build the master playlist text for a profile set.
///
/// One variant-stream entry per profile, sorted ascending by bitrate with
/// ties broken by lexical name order; each entry references the profile's
/// own variant playlist at `<name>/<name>.m3u8`. The media segment
/// playlists themselves are produced by the encoder, not here.
pub fn build_master_playlist(profiles: &ProfileSet) -> String {
    let mut lines = vec!["#EXTM3U".to_string()];

    for (name, profile) in profiles.sorted_by_bitrate() {
        let codec = VideoCodec::for_profile(name);
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},CODECS=\"{},{}\",RESOLUTION={}x{},NAME={}",
            profile.bitrate_kbps,
            codec.rfc6381_tag(),
            AAC_CODEC_TAG,
            profile.width,
            profile.height,
            name
        ));
        lines.push(format!("{}/{}.m3u8", name, name));
    }

    lines.join("\n")
}
