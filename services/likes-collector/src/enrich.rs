//!
//! src/enrich.rs  Andrew Belles  Sept 15th, 2025
//!
//! Turns one full remote track into the record the visualizer consumes:
//! genre and cover fallbacks plus media url resolution over the
//! encodings the remote offers
//!

use tracing::{debug, info, warn};

use crate::errors::CollectorError;
use crate::fetch::MusicSession;
use crate::types::{
    FullTrack, MediaCandidate, TrackRecord, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE
};

pub const PREVIEW_MAX_KBPS: u32 = 192;
pub const COVER_SIZE: &str = "400x400";

/// Which encoding to pick among a track's candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Preview,
    Full
}

/// Pipeline mode: link previews, or download full audio locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    Preview,
    Download
}

fn is_mp3(candidate: &MediaCandidate) -> bool {
    candidate.codec.eq_ignore_ascii_case("mp3")
}

/// First low-bitrate mp3, in the order the remote listed them
pub fn select_preview(candidates: &[MediaCandidate]) -> Option<&MediaCandidate> {
    candidates.iter()
        .find(|c| is_mp3(c) && c.bitrate_kbps <= PREVIEW_MAX_KBPS)
}

/// Highest bitrate mp3, the earliest one wins a tie
pub fn select_full(candidates: &[MediaCandidate]) -> Option<&MediaCandidate> {
    candidates.iter()
        .filter(|c| is_mp3(c))
        .fold(None, |best: Option<&MediaCandidate>, c| match best {
            Some(b) if b.bitrate_kbps >= c.bitrate_kbps => Some(b),
            _ => Some(c)
        })
}

///
/// Resolves a playable url for the track. Remote failures are reported and
/// turned into `None`, they never abort the caller.
///
pub async fn resolve_media(
    session: &dyn MusicSession,
    track: &FullTrack,
    mode: ResolveMode
) -> Option<String> {
    let candidates = match session.media_candidates(track).await {
        Ok(c) => c,
        Err(e @ (CollectorError::Api { .. } | CollectorError::Auth(_))) => {
            warn!(track = %track.id, title = %track.display_title(), error = %e,
                "media.api_error");
            return None;
        }
        Err(e) => {
            warn!(track = %track.id, title = %track.display_title(), error = %e,
                "media.error");
            return None;
        }
    };

    let selected = match mode {
        ResolveMode::Preview => select_preview(&candidates),
        ResolveMode::Full => select_full(&candidates)
    };

    match selected {
        Some(c) => {
            debug!(track = %track.id, codec = %c.codec, bitrate = c.bitrate_kbps,
                mode = ?mode, "media.resolved");
            Some(c.url.clone())
        }
        None => {
            info!(track = %track.id, title = %track.display_title(),
                offered = candidates.len(), mode = ?mode, "media.unavailable");
            None
        }
    }
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// First artist genre, then first album genre, then "unknown"
pub fn extract_genre(track: &FullTrack) -> String {
    let from_artist = track.artists.first()
        .and_then(|a| non_empty(a.genres.first()));
    let from_album = || track.first_album()
        .and_then(|a| non_empty(a.genre.as_ref()));

    from_artist
        .or_else(from_album)
        .unwrap_or(UNKNOWN_GENRE)
        .to_string()
}

/// Cover uris come templated (`%%` for the size) and without a scheme
pub fn format_cover_uri(uri: &str) -> String {
    format!("https://{}", uri.replace("%%", COVER_SIZE))
}

/// Track cover, then first album cover
pub fn cover_url(track: &FullTrack) -> Option<String> {
    non_empty(track.cover_uri.as_ref())
        .or_else(|| track.first_album().and_then(|a| non_empty(a.cover_uri.as_ref())))
        .map(format_cover_uri)
}

///
/// Builds the record for one track. `None` means the track cannot be
/// described at all and the caller should skip it entirely.
///
pub async fn enrich(
    track: &FullTrack,
    session: &dyn MusicSession,
    mode: MediaMode
) -> Option<TrackRecord> {
    if track.id.trim().is_empty() {
        warn!(title = %track.display_title(), "enrich.no_id");
        return None;
    }

    let available = track.available.unwrap_or(true);
    let record = TrackRecord {
        id: track.id.clone(),
        title: track.display_title().to_string(),
        artist: track.first_artist().unwrap_or(UNKNOWN_ARTIST).to_string(),
        album: track.first_album()
            .and_then(|a| non_empty(a.title.as_ref()))
            .unwrap_or(UNKNOWN_ALBUM)
            .to_string(),
        duration_seconds: track.duration_ms.map(|ms| ms / 1000).unwrap_or(0),
        genre: extract_genre(track),
        cover_url: cover_url(track),
        media_url: None,
        available
    };

    // full downloads are resolved and stored by the collector
    if mode == MediaMode::Preview && available {
        let preview = resolve_media(session, track, ResolveMode::Preview).await;
        return Some(record.with_media_url(preview));
    }
    Some(record)
}
