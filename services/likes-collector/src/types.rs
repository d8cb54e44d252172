//!
//! src/types.rs  Andrew Belles  Sept 14th, 2025
//!
//! Data model shared by the collector: the remote catalog shapes we
//! read, the per-track record we emit and the manifest we persist
//!

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "unknown";

/// The remote sends ids as strings in some endpoints and numbers in others
fn flexible_id<'de, D>(d: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new()
    })
}

fn flexible_opt_id<'de, D>(d: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let id = flexible_id(d)?;
    Ok(if id.is_empty() { None } else { Some(id) })
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where D: Deserializer<'de>, T: Default + Deserialize<'de> {
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Entry of the likes listing, only good for fetching the full track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikedTrackRef {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    #[serde(default, deserialize_with = "flexible_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub cover_uri: Option<String>
}

///
/// Full remote representation of a track. Every field is optional on the
/// wire, absence is modelled explicitly.
///
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTrack {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Artist>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub cover_uri: Option<String>,
    #[serde(default)]
    pub available: Option<bool>
}

impl FullTrack {
    pub fn first_artist(&self) -> Option<&str> {
        self.artists.first()
            .and_then(|a| a.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    pub fn first_album(&self) -> Option<&Album> {
        self.albums.first()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// One codec/bitrate/url option for a track's playable media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub url: String
}

///
/// Per-track output unit written into the manifest
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: u64,
    pub genre: String,
    pub cover_url: Option<String>,
    pub media_url: Option<String>,
    pub available: bool
}

impl TrackRecord {
    pub fn with_media_url(self, media_url: Option<String>) -> Self {
        Self { media_url, ..self }
    }

    /// Local availability wins over what the remote reported
    pub fn into_unavailable(self) -> Self {
        Self { available: false, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub total_tracks: usize,
    pub generated_at: DateTime<Utc>,
    pub source: String
}

///
/// Persisted aggregate. Built only through `new`, so `total_tracks`
/// always matches the track list it was built from.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    metadata: ManifestMetadata,
    tracks: Vec<TrackRecord>
}

impl ArchiveManifest {
    pub fn new(tracks: Vec<TrackRecord>, source: &str) -> Self {
        Self {
            metadata: ManifestMetadata {
                total_tracks: tracks.len(),
                generated_at: Utc::now(),
                source: source.to_string()
            },
            tracks
        }
    }

    pub fn metadata(&self) -> &ManifestMetadata {
        &self.metadata
    }

    pub fn tracks(&self) -> &[TrackRecord] {
        &self.tracks
    }
}

/// Reporting-only aggregates, never written into the manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub total: usize,
    pub with_media: usize,
    pub available: usize,
    pub genres: Vec<(String, usize)>
}

impl CollectionStats {
    pub fn from_records(records: &[TrackRecord]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in records {
            *counts.entry(record.genre.as_str()).or_default() += 1;
        }
        let mut genres: Vec<(String, usize)> = counts.into_iter()
            .map(|(genre, count)| (genre.to_string(), count))
            .collect();
        genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total: records.len(),
            with_media: records.iter().filter(|r| r.media_url.is_some()).count(),
            available: records.iter().filter(|r| r.available).count(),
            genres
        }
    }

    pub fn media_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.with_media as f64 / self.total as f64 * 100.0
    }
}
