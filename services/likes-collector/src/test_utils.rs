//!
//! src/test_utils.rs  Andrew Belles  Sept 16th, 2025
//!
//! Test fixtures: in-memory stand-ins for the remote session and the
//! media transport, plus track factories
//!

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::CollectorError;
use crate::fetch::{BodyStream, MediaTransport, MusicSession};
use crate::types::{Album, Artist, FullTrack, LikedTrackRef, MediaCandidate};

/// A fully populated track, customise with struct update syntax
pub fn mock_full_track(id: &str) -> FullTrack {
    FullTrack {
        id: id.to_string(),
        title: Some(format!("Track {id}")),
        duration_ms: Some(180_500),
        artists: vec![Artist {
            name: Some("Test Artist".to_string()),
            genres: vec!["rock".to_string()]
        }],
        albums: vec![Album {
            id: Some("77".to_string()),
            title: Some("Test Album".to_string()),
            genre: Some("alternative".to_string()),
            cover_uri: Some("avatars.yandex.net/get-music-content/%%/album".to_string())
        }],
        cover_uri: Some("avatars.yandex.net/get-music-content/%%/test".to_string()),
        available: Some(true)
    }
}

pub fn candidate(codec: &str, bitrate_kbps: u32) -> MediaCandidate {
    MediaCandidate {
        codec: codec.to_string(),
        bitrate_kbps,
        url: format!("https://storage.test/{codec}/{bitrate_kbps}")
    }
}

/// The encodings the remote typically offers for a track
pub fn typical_candidates() -> Vec<MediaCandidate> {
    vec![candidate("mp3", 320), candidate("mp3", 128), candidate("aac", 256)]
}

/// Typical candidates with urls unique to one track
pub fn candidates_for(track_id: &str) -> Vec<MediaCandidate> {
    typical_candidates().into_iter()
        .map(|c| MediaCandidate {
            url: format!("https://storage.test/{track_id}/{}/{}", c.codec, c.bitrate_kbps),
            ..c
        })
        .collect()
}

/// Url the full-download resolver picks for a track from `candidates_for`
pub fn full_url(track_id: &str) -> String {
    format!("https://storage.test/{track_id}/mp3/320")
}

#[derive(Default)]
pub struct FakeSession {
    /// `None` makes enumeration fail
    pub liked: Option<Vec<LikedTrackRef>>,
    /// ids missing here fail `full_track`
    pub tracks: HashMap<String, FullTrack>,
    /// ids missing here fail `media_candidates`
    pub candidates: HashMap<String, Vec<MediaCandidate>>,
    pub fetched: Mutex<Vec<String>>
}

impl FakeSession {
    /// Likes every given track, each offering its own typical candidates
    pub fn with_tracks(tracks: Vec<FullTrack>) -> Self {
        let liked = tracks.iter()
            .map(|t| LikedTrackRef { id: t.id.clone() })
            .collect();
        let candidates = tracks.iter()
            .map(|t| (t.id.clone(), candidates_for(&t.id)))
            .collect();
        let tracks = tracks.into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self { liked: Some(liked), tracks, candidates, fetched: Mutex::new(Vec::new()) }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MusicSession for FakeSession {
    async fn liked_tracks(&self) -> Result<Vec<LikedTrackRef>, CollectorError> {
        self.liked.clone()
            .ok_or_else(|| CollectorError::Auth("session-expired".into()))
    }

    async fn full_track(&self, id: &str) -> Result<FullTrack, CollectorError> {
        self.fetched.lock().unwrap().push(id.to_string());
        self.tracks.get(id)
            .cloned()
            .ok_or_else(|| CollectorError::Api { status: 404, message: format!("no track {id}") })
    }

    async fn media_candidates(&self, track: &FullTrack) ->
        Result<Vec<MediaCandidate>, CollectorError> {
        self.candidates.get(&track.id)
            .cloned()
            .ok_or_else(|| CollectorError::Http("connection reset".into()))
    }
}

pub enum FakeBody {
    Chunks(Vec<Vec<u8>>),
    /// yields the chunks, then a transport error
    BrokenAfter(Vec<Vec<u8>>),
    Status(u16)
}

#[derive(Default)]
pub struct FakeTransport {
    pub bodies: HashMap<String, FakeBody>,
    pub requested: Mutex<Vec<String>>
}

impl FakeTransport {
    pub fn serving(url: &str, body: FakeBody) -> Self {
        Self::default().with(url, body)
    }

    pub fn with(mut self, url: &str, body: FakeBody) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

/// `size` bytes split into `chunk` sized pieces
pub fn payload(size: usize, chunk: usize) -> Vec<Vec<u8>> {
    let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    bytes.chunks(chunk.max(1)).map(<[u8]>::to_vec).collect()
}

struct FakeStream {
    chunks: VecDeque<Vec<u8>>,
    broken: bool
}

#[async_trait]
impl BodyStream for FakeStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CollectorError> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.broken => Err(CollectorError::Http("stream reset".into())),
            None => Ok(None)
        }
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn stream_get(&self, url: &str, _timeout: Duration) ->
        Result<Box<dyn BodyStream>, CollectorError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(FakeBody::Chunks(chunks)) => Ok(Box::new(FakeStream {
                chunks: chunks.iter().cloned().collect(),
                broken: false
            })),
            Some(FakeBody::BrokenAfter(chunks)) => Ok(Box::new(FakeStream {
                chunks: chunks.iter().cloned().collect(),
                broken: true
            })),
            Some(FakeBody::Status(status)) => Err(CollectorError::Api {
                status: *status,
                message: "fake status".into()
            }),
            None => Err(CollectorError::Http(format!("connection refused: {url}")))
        }
    }
}
