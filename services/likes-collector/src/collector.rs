//!
//! src/collector.rs  Andrew Belles  Sept 16th, 2025
//!
//! Defines the collector: walks the liked list in order, enriches each
//! track, optionally downloads its audio and hands the records to the
//! archive sink
//!

use std::{path::{Path, PathBuf}, sync::Arc};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{AppConfig, PipelineConfig};
use crate::download::fetch_audio;
use crate::enrich::{MediaMode, ResolveMode, enrich, resolve_media};
use crate::errors::CollectorError;
use crate::fetch::{MediaTransport, MusicSession};
use crate::sink::{ArchiveLayout, ArchiveSink};
use crate::types::{
    ArchiveManifest, CollectionStats, FullTrack, LikedTrackRef, TrackRecord
};

#[derive(Clone)]
pub struct Clients {
    pub session: Arc<dyn MusicSession>,
    pub transport: Arc<dyn MediaTransport>
}

impl Clients {
    pub fn new(
        session: impl MusicSession + 'static,
        transport: impl MediaTransport + 'static
    ) -> Self {
        Self { session: Arc::new(session), transport: Arc::new(transport) }
    }
}

/// What one run produced. `manifest_path` is `None` when nothing was written.
#[derive(Debug)]
pub struct RunOutcome {
    pub manifest: ArchiveManifest,
    pub stats: CollectionStats,
    pub manifest_path: Option<PathBuf>,
    pub liked: usize,
    pub skipped: usize
}

impl RunOutcome {
    pub fn collected(&self) -> usize {
        self.manifest.tracks().len()
    }
}

pub struct Collector {
    pipeline: PipelineConfig,
    source: String,
    clients: Clients
}

impl Collector {
    pub fn new(cfg: &AppConfig, clients: Clients) -> Self {
        Self::with_pipeline(cfg.pipeline.clone(), &cfg.yandex.source_label, clients)
    }

    pub fn with_pipeline(pipeline: PipelineConfig, source: &str, clients: Clients) -> Self {
        Self { pipeline, source: source.to_string(), clients }
    }

    fn empty_outcome(&self, liked: usize, skipped: usize) -> RunOutcome {
        RunOutcome {
            manifest: ArchiveManifest::new(Vec::new(), &self.source),
            stats: CollectionStats::default(),
            manifest_path: None,
            liked,
            skipped
        }
    }

    ///
    /// Collects every liked track into `root`. Only enumeration and
    /// persistence failures are returned; anything that goes wrong with a
    /// single track is logged and the run moves on.
    ///
    pub async fn run(&self, root: &Path, download_audio: bool) ->
        Result<RunOutcome, CollectorError> {
        info!(
            root = %root.display(),
            download_audio,
            delay_ms = self.pipeline.track_delay.as_millis() as u64,
            "collector.start"
        );

        let liked = self.clients.session.liked_tracks().await?;
        if liked.is_empty() {
            warn!("collector.no_likes");
            return Ok(self.empty_outcome(0, 0));
        }
        info!(liked = liked.len(), "collector.enumerated");

        let sink = ArchiveSink::new(root);
        let layout = sink.create_layout(download_audio)?;
        let mode = if download_audio { MediaMode::Download } else { MediaMode::Preview };

        let total = liked.len();
        let mut records = Vec::with_capacity(total);
        let mut skipped = 0_usize;

        for (i, track_ref) in liked.iter().enumerate() {
            if i > 0 {
                sleep(self.pipeline.track_delay).await;
            }
            match self.process_track(track_ref, i + 1, total, mode, &layout).await {
                Some(record) => records.push(record),
                None => skipped += 1
            }
        }

        let stats = CollectionStats::from_records(&records);
        log_stats(&stats, skipped);

        if records.is_empty() {
            warn!(liked = total, skipped, "collector.nothing_collected");
            return Ok(self.empty_outcome(total, skipped));
        }

        let manifest = sink.write_manifest(&layout, records, &self.source)?;
        info!(
            collected = manifest.metadata().total_tracks,
            skipped,
            path = %layout.manifest_path.display(),
            "collector.done"
        );

        Ok(RunOutcome {
            manifest,
            stats,
            manifest_path: Some(layout.manifest_path),
            liked: total,
            skipped
        })
    }

    async fn process_track(
        &self,
        track_ref: &LikedTrackRef,
        index: usize,
        total: usize,
        mode: MediaMode,
        layout: &ArchiveLayout
    ) -> Option<TrackRecord> {
        let session = self.clients.session.as_ref();
        let track = match session.full_track(&track_ref.id).await {
            Ok(track) => track,
            Err(e) => {
                warn!(index, total, track = %track_ref.id, error = %e, "track.fetch_failed");
                return None;
            }
        };

        info!(
            index,
            total,
            track = %track.id,
            title = %track.display_title(),
            artist = track.first_artist().unwrap_or_default(),
            album_id = track.first_album().and_then(|a| a.id.as_deref()).unwrap_or_default(),
            "track.process"
        );

        let Some(record) = enrich(&track, session, mode).await else {
            warn!(index, total, track = %track_ref.id, "track.skip");
            return None;
        };

        if mode == MediaMode::Download && record.available {
            return Some(self.download(&track, record, layout).await);
        }
        Some(record)
    }

    /// Full audio into the archive, or the record marked unavailable
    async fn download(
        &self,
        track: &FullTrack,
        record: TrackRecord,
        layout: &ArchiveLayout
    ) -> TrackRecord {
        let Some(dest) = layout.audio_path(&record.id) else {
            return record.into_unavailable();
        };
        let Some(url) = resolve_media(self.clients.session.as_ref(), track, ResolveMode::Full)
            .await else {
            return record.into_unavailable();
        };

        let transport = self.clients.transport.as_ref();
        if fetch_audio(transport, &url, &dest, &self.pipeline.download).await {
            let media_url = ArchiveLayout::audio_ref(&record.id);
            record.with_media_url(Some(media_url))
        } else {
            record.into_unavailable()
        }
    }
}

fn log_stats(stats: &CollectionStats, skipped: usize) {
    info!(
        total = stats.total,
        with_media = stats.with_media,
        media_pct = %format!("{:.1}", stats.media_percentage()),
        available = stats.available,
        skipped,
        "collector.stats"
    );
    for (genre, count) in &stats.genres {
        info!(genre = %genre, count, "collector.genre");
    }
}
