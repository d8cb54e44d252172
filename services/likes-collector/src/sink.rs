//!
//! src/sink.rs  Andrew Belles  Sept 15th, 2025
//!
//! Builds the archive on disk: root directory, optional audio directory
//! and the manifest, which is written last and atomically
//!

use std::{fs, io::Write, path::{Path, PathBuf}};

use tracing::{debug, info};

use crate::errors::CollectorError;
use crate::types::{ArchiveManifest, TrackRecord};

pub const MANIFEST_FILE: &str = "metadata.json";
pub const AUDIO_DIR: &str = "audio";
pub const AUDIO_EXTENSION: &str = "mp3";
pub const MAX_FILENAME_CHARS: usize = 100;

///
/// Makes an arbitrary display string safe to use as a file name on every
/// platform we care about. One `_` per forbidden character.
///
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c
        })
        .collect();

    let is_edge = |c: char| c.is_whitespace() || c == '.';
    let truncated: String = replaced.trim_matches(is_edge)
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();
    // the cut may expose a new trailing dot or space
    truncated.trim_end_matches(is_edge).to_string()
}

/// File name for a track's audio inside the audio directory
pub fn audio_file_name(track_id: &str) -> String {
    format!("{}.{AUDIO_EXTENSION}", sanitize_filename(track_id))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub root: PathBuf,
    pub audio_dir: Option<PathBuf>,
    pub manifest_path: PathBuf
}

impl ArchiveLayout {
    /// Where a track's audio goes, `None` when audio was not requested
    pub fn audio_path(&self, track_id: &str) -> Option<PathBuf> {
        self.audio_dir.as_ref().map(|dir| dir.join(audio_file_name(track_id)))
    }

    /// Manifest-relative reference to a track's audio file
    pub fn audio_ref(track_id: &str) -> String {
        format!("{AUDIO_DIR}/{}", audio_file_name(track_id))
    }
}

pub struct ArchiveSink {
    root: PathBuf
}

impl ArchiveSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Idempotent, existing directories are left alone
    pub fn create_layout(&self, with_audio: bool) -> Result<ArchiveLayout, CollectorError> {
        fs::create_dir_all(&self.root).map_err(|e|
            CollectorError::Persist(
                format!("create dir {}: {e}", self.root.display())
        ))?;

        let audio_dir = if with_audio {
            let dir = self.root.join(AUDIO_DIR);
            fs::create_dir_all(&dir).map_err(|e|
                CollectorError::Persist(
                    format!("create dir {}: {e}", dir.display())
            ))?;
            Some(dir)
        } else {
            None
        };

        let layout = ArchiveLayout {
            root: self.root.clone(),
            audio_dir,
            manifest_path: self.root.join(MANIFEST_FILE)
        };
        debug!(root = %layout.root.display(), audio = with_audio, "archive.layout");
        Ok(layout)
    }

    ///
    /// Serializes the manifest over any previous one. Written to a temp file
    /// in the same directory and renamed, readers see the old manifest or
    /// the new one, never a torn write.
    ///
    pub fn write_manifest(
        &self,
        layout: &ArchiveLayout,
        records: Vec<TrackRecord>,
        source: &str
    ) -> Result<ArchiveManifest, CollectorError> {
        let manifest = ArchiveManifest::new(records, source);
        let parent = layout.manifest_path.parent().unwrap_or(&layout.root);

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CollectorError::Persist(
                format!("tempfile in {}: {e}", parent.display())
            ))?;

        serde_json::to_writer_pretty(&mut temp, &manifest)
            .map_err(|e| CollectorError::Persist(
                format!("serialize manifest: {e}")
            ))?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;

        temp.persist(&layout.manifest_path)?;

        info!(
            path = %layout.manifest_path.display(),
            total_tracks = manifest.metadata().total_tracks,
            "archive.manifest.written"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_GENRE;

    fn record(id: &str) -> TrackRecord {
        TrackRecord {
            id: id.to_string(),
            title: "Песня".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration_seconds: 200,
            genre: UNKNOWN_GENRE.to_string(),
            cover_url: None,
            media_url: Some(ArchiveLayout::audio_ref(id)),
            available: true
        }
    }

    #[test]
    fn sanitize_replaces_each_forbidden_char() {
        assert_eq!(sanitize_filename("Test<>Song|Name?.mp3"), "Test__Song_Name_.mp3");
        assert_eq!(sanitize_filename(r#"a:b"c/d\e*f"#), "a_b_c_d_e_f");
    }

    #[test]
    fn sanitize_trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  ..hidden name.. "), "hidden name");
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename(" . . "), "");
    }

    #[test]
    fn sanitize_truncates_to_limit() {
        let long = "é".repeat(150);
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);

        // truncation can land right before a dot
        let tricky = format!("{}. tail", "a".repeat(99));
        assert_eq!(sanitize_filename(&tricky), "a".repeat(99));
    }

    #[test]
    fn audio_names_come_from_track_ids() {
        assert_eq!(audio_file_name("12345"), "12345.mp3");
        assert_eq!(audio_file_name("12:34"), "12_34.mp3");
        assert_eq!(ArchiveLayout::audio_ref("9"), "audio/9.mp3");
    }

    #[test]
    fn layout_is_idempotent_and_audio_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("collection");
        let sink = ArchiveSink::new(&root);

        let without = sink.create_layout(false).unwrap();
        assert!(root.is_dir());
        assert!(!root.join(AUDIO_DIR).exists());
        assert_eq!(without.audio_dir, None);
        assert_eq!(without.audio_path("1"), None);
        assert_eq!(without.manifest_path, root.join(MANIFEST_FILE));

        let with = sink.create_layout(true).unwrap();
        let again = sink.create_layout(true).unwrap();
        assert_eq!(with, again);
        assert!(root.join(AUDIO_DIR).is_dir());
        assert_eq!(with.audio_path("7"), Some(root.join("audio").join("7.mp3")));
    }

    #[test]
    fn layout_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("occupied");
        fs::write(&root, b"not a directory").unwrap();

        let result = ArchiveSink::new(&root).create_layout(false);
        assert!(matches!(result, Err(CollectorError::Persist(_))));
    }

    #[test]
    fn manifest_roundtrips_with_matching_total() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArchiveSink::new(dir.path());
        let layout = sink.create_layout(false).unwrap();

        let written = sink.write_manifest(&layout, vec![record("1"), record("2")], "Yandex Music API")
            .unwrap();

        let text = fs::read_to_string(&layout.manifest_path).unwrap();
        assert!(text.contains("Песня"), "non-ascii must be kept verbatim");
        let read: ArchiveManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(read, written);
        assert_eq!(read.metadata().total_tracks, 2);
        assert_eq!(read.metadata().source, "Yandex Music API");
        assert_eq!(read.tracks()[1].id, "2");
    }

    #[test]
    fn manifest_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArchiveSink::new(dir.path());
        let layout = sink.create_layout(false).unwrap();
        fs::write(&layout.manifest_path, "garbage that is not json").unwrap();

        sink.write_manifest(&layout, vec![record("5")], "src").unwrap();

        let read: ArchiveManifest = serde_json::from_str(
            &fs::read_to_string(&layout.manifest_path).unwrap()
        ).unwrap();
        assert_eq!(read.metadata().total_tracks, 1);

        // no temp files left beside it
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn manifest_write_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout {
            root: dir.path().join("gone"),
            audio_dir: None,
            manifest_path: dir.path().join("gone").join(MANIFEST_FILE)
        };
        let sink = ArchiveSink::new(&layout.root);
        assert!(sink.write_manifest(&layout, vec![record("1")], "src").is_err());
        assert!(!layout.manifest_path.exists());
    }
}
