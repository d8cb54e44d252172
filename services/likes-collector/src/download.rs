//!
//! src/download.rs  Andrew Belles  Sept 15th, 2025
//!
//! Streams a resolved media url to disk. Bytes land in a `.part` file
//! beside the destination and are only moved into place once the size
//! check passes, so a failed fetch never leaves a file behind.
//!

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::errors::CollectorError;
use crate::fetch::MediaTransport;

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn write_body(
    transport: &dyn MediaTransport,
    url: &str,
    part: &Path,
    cfg: &DownloadConfig
) -> Result<u64, CollectorError> {
    let mut body = transport.stream_get(url, cfg.timeout).await?;
    let file = fs::File::create(part).await?;
    let mut writer = BufWriter::with_capacity(cfg.chunk_size, file);

    while let Some(chunk) = body.next_chunk().await? {
        for piece in chunk.chunks(cfg.chunk_size.max(1)) {
            writer.write_all(piece).await?;
        }
    }
    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    // error pages and truncated streams come back tiny
    let size = fs::metadata(part).await?.len();
    if size < cfg.min_bytes {
        return Err(CollectorError::Rejected(
            format!("{size} bytes, expected at least {}", cfg.min_bytes)
        ));
    }
    Ok(size)
}

async fn stream_to_file(
    transport: &dyn MediaTransport,
    url: &str,
    dest: &Path,
    cfg: &DownloadConfig
) -> Result<u64, CollectorError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = partial_path(dest);
    let written = match write_body(transport, url, &part, cfg).await {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&part, dest).await {
        let _ = fs::remove_file(&part).await;
        return Err(e.into());
    }
    Ok(written)
}

///
/// Fetches `url` into `dest`. Returns whether exactly one valid file now
/// sits at `dest`; on failure nothing is left there.
///
pub async fn fetch_audio(
    transport: &dyn MediaTransport,
    url: &str,
    dest: &Path,
    cfg: &DownloadConfig
) -> bool {
    debug!(dest = %dest.display(), "download.start");
    match stream_to_file(transport, url, dest, cfg).await {
        Ok(bytes) => {
            info!(dest = %dest.display(), bytes, "download.done");
            true
        }
        Err(e) => {
            // a stale file from an earlier run would contradict the record
            if fs::remove_file(dest).await.is_ok() {
                debug!(dest = %dest.display(), "download.removed_stale");
            }
            warn!(dest = %dest.display(), error = %e, "download.failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeBody, FakeTransport, payload};

    const URL: &str = "https://storage.test/mp3/320";

    async fn run(body: FakeBody, dest: &Path) -> bool {
        let transport = FakeTransport::serving(URL, body);
        fetch_audio(&transport, URL, dest, &DownloadConfig::default()).await
    }

    #[tokio::test]
    async fn large_enough_stream_lands_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("audio").join("42.mp3");

        assert!(run(FakeBody::Chunks(payload(20_000, 3000)), &dest).await);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 20_000);
        assert!(!partial_path(&dest).exists());

        let entries = std::fs::read_dir(dest.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn content_is_written_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.mp3");
        let chunks = payload(9000, 700);
        let expected: Vec<u8> = chunks.concat();

        assert!(run(FakeBody::Chunks(chunks), &dest).await);
        assert_eq!(std::fs::read(&dest).unwrap(), expected);
    }

    #[tokio::test]
    async fn exactly_minimum_size_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("min.mp3");
        assert!(run(FakeBody::Chunks(payload(1024, 1024)), &dest).await);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn small_payload_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("small.mp3");

        assert!(!run(FakeBody::Chunks(payload(1023, 512)), &dest).await);
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn broken_stream_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("broken.mp3");

        assert!(!run(FakeBody::BrokenAfter(payload(50_000, 8192)), &dest).await);
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn error_status_and_unknown_host_fail() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.mp3");
        assert!(!run(FakeBody::Status(404), &dest).await);
        assert!(!dest.exists());

        let transport = FakeTransport::default();
        assert!(!fetch_audio(&transport, URL, &dest, &DownloadConfig::default()).await);
        assert_eq!(transport.requested(), vec![URL.to_string()]);
    }

    #[tokio::test]
    async fn failed_refetch_clears_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("stale.mp3");
        std::fs::write(&dest, vec![1u8; 4096]).unwrap();

        assert!(!run(FakeBody::Chunks(payload(10, 10)), &dest).await);
        assert!(!dest.exists());
    }

    #[test]
    fn partial_path_sits_next_to_destination() {
        let dest = Path::new("/tmp/archive/audio/7.mp3");
        assert_eq!(partial_path(dest), Path::new("/tmp/archive/audio/7.mp3.part"));
    }
}
