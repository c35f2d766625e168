//! Server side of the three-phase download protocol (spec §4.8).
//!
//! `REQUEST` opens a read-only handle to the blob and keeps it alive
//! across however many `DATA` round trips the client issues; the
//! session owns the handle and releases it on completion, explicit
//! teardown, or connection close (spec §9 "Long-lived file handles").

use std::path::PathBuf;

use dashmap::DashMap;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use uuid::Uuid;

use crate::error::{Result, ServerError};

pub struct DownloadSession {
    pub file_id: Uuid,
    pub size: u64,
    file: File,
    offset: u64,
}

pub struct DownloadEngine {
    sessions: DashMap<Uuid, DownloadSession>,
}

impl DownloadEngine {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    pub async fn open(&self, file_id: Uuid, storage_path: &PathBuf, size: u64) -> Result<Uuid> {
        let file = File::open(storage_path).await?;
        let download_id = Uuid::new_v4();
        self.sessions.insert(download_id, DownloadSession { file_id, size, file, offset: 0 });
        Ok(download_id)
    }

    /// Read up to `chunk_size` bytes starting at the session's current
    /// offset, returning `(bytes, is_complete)`. Chunking is
    /// server-chosen: a short read (EOF before `chunk_size`) is normal.
    pub async fn read_chunk(&self, download_id: Uuid, chunk_size: u32) -> Result<(u64, Vec<u8>, bool)> {
        let mut session = self.sessions.get_mut(&download_id).ok_or(ServerError::UnknownDownload(download_id))?;
        let offset = session.offset;

        session.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; chunk_size as usize];
        let mut total_read = 0usize;
        loop {
            let n = session.file.read(&mut buf[total_read..]).await?;
            if n == 0 {
                break;
            }
            total_read += n;
            if total_read == buf.len() {
                break;
            }
        }
        buf.truncate(total_read);
        session.offset += total_read as u64;

        let is_complete = session.offset >= session.size;
        if is_complete {
            drop(session);
            self.sessions.remove(&download_id);
        }
        Ok((offset, buf, is_complete))
    }

    pub fn close(&self, download_id: Uuid) {
        self.sessions.remove(&download_id);
    }

    pub async fn close_all(&self, download_ids: &[Uuid]) {
        for id in download_ids {
            self.close(*id);
        }
    }
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_full_file_across_short_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let engine = DownloadEngine::new();
        let file_id = Uuid::new_v4();
        let download_id = engine.open(file_id, &path, 10).await.unwrap();

        let (offset1, chunk1, complete1) = engine.read_chunk(download_id, 4).await.unwrap();
        assert_eq!(offset1, 0);
        assert_eq!(chunk1, b"0123");
        assert!(!complete1);

        let (offset2, chunk2, complete2) = engine.read_chunk(download_id, 4).await.unwrap();
        assert_eq!(offset2, 4);
        assert_eq!(chunk2, b"4567");
        assert!(!complete2);

        let (offset3, chunk3, complete3) = engine.read_chunk(download_id, 4).await.unwrap();
        assert_eq!(offset3, 8);
        assert_eq!(chunk3, b"89");
        assert!(complete3);
    }

    #[tokio::test]
    async fn session_is_closed_after_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"hi").await.unwrap();

        let engine = DownloadEngine::new();
        let download_id = engine.open(Uuid::new_v4(), &path, 2).await.unwrap();
        engine.read_chunk(download_id, 1024).await.unwrap();
        assert!(matches!(engine.read_chunk(download_id, 10).await, Err(ServerError::UnknownDownload(_))));
    }
}
