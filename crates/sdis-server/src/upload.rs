//! Server side of the three-message upload protocol (spec §4.8).
//!
//! `START` opens a session keyed by a random `upload_id` and a
//! temporary file; `DATA` frames append to that file, never to a memory
//! buffer; `END` atomically renames the temp file onto the allocated
//! `storage_path`; `CANCEL` discards both.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Result, ServerError};

pub struct UploadSession {
    pub file_id: Uuid,
    pub storage_path: PathBuf,
    temp_path: PathBuf,
    file: File,
    pub expected_size: u64,
    pub received: u64,
}

pub struct UploadEngine {
    blob_dir: PathBuf,
    sessions: DashMap<Uuid, UploadSession>,
}

impl UploadEngine {
    pub fn new(blob_dir: PathBuf) -> Self {
        Self { blob_dir, sessions: DashMap::new() }
    }

    /// Allocate an unused `storage_path`, open its `.tmp` sibling, and
    /// register a new upload session (spec §4.8 `START`).
    pub async fn start(&self, file_id: Uuid, expected_size: u64) -> Result<Uuid> {
        let upload_id = Uuid::new_v4();
        let storage_path = self.blob_dir.join(file_id.to_string());
        let temp_path = self.blob_dir.join(format!("{file_id}.tmp"));
        let file = File::create(&temp_path).await?;

        self.sessions.insert(
            upload_id,
            UploadSession { file_id, storage_path, temp_path, file, expected_size, received: 0 },
        );
        Ok(upload_id)
    }

    /// Append one chunk to the session's temp file (spec §4.8 `DATA`).
    pub async fn write_chunk(&self, upload_id: Uuid, chunk: &[u8]) -> Result<u64> {
        let mut session = self.sessions.get_mut(&upload_id).ok_or(ServerError::UnknownUpload(upload_id))?;
        session.file.write_all(chunk).await?;
        session.received += chunk.len() as u64;
        Ok(session.received)
    }

    /// Flush, close, and atomically rename the temp file onto its final
    /// path (spec §4.8 `END`). Size is trusted from `START`; a mismatch
    /// between `received` and `expected_size` is stored as-is, per
    /// spec.md §9.
    pub async fn finish(&self, upload_id: Uuid) -> Result<(Uuid, PathBuf, u64)> {
        let (_, mut session) = self.sessions.remove(&upload_id).ok_or(ServerError::UnknownUpload(upload_id))?;
        session.file.flush().await?;
        tokio::fs::rename(&session.temp_path, &session.storage_path).await?;
        Ok((session.file_id, session.storage_path, session.received))
    }

    /// Drop the temp file and forget the session (spec §4.8 `CANCEL`).
    pub async fn cancel(&self, upload_id: Uuid) -> Result<Uuid> {
        let (_, session) = self.sessions.remove(&upload_id).ok_or(ServerError::UnknownUpload(upload_id))?;
        drop(session.file);
        let _ = tokio::fs::remove_file(&session.temp_path).await;
        Ok(session.file_id)
    }

    /// Release every temp file belonging to `upload_ids`; called when a
    /// connection closes with uploads still in flight.
    pub async fn discard_all(&self, upload_ids: &[Uuid]) {
        for id in upload_ids {
            let _ = self.cancel(*id).await;
        }
    }

    pub fn temp_path_for(&self, file_id: Uuid) -> PathBuf {
        self.blob_dir.join(format!("{file_id}.tmp"))
    }

    pub fn storage_path_for(&self, file_id: Uuid) -> PathBuf {
        self.blob_dir.join(file_id.to_string())
    }
}

/// Allocate a storage path for a file id without necessarily going
/// through the upload engine, used by handlers that only need the path
/// string to store in the file tree row.
pub fn storage_path(blob_dir: &Path, file_id: Uuid) -> PathBuf {
    blob_dir.join(file_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_write_finish_roundtrips_to_final_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = UploadEngine::new(dir.path().to_path_buf());
        let file_id = Uuid::new_v4();

        let upload_id = engine.start(file_id, 11).await.unwrap();
        engine.write_chunk(upload_id, b"hello ").await.unwrap();
        engine.write_chunk(upload_id, b"world").await.unwrap();
        let (_, storage_path, received) = engine.finish(upload_id).await.unwrap();

        assert_eq!(received, 11);
        let contents = tokio::fs::read(&storage_path).await.unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn cancel_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = UploadEngine::new(dir.path().to_path_buf());
        let file_id = Uuid::new_v4();
        let upload_id = engine.start(file_id, 5).await.unwrap();
        let temp_path = engine.temp_path_for(file_id);
        assert!(temp_path.exists());
        engine.cancel(upload_id).await.unwrap();
        assert!(!temp_path.exists());
        assert!(matches!(engine.finish(upload_id).await, Err(ServerError::UnknownUpload(_))));
    }

    #[tokio::test]
    async fn data_on_unknown_upload_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let engine = UploadEngine::new(dir.path().to_path_buf());
        let bogus = Uuid::new_v4();
        assert!(matches!(engine.write_chunk(bogus, b"x").await, Err(ServerError::UnknownUpload(_))));
    }
}
