//! Client-side upload: encrypts a local file under a fresh file key,
//! then drives the three-message `FILE_UPLOAD_*` state machine (spec
//! §4.8). Buffers the whole ciphertext for small files (CBC); streams
//! chunk-by-chunk for large ones (CTR), reusing one `CtrCursor` for the
//! entire blob.
//!
//! Unlike the server's own upload spooling, chunks here flow straight to
//! the wire as they're encrypted rather than through an intermediate
//! local temp file — there is no resumability requirement on the client
//! side that would justify the extra disk round-trip.

use std::path::Path;

use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use sdis_crypto::keys::{SymmetricKey, WrappedKey};
use sdis_proto::blob::{self, BlobVersion, StreamingEncryptor};
use sdis_proto::Opcode;

use crate::error::{ClientError, Result};
use crate::key_hierarchy::wrap_file_key;
use crate::transport::Transport;

/// Where to place the uploaded file.
#[derive(Debug)]
pub struct UploadTarget {
    pub filename: String,
    pub parent_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

pub struct UploadedFile {
    pub file_id: Uuid,
    pub encrypted_file_key: WrappedKey,
}

/// Encrypt and upload `source_path` under `wrap_key` (the unlocked
/// master key for a personal file, the unwrapped group key for a group
/// file), returning the new file's id and its wrapped file key.
pub async fn upload_file(
    transport: &Transport,
    wrap_key: &SymmetricKey,
    source_path: &Path,
    target: UploadTarget,
    chunk_size: usize,
) -> Result<UploadedFile> {
    let plain_size = tokio::fs::metadata(source_path).await?.len();
    let (file_key, encrypted_file_key) = wrap_file_key(wrap_key)?;

    let (upload_id, file_id) = match BlobVersion::for_size(plain_size) {
        BlobVersion::Cbc => upload_buffered(transport, &file_key, &encrypted_file_key, source_path, &target).await?,
        BlobVersion::Ctr => upload_streamed(transport, &file_key, &encrypted_file_key, source_path, plain_size, &target, chunk_size).await?,
    };

    transport.call(Opcode::FileUploadEnd, json!({ "upload_id": upload_id })).await?;
    Ok(UploadedFile { file_id, encrypted_file_key })
}

async fn start_upload(transport: &Transport, target: &UploadTarget, size: u64, encrypted_file_key: &WrappedKey) -> Result<(Uuid, Uuid)> {
    let response = transport
        .call(
            Opcode::FileUploadStart,
            json!({
                "filename": target.filename,
                "size": size,
                "encrypted_file_key": encrypted_file_key.ciphertext,
                "parent_id": target.parent_id,
                "group_id": target.group_id,
            }),
        )
        .await?;
    let upload_id = require_uuid(&response, "upload_id")?;
    let file_id = require_uuid(&response, "file_id")?;
    Ok((upload_id, file_id))
}

async fn upload_buffered(
    transport: &Transport,
    file_key: &SymmetricKey,
    encrypted_file_key: &WrappedKey,
    source_path: &Path,
    target: &UploadTarget,
) -> Result<(Uuid, Uuid)> {
    let plaintext = tokio::fs::read(source_path).await?;
    let ciphertext = blob::encrypt_whole_cbc(file_key.as_bytes(), &plaintext)?;
    let (upload_id, file_id) = start_upload(transport, target, ciphertext.len() as u64, encrypted_file_key).await?;

    for chunk in ciphertext.chunks(64 * 1024) {
        send_chunk(transport, upload_id, chunk).await?;
    }
    Ok((upload_id, file_id))
}

async fn upload_streamed(
    transport: &Transport,
    file_key: &SymmetricKey,
    encrypted_file_key: &WrappedKey,
    source_path: &Path,
    plain_size: u64,
    target: &UploadTarget,
    chunk_size: usize,
) -> Result<(Uuid, Uuid)> {
    let cipher_size = plain_size + 1 + sdis_crypto::aes::CTR_NONCE_LEN as u64;
    let (upload_id, file_id) = start_upload(transport, target, cipher_size, encrypted_file_key).await?;

    let mut file = tokio::fs::File::open(source_path).await?;
    let mut encryptor = StreamingEncryptor::new(file_key.as_bytes());
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let wire_chunk = encryptor.encrypt_chunk(&mut buf[..n]);
        send_chunk(transport, upload_id, &wire_chunk).await?;
    }
    Ok((upload_id, file_id))
}

async fn send_chunk(transport: &Transport, upload_id: Uuid, chunk: &[u8]) -> Result<()> {
    transport
        .call(Opcode::FileUploadData, json!({ "upload_id": upload_id, "chunk": hex::encode(chunk) }))
        .await?;
    Ok(())
}

/// Abort an in-flight upload (spec §4.8 `CANCEL`).
pub async fn cancel_upload(transport: &Transport, upload_id: Uuid) -> Result<()> {
    transport.call(Opcode::FileUploadCancel, json!({ "upload_id": upload_id })).await?;
    Ok(())
}

fn require_uuid(data: &Value, field: &str) -> Result<Uuid> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))
}
