//! Client-side download: drives the two-phase `FILE_DOWNLOAD_*` state
//! machine (spec §4.8), then decrypts the reassembled blob with whichever
//! scheme its version byte names — CBC in memory, or CTR streamed
//! straight to the output path as chunks arrive.

use std::path::Path;

use base64::Engine;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use sdis_crypto::keys::{SymmetricKey, WrappedKey};
use sdis_proto::blob::{self, StreamingDecryptor};
use sdis_proto::Opcode;

use crate::error::{ClientError, Result};
use crate::key_hierarchy::unwrap_file_key;
use crate::transport::Transport;

/// Download `file_id`, unwrap its file key under `wrap_key`, decrypt,
/// and write the plaintext to `dest_path`.
pub async fn download_file(
    transport: &Transport,
    wrap_key: &SymmetricKey,
    file_id: Uuid,
    dest_path: &Path,
    chunk_size: usize,
) -> Result<()> {
    let request = transport.call(Opcode::FileDownloadRequest, json!({ "file_id": file_id })).await?;
    let download_id = require_uuid(&request, "download_id")?;
    let encrypted_file_key_hex = request
        .get("encrypted_file_key")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Invalid("response missing field `encrypted_file_key`".into()))?;
    let encrypted_file_key = WrappedKey { ciphertext: encrypted_file_key_hex.to_string() };
    let file_key = unwrap_file_key(wrap_key, &encrypted_file_key)?;

    let mut decryptor = StreamingDecryptor::new(*file_key.as_bytes());
    let mut cbc_buffer = Vec::new();
    let mut streaming_mode: Option<bool> = None;
    let mut out = tokio::fs::File::create(dest_path).await?;

    loop {
        let response = transport
            .call(Opcode::FileDownloadData, json!({ "download_id": download_id, "chunk_size": chunk_size }))
            .await?;
        let chunk_b64 = response.get("data").and_then(Value::as_str).unwrap_or("");
        let chunk = base64::engine::general_purpose::STANDARD.decode(chunk_b64).map_err(|e| ClientError::Invalid(e.to_string()))?;
        let is_complete = response.get("is_complete").and_then(Value::as_bool).unwrap_or(false);

        let streaming = *streaming_mode.get_or_insert_with(|| chunk.first().copied() == Some(1));
        if streaming {
            let plaintext = decryptor.decrypt_chunk(chunk)?;
            if !plaintext.is_empty() {
                out.write_all(&plaintext).await?;
            }
        } else {
            cbc_buffer.extend_from_slice(&chunk);
        }

        if is_complete {
            break;
        }
    }

    if streaming_mode == Some(false) {
        let plaintext = blob::decrypt_whole_cbc(file_key.as_bytes(), &cbc_buffer)?;
        out.write_all(&plaintext).await?;
    }
    out.flush().await?;
    Ok(())
}

fn require_uuid(data: &Value, field: &str) -> Result<Uuid> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_uuid_rejects_missing_field() {
        let value = json!({});
        assert!(require_uuid(&value, "download_id").is_err());
    }
}
