//! File and folder operations, and the upload/download engines' frame
//! handlers (spec §4.7, §4.8).

use base64::Engine;
use serde_json::{json, Value};
use uuid::Uuid;

use sdis_store::models::{FileNode, NotificationKind};

use crate::error::{Result, ServerError};
use crate::router::{require_str, require_uuid};
use crate::state::AppState;
use crate::upload;

fn optional_uuid(data: &Value, field: &str) -> Option<Uuid> {
    data.get(field).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

fn current_user(state: &AppState, connection_id: Uuid) -> Result<Uuid> {
    state.sessions.get(connection_id).and_then(|s| s.user_id).ok_or(ServerError::Authentication)
}

/// Authorize access to an existing node: personal nodes require
/// ownership, group nodes require membership (spec §4.7).
async fn authorize_node(state: &AppState, user_id: Uuid, node: &FileNode) -> Result<()> {
    match (node.owner_id, node.group_id) {
        (Some(owner_id), None) if owner_id == user_id => Ok(()),
        (None, Some(group_id)) if state.store.is_member(group_id, user_id).await? => Ok(()),
        _ => Err(ServerError::Authorization),
    }
}

pub async fn list(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let parent_id = optional_uuid(&data, "parent_id");
    let group_id = optional_uuid(&data, "group_id");

    let children = if let Some(group_id) = group_id {
        if !state.store.is_member(group_id, user_id).await? {
            return Err(ServerError::Authorization);
        }
        state.store.list_children(parent_id, None, Some(group_id)).await?
    } else {
        if let Some(parent_id) = parent_id {
            let parent = state.store.find_file_node(parent_id).await?;
            authorize_node(state, user_id, &parent).await?;
        }
        state.store.list_children(parent_id, Some(user_id), None).await?
    };

    Ok(json!({ "files": children }))
}

pub async fn folder_create(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let name = require_str(&data, "name")?;
    let parent_id = optional_uuid(&data, "parent_id");
    let group_id = optional_uuid(&data, "group_id");

    let (owner_id, group_id) = resolve_namespace(state, user_id, group_id, parent_id).await?;

    let id = Uuid::new_v4();
    state
        .store
        .create_file_node(id, owner_id, group_id, parent_id, name, true, 0, "", "")
        .await?;
    Ok(json!({ "file_id": id }))
}

/// Resolve which namespace a new node belongs to: explicit `group_id`
/// wins (membership required); otherwise inherit from the parent folder
/// if one was given; otherwise it's a personal-root node.
async fn resolve_namespace(
    state: &AppState,
    user_id: Uuid,
    group_id: Option<Uuid>,
    parent_id: Option<Uuid>,
) -> Result<(Option<Uuid>, Option<Uuid>)> {
    if let Some(group_id) = group_id {
        if !state.store.is_member(group_id, user_id).await? {
            return Err(ServerError::Authorization);
        }
        return Ok((None, Some(group_id)));
    }
    if let Some(parent_id) = parent_id {
        let parent = state.store.find_file_node(parent_id).await?;
        authorize_node(state, user_id, &parent).await?;
        return Ok((parent.owner_id, parent.group_id));
    }
    Ok((Some(user_id), None))
}

pub async fn upload_start(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let filename = require_str(&data, "filename")?;
    let size = data.get("size").and_then(Value::as_u64).ok_or_else(|| ServerError::NotFound("missing field `size`".into()))?;
    let encrypted_file_key = require_str(&data, "encrypted_file_key")?;
    let parent_id = optional_uuid(&data, "parent_id");
    let group_id = optional_uuid(&data, "group_id");

    let (owner_id, group_id) = resolve_namespace(state, user_id, group_id, parent_id).await?;

    let file_id = Uuid::new_v4();
    let storage_path = upload::storage_path(state.blob_dir(), file_id);
    state
        .store
        .create_file_node(
            file_id,
            owner_id,
            group_id,
            parent_id,
            filename,
            false,
            size as i64,
            &storage_path.to_string_lossy(),
            encrypted_file_key,
        )
        .await?;

    let upload_id = state.uploads.start(file_id, size).await?;
    state.sessions.track_upload(connection_id, upload_id);
    Ok(json!({ "upload_id": upload_id, "file_id": file_id }))
}

pub async fn upload_data(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let _ = current_user(state, connection_id)?;
    let upload_id = require_uuid(&data, "upload_id")?;
    let chunk_hex = require_str(&data, "chunk")?;
    let chunk = hex::decode(chunk_hex).map_err(|_| ServerError::NotFound("invalid `chunk` hex".into()))?;
    let received = state.uploads.write_chunk(upload_id, &chunk).await?;
    Ok(json!({ "received": received }))
}

pub async fn upload_end(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let upload_id = require_uuid(&data, "upload_id")?;
    let (file_id, _path, _received) = state.uploads.finish(upload_id).await?;
    state.sessions.untrack_upload(connection_id, upload_id);

    let node = state.store.find_file_node(file_id).await?;
    if let Some(group_id) = node.group_id {
        let members = state.store.group_members(group_id).await?;
        for member in members.iter().filter(|m| m.id != user_id) {
            state
                .store
                .create_notification(member.id, NotificationKind::NewFile, file_id, Some(group_id), &format!("new file: {}", node.name))
                .await?;
        }
    }
    Ok(json!({}))
}

pub async fn upload_cancel(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let _ = current_user(state, connection_id)?;
    let upload_id = require_uuid(&data, "upload_id")?;
    let file_id = state.uploads.cancel(upload_id).await?;
    state.sessions.untrack_upload(connection_id, upload_id);
    let _ = state.store.delete_file(file_id).await;
    Ok(json!({}))
}

pub async fn download_request(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let file_id = require_uuid(&data, "file_id")?;
    let node = state.store.find_file_node(file_id).await?;
    authorize_node(state, user_id, &node).await?;

    let download_id = state.downloads.open(file_id, &std::path::PathBuf::from(&node.storage_path), node.size as u64).await?;
    state.sessions.track_download(connection_id, download_id);
    Ok(json!({
        "download_id": download_id,
        "filename": node.name,
        "size": node.size,
        "encrypted_file_key": node.encrypted_file_key,
    }))
}

pub async fn download_data(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let _ = current_user(state, connection_id)?;
    let download_id = require_uuid(&data, "download_id")?;
    let chunk_size = data.get("chunk_size").and_then(Value::as_u64).unwrap_or(64 * 1024) as u32;
    let (offset, chunk, is_complete) = state.downloads.read_chunk(download_id, chunk_size).await?;
    if is_complete {
        state.sessions.untrack_download(connection_id, download_id);
    }
    Ok(json!({
        "offset": offset,
        "chunk_size": chunk.len(),
        "is_complete": is_complete,
        "data": base64::engine::general_purpose::STANDARD.encode(&chunk),
    }))
}

pub async fn delete(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let file_id = require_uuid(&data, "file_id")?;
    let node = state.store.find_file_node(file_id).await?;
    authorize_node(state, user_id, &node).await?;

    if node.is_folder {
        let blob_paths = state.store.delete_folder_recursive(file_id).await?;
        for path in blob_paths {
            let _ = tokio::fs::remove_file(path).await;
        }
    } else {
        let path = state.store.delete_file(file_id).await?;
        let _ = tokio::fs::remove_file(path).await;
    }
    Ok(json!({}))
}

pub async fn rename(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let file_id = require_uuid(&data, "file_id")?;
    let new_name = require_str(&data, "name")?;
    let node = state.store.find_file_node(file_id).await?;
    authorize_node(state, user_id, &node).await?;
    state.store.rename_file_node(file_id, new_name).await?;
    Ok(json!({}))
}
