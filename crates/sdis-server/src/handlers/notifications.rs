//! Unread-count and mark-as-read operations (spec §6 `NOTIFICATION_COUNT`/`NOTIFICATION_READ`).

use serde_json::{json, Value};
use uuid::Uuid;

use sdis_store::models::NotificationKind;

use crate::error::{Result, ServerError};
use crate::state::AppState;

fn current_user(state: &AppState, connection_id: Uuid) -> Result<Uuid> {
    state.sessions.get(connection_id).and_then(|s| s.user_id).ok_or(ServerError::Authentication)
}

pub async fn count(state: &AppState, connection_id: Uuid) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let count = state.store.unread_notification_count(user_id).await?;
    Ok(json!({ "count": count }))
}

pub async fn mark_read(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let kind = match data.get("type").and_then(Value::as_str) {
        Some("invitation") => Some(NotificationKind::Invitation),
        Some("new_file") => Some(NotificationKind::NewFile),
        _ => None,
    };
    let group_id = data.get("group_id").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok());
    state.store.mark_notifications_read(user_id, kind, group_id).await?;
    Ok(json!({}))
}
