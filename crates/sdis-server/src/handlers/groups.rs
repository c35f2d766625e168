//! Group creation, membership, invitations, and key distribution (spec
//! §4.9). The server only ever moves RSA-wrapped group keys around —
//! the plaintext group key is never visible to it.

use serde_json::{json, Value};
use uuid::Uuid;

use sdis_store::models::NotificationKind;

use crate::error::{Result, ServerError};
use crate::router::{require_str, require_uuid};
use crate::state::AppState;

fn current_user(state: &AppState, connection_id: Uuid) -> Result<Uuid> {
    state.sessions.get(connection_id).and_then(|s| s.user_id).ok_or(ServerError::Authentication)
}

pub async fn create(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let name = require_str(&data, "name")?;
    let encrypted_group_key = require_str(&data, "encrypted_group_key")?;
    let group_id = state.store.create_group_with_owner(name, user_id, encrypted_group_key).await?;
    Ok(json!({ "group_id": group_id }))
}

pub async fn list(state: &AppState, connection_id: Uuid) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let groups = state.store.groups_for_user(user_id).await?;
    let invitations = state.store.invitations_for_user(user_id).await?;
    Ok(json!({ "groups": groups, "invitations": invitations }))
}

pub async fn invite(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let group_id = require_uuid(&data, "group_id")?;
    let username = require_str(&data, "username")?;
    let encrypted_group_key = require_str(&data, "encrypted_group_key")?;

    if !state.store.is_member(group_id, user_id).await? {
        return Err(ServerError::Authorization);
    }
    let invitee = state.store.find_user_by_username(username).await.map_err(|_| ServerError::NotFound(username.to_string()))?;
    if state.store.is_member(group_id, invitee.id).await? {
        return Err(ServerError::Conflict(format!("{username} is already a member")));
    }

    let invitation_id = state.store.create_invitation(group_id, user_id, invitee.id, encrypted_group_key).await?;
    let group = state.store.find_group(group_id).await?;
    state
        .store
        .create_notification(invitee.id, NotificationKind::Invitation, invitation_id, Some(group_id), &format!("invited to {}", group.name))
        .await?;
    Ok(json!({ "invitation_id": invitation_id }))
}

pub async fn join(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let invitation_id = require_uuid(&data, "invitation_id")?;
    let accept = data.get("accept").and_then(Value::as_bool).unwrap_or(true);

    if accept {
        let group_id = state.store.accept_invitation(invitation_id, user_id).await?;
        Ok(json!({ "group_id": group_id }))
    } else {
        state.store.reject_invitation(invitation_id, user_id).await?;
        Ok(json!({}))
    }
}

pub async fn leave(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let group_id = require_uuid(&data, "group_id")?;
    if !state.store.is_member(group_id, user_id).await? {
        return Err(ServerError::Authorization);
    }
    state.store.leave_group(group_id, user_id).await?;
    Ok(json!({}))
}

pub async fn key(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let group_id = require_uuid(&data, "group_id")?;
    let membership = state.store.membership(group_id, user_id).await.map_err(|_| ServerError::Authorization)?;
    let members = state.store.group_members(group_id).await?;

    let mut member_keys = Vec::new();
    for summary in &members {
        let user = state.store.find_user_by_id(summary.id).await?;
        member_keys.push(json!({ "user_id": user.id, "public_key": user.public_key }));
    }

    Ok(json!({
        "encrypted_group_key": membership.encrypted_group_key,
        "members": member_keys,
    }))
}

pub async fn members(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let user_id = current_user(state, connection_id)?;
    let group_id = require_uuid(&data, "group_id")?;
    if !state.store.is_member(group_id, user_id).await? {
        return Err(ServerError::Authorization);
    }
    let members = state.store.group_members(group_id).await?;
    Ok(json!({ "members": members }))
}

pub async fn user_public_key(state: &AppState, data: Value) -> Result<Value> {
    let username = require_str(&data, "username")?;
    let user = state.store.find_user_by_username(username).await.map_err(|_| ServerError::NotFound(username.to_string()))?;
    Ok(json!({ "user_id": user.id, "username": user.username, "public_key": user.public_key }))
}
