//! Client-side group and invitation helpers (spec §4.9). The server only
//! ever moves RSA-wrapped group keys; unwrapping and rewrapping for new
//! members happens here.

use serde_json::{json, Value};
use uuid::Uuid;

use sdis_crypto::keys::SymmetricKey;
use sdis_crypto::rsa::{oaep_decrypt, oaep_encrypt, public_key_from_pem, RsaKeyPair};
use sdis_proto::Opcode;

use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Create a group, wrapping a fresh group key under the caller's own
/// public key as the owner's membership wrapper.
pub async fn create_group(transport: &Transport, identity: &RsaKeyPair, name: &str) -> Result<(Uuid, SymmetricKey)> {
    let group_key = SymmetricKey::generate();
    let wrapped_for_self = oaep_encrypt(&identity.public, group_key.as_bytes())?;

    let response = transport
        .call(
            Opcode::GroupCreate,
            json!({ "name": name, "encrypted_group_key": hex::encode(&wrapped_for_self) }),
        )
        .await?;
    let group_id = require_uuid(&response, "group_id")?;
    Ok((group_id, group_key))
}

/// Fetch the caller's wrapped group key plus every member's public key,
/// ready to invite a new one.
pub async fn fetch_group_key(transport: &Transport, identity: &RsaKeyPair, group_id: Uuid) -> Result<SymmetricKey> {
    let response = transport.call(Opcode::GroupKey, json!({ "group_id": group_id })).await?;
    let wrapped_hex = response
        .get("encrypted_group_key")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Invalid("response missing field `encrypted_group_key`".into()))?;
    let wrapped = hex::decode(wrapped_hex).map_err(|e| ClientError::Invalid(e.to_string()))?;
    let raw = oaep_decrypt(&identity.private, &wrapped)?;
    let bytes: [u8; 32] = raw.try_into().map_err(|_| ClientError::Invalid("unwrapped group key has wrong length".into()))?;
    Ok(SymmetricKey::from_bytes(bytes))
}

/// Invite `username` into `group_id`, rewrapping the group key under
/// their public key (spec §4.6 "Inviting user X").
pub async fn invite_member(transport: &Transport, group_id: Uuid, group_key: &SymmetricKey, username: &str) -> Result<Uuid> {
    let invitee = transport.call(Opcode::UserPublicKey, json!({ "username": username })).await?;
    let public_key_pem = invitee
        .get("public_key")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Invalid("response missing field `public_key`".into()))?;
    let public_key = public_key_from_pem(public_key_pem)?;
    let wrapped_for_invitee = oaep_encrypt(&public_key, group_key.as_bytes())?;

    let response = transport
        .call(
            Opcode::GroupInvite,
            json!({
                "group_id": group_id,
                "username": username,
                "encrypted_group_key": hex::encode(&wrapped_for_invitee),
            }),
        )
        .await?;
    require_uuid(&response, "invitation_id")
}

/// Accept or reject a pending invitation (`accept = false` rejects).
pub async fn respond_to_invitation(transport: &Transport, invitation_id: Uuid, accept: bool) -> Result<Option<Uuid>> {
    let response = transport
        .call(Opcode::GroupJoin, json!({ "invitation_id": invitation_id, "accept": accept }))
        .await?;
    if accept {
        Ok(Some(require_uuid(&response, "group_id")?))
    } else {
        Ok(None)
    }
}

/// Leave a group (owner leaving dissolves it, spec §4.9).
pub async fn leave_group(transport: &Transport, group_id: Uuid) -> Result<()> {
    transport.call(Opcode::GroupLeave, json!({ "group_id": group_id })).await?;
    Ok(())
}

/// List the caller's groups and pending invitations.
pub async fn list_groups(transport: &Transport) -> Result<Value> {
    transport.call(Opcode::GroupList, json!({})).await
}

/// List a group's members.
pub async fn list_members(transport: &Transport, group_id: Uuid) -> Result<Value> {
    transport.call(Opcode::GroupMembers, json!({ "group_id": group_id })).await
}

fn require_uuid(data: &Value, field: &str) -> Result<Uuid> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))
}
