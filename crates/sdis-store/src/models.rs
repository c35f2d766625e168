//! Row types for the metadata store, mirrored field-for-field from the
//! data model: `User`, `Group`, `Membership`, `Invitation`, `FileNode`,
//! `Notification`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub encrypted_master_key: String,
    pub master_key_salt: String,
    pub recovery_key_encrypted: String,
    pub recovery_key_salt: String,
    pub recovery_key_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub encrypted_group_key: String,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
    pub encrypted_group_key_for_invitee: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}

/// Unified tree node for both files and folders. Exactly one of
/// `owner_id`/`group_id` is set (spec §3 FileNode invariant); callers
/// enforce this at the handler layer, the store just persists it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileNode {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub is_folder: bool,
    pub size: i64,
    pub storage_path: String,
    pub encrypted_file_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationKind {
    Invitation,
    NewFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub reference_id: Uuid,
    pub group_id: Option<Uuid>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A group member row as returned to clients (spec §4.9 "Members list").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMemberSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
}
