//! `MetadataStore`: the transactional boundary over Postgres (spec
//! §4.10). Every multi-row mutation the spec calls out as atomic —
//! group creation, invitation acceptance, recursive folder deletion —
//! runs inside a single `sqlx` transaction.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{
    FileNode, Group, GroupMemberSummary, Invitation, InvitationStatus, Membership, MembershipRole, Notification,
    NotificationKind, User,
};

#[derive(Clone)]
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Users ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        public_key: &str,
        encrypted_private_key: &str,
        encrypted_master_key: &str,
        master_key_salt: &str,
        recovery_key_encrypted: &str,
        recovery_key_salt: &str,
        recovery_key_hash: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, password_hash, public_key,
                encrypted_private_key, encrypted_master_key, master_key_salt,
                recovery_key_encrypted, recovery_key_salt, recovery_key_hash, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(public_key)
        .bind(encrypted_private_key)
        .bind(encrypted_master_key)
        .bind(master_key_salt)
        .bind(recovery_key_encrypted)
        .bind(recovery_key_salt)
        .bind(recovery_key_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(email.to_string()))
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    /// Password change: master key stays the same, only its wrap changes
    /// (spec §4.6). Recovery fields are left untouched.
    pub async fn rotate_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
        new_encrypted_master_key: &str,
        new_master_key_salt: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, encrypted_master_key = $2, master_key_salt = $3 WHERE id = $4",
        )
        .bind(new_password_hash)
        .bind(new_encrypted_master_key)
        .bind(new_master_key_salt)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Groups ---------------------------------------------------------

    /// Create a group and insert the owner's membership row in one
    /// transaction (spec §4.10).
    pub async fn create_group_with_owner(&self, name: &str, owner_id: Uuid, encrypted_group_key: &str) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let group_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query("INSERT INTO groups (id, name, owner_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(group_id)
            .bind(name)
            .bind(owner_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO memberships (group_id, user_id, encrypted_group_key, role, joined_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(group_id)
        .bind(owner_id)
        .bind(encrypted_group_key)
        .bind(MembershipRole::Owner)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(group_id)
    }

    pub async fn find_group(&self, group_id: Uuid) -> Result<Group> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::GroupNotFound(group_id))
    }

    pub async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>> {
        Ok(sqlx::query_as::<_, Group>(
            "SELECT g.* FROM groups g JOIN memberships m ON m.group_id = g.id WHERE m.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn is_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM memberships WHERE group_id = $1 AND user_id = $2")
                .bind(group_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Membership> {
        sqlx::query_as::<_, Membership>("SELECT * FROM memberships WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::GroupNotFound(group_id))
    }

    pub async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMemberSummary>> {
        Ok(sqlx::query_as::<_, GroupMemberSummary>(
            r#"
            SELECT u.id, u.username, u.email, m.role, m.joined_at
            FROM memberships m JOIN users u ON u.id = m.user_id
            WHERE m.group_id = $1
            ORDER BY u.username ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Leave: owner leaving dissolves the group (cascade via FK
    /// `ON DELETE CASCADE` on files/memberships/invitations); anyone
    /// else leaving deletes only their own membership row (spec §4.9).
    pub async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let group = self.find_group(group_id).await?;
        if group.owner_id == user_id {
            sqlx::query("DELETE FROM groups WHERE id = $1").bind(group_id).execute(&self.pool).await?;
        } else {
            sqlx::query("DELETE FROM memberships WHERE group_id = $1 AND user_id = $2")
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // ---- Invitations -----------------------------------------------------

    pub async fn create_invitation(
        &self,
        group_id: Uuid,
        inviter_id: Uuid,
        invitee_id: Uuid,
        encrypted_group_key_for_invitee: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO invitations (id, group_id, inviter_id, invitee_id, encrypted_group_key_for_invitee, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(group_id)
        .bind(inviter_id)
        .bind(invitee_id)
        .bind(encrypted_group_key_for_invitee)
        .bind(InvitationStatus::Pending)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn invitations_for_user(&self, invitee_id: Uuid) -> Result<Vec<Invitation>> {
        Ok(sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE invitee_id = $1 AND status = 'pending'",
        )
        .bind(invitee_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Accept: read the pending invitation, insert the membership using
    /// its stored wrapped key, and flip status, all in one transaction
    /// (spec §4.9, §4.10).
    pub async fn accept_invitation(&self, invitation_id: Uuid, invitee_id: Uuid) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let invitation = sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE id = $1 AND invitee_id = $2 AND status = 'pending' FOR UPDATE",
        )
        .bind(invitation_id)
        .bind(invitee_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::InvitationNotPending(invitation_id))?;

        sqlx::query(
            "INSERT INTO memberships (group_id, user_id, encrypted_group_key, role, joined_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(invitation.group_id)
        .bind(invitee_id)
        .bind(&invitation.encrypted_group_key_for_invitee)
        .bind(MembershipRole::Member)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE invitations SET status = 'accepted' WHERE id = $1")
            .bind(invitation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(invitation.group_id)
    }

    pub async fn reject_invitation(&self, invitation_id: Uuid, invitee_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'rejected' WHERE id = $1 AND invitee_id = $2 AND status = 'pending'",
        )
        .bind(invitation_id)
        .bind(invitee_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvitationNotPending(invitation_id));
        }
        Ok(())
    }

    // ---- File tree --------------------------------------------------------

    /// Caller supplies `id` (rather than the store generating one)
    /// because upload handling needs the file id to derive the blob's
    /// `storage_path` before the row can be inserted.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_file_node(
        &self,
        id: Uuid,
        owner_id: Option<Uuid>,
        group_id: Option<Uuid>,
        parent_id: Option<Uuid>,
        name: &str,
        is_folder: bool,
        size: i64,
        storage_path: &str,
        encrypted_file_key: &str,
    ) -> Result<Uuid> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO file_nodes (
                id, owner_id, group_id, parent_id, name, is_folder,
                size, storage_path, encrypted_file_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(group_id)
        .bind(parent_id)
        .bind(name)
        .bind(is_folder)
        .bind(size)
        .bind(storage_path)
        .bind(encrypted_file_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_file_node(&self, id: Uuid) -> Result<FileNode> {
        sqlx::query_as::<_, FileNode>("SELECT * FROM file_nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::FileNodeNotFound(id))
    }

    /// Folders first, then files, each group name-ascending (spec §4.10
    /// "File-list ordering").
    pub async fn list_children(&self, parent_id: Option<Uuid>, owner_id: Option<Uuid>, group_id: Option<Uuid>) -> Result<Vec<FileNode>> {
        Ok(sqlx::query_as::<_, FileNode>(
            r#"
            SELECT * FROM file_nodes
            WHERE parent_id IS NOT DISTINCT FROM $1
              AND owner_id IS NOT DISTINCT FROM $2
              AND group_id IS NOT DISTINCT FROM $3
            ORDER BY is_folder DESC, name ASC
            "#,
        )
        .bind(parent_id)
        .bind(owner_id)
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn rename_file_node(&self, id: Uuid, new_name: &str) -> Result<()> {
        sqlx::query("UPDATE file_nodes SET name = $1, updated_at = $2 WHERE id = $3")
            .bind(new_name)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Recursively delete a folder and every descendant, returning the
    /// `storage_path` of each leaf file so the caller can delete the
    /// corresponding blobs. Iterative (stack-safe) as required by spec
    /// §4.10/§9 — no recursive function calls, an explicit work queue.
    pub async fn delete_folder_recursive(&self, root_id: Uuid) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut blob_paths = Vec::new();
        let mut stack = vec![root_id];

        // Gather every descendant's storage path with reads only, top
        // down. `file_nodes.parent_id` has `ON DELETE CASCADE`, so
        // deleting a node as we went would remove its subtree out from
        // under the next iteration's lookup; collect everything first,
        // then delete just the root and let the cascade take the rest.
        while let Some(node_id) = stack.pop() {
            let node: FileNode = sqlx::query_as("SELECT * FROM file_nodes WHERE id = $1")
                .bind(node_id)
                .fetch_one(&mut *tx)
                .await?;
            if node.is_folder {
                let children: Vec<FileNode> = sqlx::query_as("SELECT * FROM file_nodes WHERE parent_id = $1")
                    .bind(node_id)
                    .fetch_all(&mut *tx)
                    .await?;
                stack.extend(children.into_iter().map(|child| child.id));
            } else {
                blob_paths.push(node.storage_path.clone());
            }
        }

        sqlx::query("DELETE FROM file_nodes WHERE id = $1").bind(root_id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(blob_paths)
    }

    pub async fn delete_file(&self, id: Uuid) -> Result<String> {
        let node = self.find_file_node(id).await?;
        sqlx::query("DELETE FROM file_nodes WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(node.storage_path)
    }

    // ---- Notifications -----------------------------------------------------

    pub async fn create_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        reference_id: Uuid,
        group_id: Option<Uuid>,
        message: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, reference_id, group_id, message, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, false, $7)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(kind)
        .bind(reference_id)
        .bind(group_id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn unread_notification_count(&self, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = false")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn mark_notifications_read(&self, user_id: Uuid, kind: Option<NotificationKind>, group_id: Option<Uuid>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications SET read = true
            WHERE user_id = $1
              AND ($2::text IS NULL OR kind = $2)
              AND group_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id)
        .bind(kind.map(|k| match k {
            NotificationKind::Invitation => "invitation",
            NotificationKind::NewFile => "new_file",
        }))
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
