//! The high-level client: one connection plus whatever key material is
//! unlocked for the signed-in user, composing [`Transport`] with the
//! [`key_hierarchy`], [`upload`], [`download`], and [`group`] modules
//! into a single ergonomic entry point.

use std::path::Path;

use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use sdis_crypto::keys::{SymmetricKey, WrappedKey};
use sdis_crypto::rsa::RsaKeyPair;
use sdis_proto::Opcode;

use crate::config::Config;
use crate::download;
use crate::error::{ClientError, Result};
use crate::group;
use crate::key_hierarchy::{self, PasswordRotation, RegistrationBundle, UnlockedKeys};
use crate::transport::Transport;
use crate::trust::{FileTrustStore, TrustStore};
use crate::upload::{self, UploadTarget, UploadedFile};

/// A connected client. Key material is only populated after a
/// successful login, register-then-login, or recovery; every method
/// that needs it returns [`ClientError::Invalid`] if called while
/// signed out.
pub struct SdisClient {
    config: Config,
    transport: Transport,
    trust: Box<dyn TrustStore + Send>,
    session: Option<SessionState>,
}

struct SessionState {
    user_id: Uuid,
    username: String,
    keys: UnlockedKeys,
}

impl SdisClient {
    /// Connect to the server named in `config`, pinning its identity in
    /// a [`FileTrustStore`] at `config.trust_store_path`.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut trust = FileTrustStore::open(&config.trust_store_path)?;
        let transport = Transport::connect(&config.server_addr, &mut trust, config.timeout).await?;
        Ok(Self { config, transport, trust: Box::new(trust), session: None })
    }

    /// Connect using a caller-supplied trust store, e.g. an in-memory
    /// one for tests that shouldn't touch disk.
    pub async fn connect_with_trust_store(config: Config, mut trust: Box<dyn TrustStore + Send>) -> Result<Self> {
        let transport = Transport::connect(&config.server_addr, trust.as_mut(), config.timeout).await?;
        Ok(Self { config, transport, trust, session: None })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<(Uuid, &str)> {
        self.session.as_ref().map(|s| (s.user_id, s.username.as_str()))
    }

    fn session(&self) -> Result<&SessionState> {
        self.session.as_ref().ok_or_else(|| ClientError::Invalid("not signed in".into()))
    }

    /// The wrap key for a personal operation: the unlocked master key.
    fn master_key(&self) -> Result<&SymmetricKey> {
        Ok(&self.session()?.keys.master_key)
    }

    fn identity(&self) -> Result<&RsaKeyPair> {
        Ok(&self.session()?.keys.identity)
    }

    // ==================== Registration / login ====================

    /// Register a new account, then immediately log in with the same
    /// password so the returned client is ready to use. The recovery
    /// key in the result is shown to the user exactly once; this SDK
    /// never stores it.
    #[instrument(skip(self, password))]
    pub async fn register(&mut self, username: &str, email: &str, password: &str) -> Result<String> {
        let bundle = key_hierarchy::prepare_registration(username, email, password)?;
        self.transport.call(Opcode::Register, registration_request(&bundle)).await?;
        self.login_password(username, password).await?;
        Ok(bundle.recovery_key.0)
    }

    /// Log in with username + password, unlocking the master key and
    /// RSA identity locally.
    #[instrument(skip(self, password))]
    pub async fn login_password(&mut self, username: &str, password: &str) -> Result<()> {
        let response = self
            .transport
            .call(
                Opcode::Auth,
                json!({ "login_type": "password", "username": username, "password": sdis_crypto::password::prehash(password) }),
            )
            .await?;
        self.bind_session_from_unlock(username, password, &response)
    }

    /// Verify an email-sent login code as a second factor, still
    /// unlocking with the account's password (the server never learns
    /// the password or any key material either way).
    #[instrument(skip(self, code, password))]
    pub async fn login_email_code(&mut self, email: &str, code: &str, password: &str) -> Result<()> {
        let response = self
            .transport
            .call(Opcode::Auth, json!({ "login_type": "email", "email": email, "code": code }))
            .await?;
        let username = response
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Invalid("response missing field `username`".into()))?
            .to_string();
        self.bind_session_from_unlock(&username, password, &response)
    }

    fn bind_session_from_unlock(&mut self, username: &str, password: &str, response: &Value) -> Result<()> {
        let user_id = require_uuid(response, "user_id")?;
        let master_key_salt = hex_field(response, "master_key_salt")?;
        let encrypted_master_key = wrapped_field(response, "encrypted_master_key")?;
        let encrypted_private_key = wrapped_field(response, "encrypted_private_key")?;

        let keys = key_hierarchy::unlock_with_password(password, &master_key_salt, &encrypted_master_key, &encrypted_private_key)?;
        self.session = Some(SessionState { user_id, username: username.to_string(), keys });
        Ok(())
    }

    /// Request a login or password-reset verification code be emailed.
    #[instrument(skip(self))]
    pub async fn request_email_code(&self, email: &str, purpose: &str) -> Result<()> {
        self.transport.call(Opcode::EmailCode, json!({ "email": email, "purpose": purpose })).await?;
        Ok(())
    }

    /// Recover an account by its recovery key, choosing a brand new
    /// password and logging back in with it. The master key itself
    /// never changes (spec §4.6).
    #[instrument(skip(self, recovery_key, new_password))]
    pub async fn recover_with_key(&mut self, username: &str, recovery_key: &str, new_password: &str) -> Result<()> {
        let recovery_data = self.transport.call(Opcode::GetRecoveryData, json!({ "username": username })).await?;
        let recovery_key_salt = hex_field(&recovery_data, "recovery_key_salt")?;
        let recovery_key_encrypted = wrapped_field(&recovery_data, "recovery_key_encrypted")?;
        let encrypted_private_key = wrapped_field(&recovery_data, "encrypted_private_key")?;

        let unlocked = key_hierarchy::unlock_with_recovery(recovery_key, &recovery_key_salt, &recovery_key_encrypted, &encrypted_private_key)?;
        let rotation = key_hierarchy::rotate_password(&unlocked.master_key, new_password)?;

        self.transport
            .call(Opcode::PasswordReset, password_reset_request_recovery(username, recovery_key, &rotation))
            .await?;
        self.login_password(username, new_password).await
    }

    /// Change the signed-in user's password, proving ownership with an
    /// emailed code (`request_email_code(email, "reset")` first) rather
    /// than re-entering the current password, and re-wrapping the
    /// already-unlocked master key under the new one without touching
    /// the recovery branch.
    #[instrument(skip(self, code, new_password))]
    pub async fn change_password(&mut self, email: &str, code: &str, new_password: &str) -> Result<()> {
        let (username, rotation) = {
            let session = self.session()?;
            (session.username.clone(), key_hierarchy::rotate_password(&session.keys.master_key, new_password)?)
        };
        self.transport
            .call(
                Opcode::PasswordReset,
                json!({
                    "email": email,
                    "code": code,
                    "new_password_hash": rotation.new_password_hash,
                    "new_encrypted_master_key": rotation.new_encrypted_master_key.ciphertext,
                    "new_master_key_salt": hex::encode(rotation.new_master_key_salt),
                }),
            )
            .await?;
        self.login_password(&username, new_password).await
    }

    // ==================== Files and folders ====================

    #[instrument(skip(self))]
    pub async fn list(&self, parent_id: Option<Uuid>, group_id: Option<Uuid>) -> Result<Value> {
        self.transport.call(Opcode::FileList, json!({ "parent_id": parent_id, "group_id": group_id })).await
    }

    #[instrument(skip(self))]
    pub async fn create_folder(&self, name: &str, parent_id: Option<Uuid>, group_id: Option<Uuid>) -> Result<Uuid> {
        let response = self.transport.call(Opcode::FolderCreate, json!({ "name": name, "parent_id": parent_id, "group_id": group_id })).await?;
        require_uuid(&response, "file_id")
    }

    /// Encrypt and upload a local file. Uses the unlocked master key for
    /// a personal upload, or a fetched group key for a group upload.
    #[instrument(skip(self))]
    pub async fn upload_file(&self, source_path: &Path, target: UploadTarget) -> Result<UploadedFile> {
        let wrap_key = match target.group_id {
            Some(group_id) => group::fetch_group_key(&self.transport, self.identity()?, group_id).await?,
            None => self.master_key()?.clone(),
        };
        upload::upload_file(&self.transport, &wrap_key, source_path, target, self.config.chunk_size).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_upload(&self, upload_id: Uuid) -> Result<()> {
        upload::cancel_upload(&self.transport, upload_id).await
    }

    /// Download and decrypt `file_id` to `dest_path`. `group_id` must
    /// be given when the file belongs to a group, so the right key can
    /// be fetched and unwrapped.
    #[instrument(skip(self))]
    pub async fn download_file(&self, file_id: Uuid, dest_path: &Path, group_id: Option<Uuid>) -> Result<()> {
        let wrap_key = match group_id {
            Some(group_id) => group::fetch_group_key(&self.transport, self.identity()?, group_id).await?,
            None => self.master_key()?.clone(),
        };
        download::download_file(&self.transport, &wrap_key, file_id, dest_path, self.config.chunk_size).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: Uuid) -> Result<()> {
        self.transport.call(Opcode::FileDelete, json!({ "file_id": file_id })).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn rename(&self, file_id: Uuid, name: &str) -> Result<()> {
        self.transport.call(Opcode::FileRename, json!({ "file_id": file_id, "name": name })).await?;
        Ok(())
    }

    // ==================== Groups ====================

    #[instrument(skip(self))]
    pub async fn create_group(&self, name: &str) -> Result<(Uuid, SymmetricKey)> {
        group::create_group(&self.transport, self.identity()?, name).await
    }

    #[instrument(skip(self))]
    pub async fn invite_member(&self, group_id: Uuid, username: &str) -> Result<Uuid> {
        let group_key = group::fetch_group_key(&self.transport, self.identity()?, group_id).await?;
        group::invite_member(&self.transport, group_id, &group_key, username).await
    }

    #[instrument(skip(self))]
    pub async fn respond_to_invitation(&self, invitation_id: Uuid, accept: bool) -> Result<Option<Uuid>> {
        group::respond_to_invitation(&self.transport, invitation_id, accept).await
    }

    #[instrument(skip(self))]
    pub async fn leave_group(&self, group_id: Uuid) -> Result<()> {
        group::leave_group(&self.transport, group_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> Result<Value> {
        group::list_groups(&self.transport).await
    }

    #[instrument(skip(self))]
    pub async fn list_members(&self, group_id: Uuid) -> Result<Value> {
        group::list_members(&self.transport, group_id).await
    }

    // ==================== Notifications / misc ====================

    pub async fn unread_notification_count(&self) -> Result<u64> {
        let response = self.transport.call(Opcode::NotificationCount, json!({})).await?;
        response.get("count").and_then(Value::as_u64).ok_or_else(|| ClientError::Invalid("response missing field `count`".into()))
    }

    pub async fn mark_notifications_read(&self, kind: Option<&str>, group_id: Option<Uuid>) -> Result<()> {
        self.transport.call(Opcode::NotificationRead, json!({ "type": kind, "group_id": group_id })).await?;
        Ok(())
    }

    pub async fn user_public_key(&self, username: &str) -> Result<String> {
        let response = self.transport.call(Opcode::UserPublicKey, json!({ "username": username })).await?;
        response
            .get("public_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Invalid("response missing field `public_key`".into()))
    }

    /// Keep an idle connection alive past the server's session sweep.
    pub async fn heartbeat(&self) -> Result<()> {
        self.transport.heartbeat().await
    }

    /// SHA-256 of the unlocked master key, for confirming two sessions
    /// (e.g. a fresh login after registration) unlocked the same key
    /// without ever exposing the key bytes themselves.
    pub fn master_key_fingerprint(&self) -> Result<String> {
        use sha2::{Digest, Sha256};
        Ok(hex::encode(Sha256::digest(self.master_key()?.as_bytes())))
    }
}

fn registration_request(bundle: &RegistrationBundle) -> Value {
    json!({
        "username": bundle.username,
        "email": bundle.email,
        "password_hash": bundle.password_hash,
        "public_key": bundle.public_key_pem,
        "encrypted_private_key": bundle.encrypted_private_key.ciphertext,
        "encrypted_master_key": bundle.encrypted_master_key.ciphertext,
        "master_key_salt": hex::encode(bundle.master_key_salt),
        "recovery_key_encrypted": bundle.recovery_key_encrypted.ciphertext,
        "recovery_key_salt": hex::encode(bundle.recovery_key_salt),
        "recovery_key_hash": bundle.recovery_key_hash,
    })
}

fn password_reset_request_recovery(username: &str, recovery_key: &str, rotation: &PasswordRotation) -> Value {
    json!({
        "username": username,
        "recovery_key": recovery_key,
        "new_password_hash": rotation.new_password_hash,
        "new_encrypted_master_key": rotation.new_encrypted_master_key.ciphertext,
        "new_master_key_salt": hex::encode(rotation.new_master_key_salt),
    })
}

fn require_uuid(data: &Value, field: &str) -> Result<Uuid> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))
}

fn hex_field(data: &Value, field: &str) -> Result<[u8; 16]> {
    let s = data.get(field).and_then(Value::as_str).ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))?;
    let bytes = hex::decode(s).map_err(|e| ClientError::Invalid(e.to_string()))?;
    bytes.try_into().map_err(|_| ClientError::Invalid(format!("field `{field}` has the wrong length")))
}

fn wrapped_field(data: &Value, field: &str) -> Result<WrappedKey> {
    let s = data.get(field).and_then(Value::as_str).ok_or_else(|| ClientError::Invalid(format!("response missing field `{field}`")))?;
    Ok(WrappedKey { ciphertext: s.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_field_rejects_wrong_length() {
        let value = json!({ "salt": hex::encode([0u8; 8]) });
        assert!(hex_field(&value, "salt").is_err());
    }

    #[test]
    fn hex_field_roundtrips_sixteen_bytes() {
        let salt = [7u8; 16];
        let value = json!({ "salt": hex::encode(salt) });
        assert_eq!(hex_field(&value, "salt").unwrap(), salt);
    }
}
