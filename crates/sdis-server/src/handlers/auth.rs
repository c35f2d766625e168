//! Registration, login, email verification codes, and password reset
//! (spec §4.6, §6). The server never sees a raw password — only the
//! client-side SHA-256 prehash, bcrypt-verified at rest.

use serde_json::{json, Value};
use uuid::Uuid;

use sdis_crypto::password;

use crate::email::Purpose;
use crate::error::{Result, ServerError};
use crate::router::require_str;
use crate::state::AppState;

pub async fn register(state: &AppState, data: Value) -> Result<Value> {
    let username = require_str(&data, "username")?;
    let email = require_str(&data, "email")?;

    if state.store.find_user_by_username(username).await.is_ok() {
        return Err(ServerError::Conflict(format!("username {username} already taken")));
    }
    if state.store.find_user_by_email(email).await.is_ok() {
        return Err(ServerError::Conflict(format!("email {email} already registered")));
    }

    let password_hash = password::bcrypt_hash(require_str(&data, "password_hash")?)?;

    let user_id = state
        .store
        .create_user(
            username,
            email,
            &password_hash,
            require_str(&data, "public_key")?,
            require_str(&data, "encrypted_private_key")?,
            require_str(&data, "encrypted_master_key")?,
            require_str(&data, "master_key_salt")?,
            require_str(&data, "recovery_key_encrypted")?,
            require_str(&data, "recovery_key_salt")?,
            require_str(&data, "recovery_key_hash")?,
        )
        .await?;

    Ok(json!({ "user_id": user_id }))
}

pub async fn authenticate(state: &AppState, connection_id: Uuid, data: Value) -> Result<Value> {
    let login_type = require_str(&data, "login_type")?;
    let user = match login_type {
        "password" => {
            let username = require_str(&data, "username")?;
            let submitted = require_str(&data, "password")?;
            let user = state.store.find_user_by_username(username).await.map_err(|_| ServerError::Authentication)?;
            if !password::bcrypt_verify(submitted, &user.password_hash).unwrap_or(false) {
                return Err(ServerError::Authentication);
            }
            user
        }
        "email" => {
            let email = require_str(&data, "email")?;
            let code = require_str(&data, "code")?;
            if !state.email.verify_code(email, Purpose::Login, code) {
                return Err(ServerError::Authentication);
            }
            state.store.find_user_by_email(email).await.map_err(|_| ServerError::Authentication)?
        }
        other => return Err(ServerError::NotFound(format!("unknown login_type `{other}`"))),
    };

    state.sessions.bind_user(connection_id, user.id, user.username.clone());
    Ok(json!({
        "user_id": user.id,
        "username": user.username,
        "email": user.email,
        "public_key": user.public_key,
        "encrypted_private_key": user.encrypted_private_key,
        "encrypted_master_key": user.encrypted_master_key,
        "master_key_salt": user.master_key_salt,
    }))
}

pub async fn email_code(state: &AppState, data: Value) -> Result<Value> {
    let email = require_str(&data, "email")?;
    let purpose = match require_str(&data, "purpose")? {
        "login" => Purpose::Login,
        "reset" => Purpose::Reset,
        other => return Err(ServerError::NotFound(format!("unknown purpose `{other}`"))),
    };
    state.email.request_code(email, purpose);
    Ok(json!({ "message": "verification code sent" }))
}

pub async fn password_reset(state: &AppState, data: Value) -> Result<Value> {
    let new_password_hash = password::bcrypt_hash(require_str(&data, "new_password_hash")?)?;
    let new_encrypted_master_key = require_str(&data, "new_encrypted_master_key")?;
    let new_master_key_salt = require_str(&data, "new_master_key_salt")?;

    let user = if let (Ok(username), Ok(recovery_key)) = (require_str(&data, "username"), require_str(&data, "recovery_key")) {
        let user = state.store.find_user_by_username(username).await.map_err(|_| ServerError::Authentication)?;
        let normalized = sdis_crypto::recovery::normalize(recovery_key);
        use sha2::{Digest, Sha256};
        let hash = hex::encode(Sha256::digest(normalized.as_bytes()));
        if hash != user.recovery_key_hash {
            return Err(ServerError::Authentication);
        }
        user
    } else {
        let email = require_str(&data, "email")?;
        let code = require_str(&data, "code")?;
        if !state.email.verify_code(email, Purpose::Reset, code) {
            return Err(ServerError::Authentication);
        }
        state.store.find_user_by_email(email).await.map_err(|_| ServerError::Authentication)?
    };

    state
        .store
        .rotate_password(user.id, &new_password_hash, new_encrypted_master_key, new_master_key_salt)
        .await?;
    Ok(json!({}))
}

pub async fn get_recovery_data(state: &AppState, data: Value) -> Result<Value> {
    let username = require_str(&data, "username")?;
    let user = state.store.find_user_by_username(username).await.map_err(|_| ServerError::Authentication)?;
    Ok(json!({
        "recovery_key_encrypted": user.recovery_key_encrypted,
        "recovery_key_salt": user.recovery_key_salt,
        "recovery_key_hash": user.recovery_key_hash,
        "encrypted_private_key": user.encrypted_private_key,
    }))
}
