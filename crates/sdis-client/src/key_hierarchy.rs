//! The client side of the password -> master-key -> private-key ->
//! file-key/group-key wrapping scheme (spec §4.6). Every function here
//! runs entirely client-side; nothing in this module ever sends
//! plaintext key material over the wire.

use sdis_crypto::kdf::{generate_salt, pbkdf2_sha256};
use sdis_crypto::keys::{unwrap_symmetric_key, wrap_symmetric_key, SymmetricKey, WrappedKey};
use sdis_crypto::password;
use sdis_crypto::recovery::{self, RecoveryKey};
use sdis_crypto::rsa::RsaKeyPair;

use crate::error::{ClientError, Result};

/// Everything produced client-side during registration, ready to be
/// sent as the `REGISTER` request body plus the data the caller MUST
/// show the user once (the recovery key) and hold in memory (the master
/// key and RSA keypair) to keep working this session.
pub struct RegistrationBundle {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub public_key_pem: String,
    pub encrypted_private_key: WrappedKey,
    pub encrypted_master_key: WrappedKey,
    pub master_key_salt: [u8; 16],
    pub recovery_key_encrypted: WrappedKey,
    pub recovery_key_salt: [u8; 16],
    pub recovery_key_hash: String,

    /// Shown once; never sent to the server or stored by this SDK.
    pub recovery_key: RecoveryKey,
    /// Kept in memory for the rest of the session.
    pub master_key: SymmetricKey,
    pub identity: RsaKeyPair,
}

/// Build a full registration bundle from a chosen username/email/password
/// (spec §4.6, steps 1-5).
pub fn prepare_registration(username: &str, email: &str, password_plain: &str) -> Result<RegistrationBundle> {
    let master_key = SymmetricKey::generate();

    let master_key_salt = generate_salt();
    let k_p = SymmetricKey::from_bytes(pbkdf2_sha256(password_plain.as_bytes(), &master_key_salt));
    let encrypted_master_key = wrap_symmetric_key(&k_p, &master_key)?;

    let recovery_key = RecoveryKey::generate();
    let recovery_key_salt = generate_salt();
    let k_r = SymmetricKey::from_bytes(pbkdf2_sha256(recovery_key.normalize().as_bytes(), &recovery_key_salt));
    let recovery_key_encrypted = wrap_symmetric_key(&k_r, &master_key)?;
    let recovery_key_hash = sha256_hex(recovery_key.normalize().as_bytes());

    let identity = RsaKeyPair::generate()?;
    let private_key_pem = identity.private_key_pem()?;
    let encrypted_private_key = WrappedKey::new(&sdis_crypto::aes::cbc_encrypt(master_key.as_bytes(), private_key_pem.as_bytes())?);

    let password_hash = password::prehash(password_plain);

    Ok(RegistrationBundle {
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
        public_key_pem: identity.public_key_pem()?,
        encrypted_private_key,
        encrypted_master_key,
        master_key_salt,
        recovery_key_encrypted,
        recovery_key_salt,
        recovery_key_hash,
        recovery_key,
        master_key,
        identity,
    })
}

/// Unlocked key material held for the rest of a session after a
/// successful login or recovery.
pub struct UnlockedKeys {
    pub master_key: SymmetricKey,
    pub identity: RsaKeyPair,
}

/// Unlock by password: derive `K_p`, decrypt the master key, then the
/// private key (spec §4.6 "Unlock by password").
pub fn unlock_with_password(
    password_plain: &str,
    master_key_salt: &[u8],
    encrypted_master_key: &WrappedKey,
    encrypted_private_key: &WrappedKey,
) -> Result<UnlockedKeys> {
    let k_p = SymmetricKey::from_bytes(pbkdf2_sha256(password_plain.as_bytes(), master_key_salt));
    unlock_with_wrap_key(&k_p, encrypted_master_key, encrypted_private_key)
}

/// Unlock by recovery key: symmetrical with the password path, deriving
/// `K_r` from the normalized recovery key instead.
pub fn unlock_with_recovery(
    recovery_key_plain: &str,
    recovery_key_salt: &[u8],
    recovery_key_encrypted: &WrappedKey,
    encrypted_private_key: &WrappedKey,
) -> Result<UnlockedKeys> {
    let normalized = recovery::normalize(recovery_key_plain);
    let k_r = SymmetricKey::from_bytes(pbkdf2_sha256(normalized.as_bytes(), recovery_key_salt));
    unlock_with_wrap_key(&k_r, recovery_key_encrypted, encrypted_private_key)
}

fn unlock_with_wrap_key(wrap_key: &SymmetricKey, encrypted_master_key: &WrappedKey, encrypted_private_key: &WrappedKey) -> Result<UnlockedKeys> {
    let master_key = unwrap_symmetric_key(wrap_key, encrypted_master_key)?;
    let private_key_raw = encrypted_private_key.decode()?;
    let private_key_pem_bytes = sdis_crypto::aes::cbc_decrypt(master_key.as_bytes(), &private_key_raw)?;
    let private_key_pem = String::from_utf8(private_key_pem_bytes).map_err(|_| ClientError::Invalid("decrypted private key is not valid UTF-8".into()))?;
    let identity = RsaKeyPair::from_private_pem(&private_key_pem)?;
    Ok(UnlockedKeys { master_key, identity })
}

/// The fields a `PASSWORD_RESET` request needs after re-wrapping the
/// unchanged master key under a fresh password (spec §4.6 "Password
/// change": the master key itself never changes).
pub struct PasswordRotation {
    pub new_password_hash: String,
    pub new_encrypted_master_key: WrappedKey,
    pub new_master_key_salt: [u8; 16],
}

/// Re-wrap the already-unlocked master key under a brand new password.
pub fn rotate_password(master_key: &SymmetricKey, new_password_plain: &str) -> Result<PasswordRotation> {
    let new_master_key_salt = generate_salt();
    let k_p = SymmetricKey::from_bytes(pbkdf2_sha256(new_password_plain.as_bytes(), &new_master_key_salt));
    let new_encrypted_master_key = wrap_symmetric_key(&k_p, master_key)?;
    Ok(PasswordRotation {
        new_password_hash: password::prehash(new_password_plain),
        new_encrypted_master_key,
        new_master_key_salt,
    })
}

/// Wrap a fresh random file key under the owning namespace's wrap key:
/// the master key for a personal file, the group key for a group file
/// (spec §4.6 "File upload key flow").
pub fn wrap_file_key(wrap_key: &SymmetricKey) -> Result<(SymmetricKey, WrappedKey)> {
    let file_key = SymmetricKey::generate();
    let wrapped = wrap_symmetric_key(wrap_key, &file_key)?;
    Ok((file_key, wrapped))
}

/// Unwrap a file's key for download/decrypt.
pub fn unwrap_file_key(wrap_key: &SymmetricKey, encrypted_file_key: &WrappedKey) -> Result<SymmetricKey> {
    Ok(unwrap_symmetric_key(wrap_key, encrypted_file_key)?)
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_unlock_roundtrips_master_and_private_key() {
        let bundle = prepare_registration("alice", "alice@example.com", "correct horse battery staple").unwrap();
        let unlocked = unlock_with_password(
            "correct horse battery staple",
            &bundle.master_key_salt,
            &bundle.encrypted_master_key,
            &bundle.encrypted_private_key,
        )
        .unwrap();
        assert_eq!(unlocked.master_key.as_bytes(), bundle.master_key.as_bytes());
    }

    #[test]
    fn recovery_unlock_yields_same_master_key_as_password_unlock() {
        let bundle = prepare_registration("bob", "bob@example.com", "hunter2-but-longer").unwrap();
        let via_recovery = unlock_with_recovery(
            &bundle.recovery_key.0,
            &bundle.recovery_key_salt,
            &bundle.recovery_key_encrypted,
            &bundle.encrypted_private_key,
        )
        .unwrap();
        assert_eq!(via_recovery.master_key.as_bytes(), bundle.master_key.as_bytes());
    }

    #[test]
    fn password_rotation_is_unaffected_by_recovery_branch() {
        let bundle = prepare_registration("carol", "carol@example.com", "old-password-1").unwrap();
        let rotation = rotate_password(&bundle.master_key, "new-password-2").unwrap();

        let via_new_password = unlock_with_password(
            "new-password-2",
            &rotation.new_master_key_salt,
            &rotation.new_encrypted_master_key,
            &bundle.encrypted_private_key,
        )
        .unwrap();
        assert_eq!(via_new_password.master_key.as_bytes(), bundle.master_key.as_bytes());

        let via_recovery = unlock_with_recovery(
            &bundle.recovery_key.0,
            &bundle.recovery_key_salt,
            &bundle.recovery_key_encrypted,
            &bundle.encrypted_private_key,
        )
        .unwrap();
        assert_eq!(via_recovery.master_key.as_bytes(), bundle.master_key.as_bytes());
    }

    #[test]
    fn file_key_wrap_unwrap_roundtrip() {
        let master_key = SymmetricKey::generate();
        let (file_key, wrapped) = wrap_file_key(&master_key).unwrap();
        let unwrapped = unwrap_file_key(&master_key, &wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), file_key.as_bytes());
    }
}
