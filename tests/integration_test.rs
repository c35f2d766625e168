//! End-to-end account and file scenarios (spec §8 S1-S4), run against a
//! real `sdis-server` over loopback TCP.

mod common;

use sdis_client::UploadTarget;

fn target(filename: &str) -> UploadTarget {
    UploadTarget { filename: filename.to_string(), parent_id: None, group_id: None }
}

/// S1: register, disconnect, reconnect, login with the same password,
/// and confirm the reconnected client unlocks the same master key.
#[tokio::test]
async fn s1_register_then_login_yields_same_master_key() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut registering = common::connect_client(&addr).await;
    registering.register("alice", "alice@x.example", "Passw0rd!").await.unwrap();
    let original_fingerprint = registering.master_key_fingerprint().unwrap();

    let mut logging_in = common::connect_client(&addr).await;
    logging_in.login_password("alice", "Passw0rd!").await.unwrap();
    assert_eq!(logging_in.master_key_fingerprint().unwrap(), original_fingerprint);
}

/// S2: recover with the saved recovery key, pick a new password; the
/// old password stops working and the recovery key still works again
/// afterwards.
#[tokio::test]
async fn s2_recovery_reset_rotates_password_not_master_key() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut registering = common::connect_client(&addr).await;
    let recovery_key = registering.register("carol", "carol@x.example", "Passw0rd!").await.unwrap();

    let mut recovering = common::connect_client(&addr).await;
    recovering.recover_with_key("carol", &recovery_key, "NewPass1!").await.unwrap();

    let mut old_password = common::connect_client(&addr).await;
    assert!(old_password.login_password("carol", "Passw0rd!").await.is_err());

    let mut new_password = common::connect_client(&addr).await;
    new_password.login_password("carol", "NewPass1!").await.unwrap();

    // The recovery key is immutable; it resets the account again.
    let mut recovering_again = common::connect_client(&addr).await;
    recovering_again.recover_with_key("carol", &recovery_key, "ThirdPass1!").await.unwrap();
}

/// S3: a 16-byte personal file round-trips exactly. Its CBC blob is
/// version byte + 16-byte IV + PKCS7-padded ciphertext; a block-aligned
/// 16-byte plaintext pads out to a full extra block, so the blob is
/// 1 + 16 + 32 = 49 bytes on disk, not 33.
#[tokio::test]
async fn s3_personal_roundtrip_small_file() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut dave = common::connect_client(&addr).await;
    dave.register("dave", "dave@x.example", "Passw0rd!").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tiny.bin");
    tokio::fs::write(&source, b"0123456789abcdef").await.unwrap();

    let uploaded = dave.upload_file(&source, target("tiny.bin")).await.unwrap();

    let listing = dave.list(None, None).await.unwrap();
    let files = listing.get("files").and_then(|v| v.as_array()).unwrap();
    let entry = files.iter().find(|f| f.get("id").and_then(|v| v.as_str()) == Some(&uploaded.file_id.to_string())).unwrap();
    assert_eq!(entry.get("size").and_then(|v| v.as_i64()), Some(49));

    let dest = dir.path().join("tiny.out");
    dave.download_file(uploaded.file_id, &dest, None).await.unwrap();
    let roundtripped = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(roundtripped, b"0123456789abcdef");
}

/// S4: a 120 MiB all-zero file crosses the CTR streaming threshold and
/// still round-trips exactly, chunk boundaries notwithstanding.
#[tokio::test]
async fn s4_large_streaming_roundtrip() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut erin = common::connect_client(&addr).await;
    erin.register("erin", "erin@x.example", "Passw0rd!").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.bin");
    let zeros = vec![0u8; 120 * 1024 * 1024];
    tokio::fs::write(&source, &zeros).await.unwrap();

    let uploaded = erin.upload_file(&source, target("big.bin")).await.unwrap();

    let dest = dir.path().join("big.out");
    erin.download_file(uploaded.file_id, &dest, None).await.unwrap();
    let roundtripped = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(roundtripped.len(), zeros.len());
    assert!(roundtripped.iter().all(|&b| b == 0));
}
