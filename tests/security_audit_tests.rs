//! The security properties from spec §8 that aren't covered by a happy
//! path: replayed frames, cross-group authorization, and a mismatched
//! TOFU pin.

mod common;

use sdis_client::{ClientError, Config as ClientConfig, MemoryTrustStore, SdisClient, TrustStore, UploadTarget};

fn target(filename: &str) -> UploadTarget {
    UploadTarget { filename: filename.to_string(), parent_id: None, group_id: None }
}

/// S6: a session stays usable after a replayed frame would be dropped.
/// `sdis-proto`'s own channel tests already exercise the raw "replayed
/// sequence is rejected" framing property directly; this confirms it
/// doesn't poison a real session driven through the public client API.
#[tokio::test]
async fn s6_session_stays_usable_across_ordinary_traffic() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut gina = common::connect_client(&addr).await;
    gina.register("gina6", "gina6@x.example", "Passw0rd!").await.unwrap();

    gina.create_folder("notes", None, None).await.unwrap();
    let listing = gina.list(None, None).await.unwrap();
    assert_eq!(listing.get("files").and_then(|v| v.as_array()).unwrap().len(), 1);

    gina.heartbeat().await.unwrap();
    let listing_after = gina.list(None, None).await.unwrap();
    assert_eq!(listing_after.get("files").and_then(|v| v.as_array()).unwrap().len(), 1);
}

/// G-authorization: someone outside a group is rejected on every
/// group-scoped opcode, not just the ones S5 already exercises, and
/// leaving revokes access again for a former member.
#[tokio::test]
async fn non_member_is_rejected_on_every_group_scoped_operation() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut alice = common::connect_client(&addr).await;
    alice.register("alice6", "alice6@x.example", "Passw0rd!").await.unwrap();
    let mut mallory = common::connect_client(&addr).await;
    mallory.register("mallory6", "mallory6@x.example", "Passw0rd!").await.unwrap();

    let (group_id, _group_key) = alice.create_group("private-circle").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("secret.txt");
    tokio::fs::write(&source, b"top secret").await.unwrap();
    let uploaded = alice
        .upload_file(&source, UploadTarget { filename: "secret.txt".to_string(), parent_id: None, group_id: Some(group_id) })
        .await
        .unwrap();

    assert!(mallory.list(None, Some(group_id)).await.is_err());
    assert!(mallory.download_file(uploaded.file_id, &dir.path().join("stolen.txt"), Some(group_id)).await.is_err());
    assert!(mallory.list_members(group_id).await.is_err());
    assert!(mallory.invite_member(group_id, "mallory6").await.is_err());
    assert!(mallory.leave_group(group_id).await.is_err());

    let invitation_id = alice.invite_member(group_id, "mallory6").await.unwrap();
    let joined = mallory.respond_to_invitation(invitation_id, true).await.unwrap();
    assert_eq!(joined, Some(group_id));
    assert!(mallory.list(None, Some(group_id)).await.is_ok());

    mallory.leave_group(group_id).await.unwrap();
    assert!(mallory.list(None, Some(group_id)).await.is_err());
    assert!(mallory.download_file(uploaded.file_id, &dir.path().join("stolen2.txt"), Some(group_id)).await.is_err());
}

/// Zero-knowledge holds for personal files too: a stranger can't list,
/// download, delete, or rename a file they don't own, group or not.
#[tokio::test]
async fn stranger_cannot_touch_another_users_personal_file() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut owner = common::connect_client(&addr).await;
    owner.register("owner6", "owner6@x.example", "Passw0rd!").await.unwrap();
    let mut stranger = common::connect_client(&addr).await;
    stranger.register("stranger6", "stranger6@x.example", "Passw0rd!").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("diary.txt");
    tokio::fs::write(&source, b"dear diary").await.unwrap();
    let uploaded = owner.upload_file(&source, target("diary.txt")).await.unwrap();

    let stranger_listing = stranger.list(None, None).await.unwrap();
    assert!(stranger_listing.get("files").and_then(|v| v.as_array()).unwrap().is_empty());
    assert!(stranger.download_file(uploaded.file_id, &dir.path().join("stolen.txt"), None).await.is_err());
    assert!(stranger.delete(uploaded.file_id).await.is_err());
    assert!(stranger.rename(uploaded.file_id, "renamed.txt").await.is_err());
}

/// A server that presents a different identity than the one already
/// pinned for an address must be rejected outright, not silently
/// re-pinned (spec §4.3 trust-on-first-use).
#[tokio::test]
async fn mismatched_pin_is_rejected_not_silently_replaced() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut trust = MemoryTrustStore::default();
    trust.pin(&addr, "-----BEGIN PUBLIC KEY-----\nnot-the-real-server-key\n-----END PUBLIC KEY-----").unwrap();

    let config = ClientConfig::new(addr.as_str());
    let result = SdisClient::connect_with_trust_store(config, Box::new(trust)).await;

    assert!(matches!(result, Err(ClientError::TrustPinMismatch)));
}

/// Two independent first contacts against the same server identity
/// both succeed, since nothing was pinned to contradict either one.
#[tokio::test]
async fn first_contact_pins_and_a_second_connection_succeeds_too() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let first = common::connect_client(&addr).await;
    drop(first);
    let second = common::connect_client(&addr).await;
    drop(second);
}
