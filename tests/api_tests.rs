//! Group sharing, membership authorization, and notifications (spec §8
//! S5, plus G-zero-knowledge / G-authorization from the property list).

mod common;

use sdis_client::UploadTarget;

fn target_in_group(filename: &str, group_id: uuid::Uuid) -> UploadTarget {
    UploadTarget { filename: filename.to_string(), parent_id: None, group_id: Some(group_id) }
}

/// S5: alice creates a group, invites bob, bob accepts and can decrypt
/// a file alice uploaded into it; a non-member is rejected outright.
#[tokio::test]
async fn s5_group_share_roundtrips_and_excludes_non_members() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut alice = common::connect_client(&addr).await;
    alice.register("alice5", "alice5@x.example", "Passw0rd!").await.unwrap();
    let mut bob = common::connect_client(&addr).await;
    bob.register("bob5", "bob5@x.example", "Passw0rd!").await.unwrap();
    let mut carol = common::connect_client(&addr).await;
    carol.register("carol5", "carol5@x.example", "Passw0rd!").await.unwrap();

    let (group_id, _group_key) = alice.create_group("shared-photos").await.unwrap();
    let invitation_id = alice.invite_member(group_id, "bob5").await.unwrap();

    let notifications_before = bob.unread_notification_count().await.unwrap();
    assert!(notifications_before >= 1);
    let joined_group_id = bob.respond_to_invitation(invitation_id, true).await.unwrap();
    assert_eq!(joined_group_id, Some(group_id));

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("hello.txt");
    tokio::fs::write(&source, b"hi").await.unwrap();
    let uploaded = alice.upload_file(&source, target_in_group("hello.txt", group_id)).await.unwrap();

    let bob_listing = bob.list(None, Some(group_id)).await.unwrap();
    let bob_files = bob_listing.get("files").and_then(|v| v.as_array()).unwrap();
    assert_eq!(bob_files.len(), 1);

    let dest = dir.path().join("hello.out");
    bob.download_file(uploaded.file_id, &dest, Some(group_id)).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hi");

    // carol is not a member: both listing and key fetch must fail.
    assert!(carol.list(None, Some(group_id)).await.is_err());
    assert!(carol.download_file(uploaded.file_id, &dir.path().join("carol.out"), Some(group_id)).await.is_err());
}

/// Folder creation, rename, and delete on a personal namespace.
#[tokio::test]
async fn folder_and_file_lifecycle() {
    if !common::db_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let addr = common::spawn_server().await;

    let mut frank = common::connect_client(&addr).await;
    frank.register("frank", "frank@x.example", "Passw0rd!").await.unwrap();

    let folder_id = frank.create_folder("documents", None, None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("note.txt");
    tokio::fs::write(&source, b"remember the milk").await.unwrap();
    let uploaded = frank
        .upload_file(&source, UploadTarget { filename: "note.txt".to_string(), parent_id: Some(folder_id), group_id: None })
        .await
        .unwrap();

    frank.rename(uploaded.file_id, "shopping.txt").await.unwrap();
    let listing = frank.list(Some(folder_id), None).await.unwrap();
    let files = listing.get("files").and_then(|v| v.as_array()).unwrap();
    assert_eq!(files[0].get("name").and_then(|v| v.as_str()), Some("shopping.txt"));

    frank.delete(uploaded.file_id).await.unwrap();
    let listing_after = frank.list(Some(folder_id), None).await.unwrap();
    assert!(listing_after.get("files").and_then(|v| v.as_array()).unwrap().is_empty());
}
