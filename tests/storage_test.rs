//! Filesystem store behavior that only shows across store instances: UID
//! stability over restarts and the on-disk layout contract.

mod common;

use common::test_auth;
use mailroom::storage::{FilesystemMailboxStore, MailboxStore};

const ALICE: &str = "alice@example.com";

#[tokio::test]
async fn test_uids_survive_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let auth = test_auth(&[(ALICE, "pass123")]);

    let store = FilesystemMailboxStore::new(dir.path(), auth.clone());
    store
        .store("bob@remote.org", &[ALICE.to_string()], "first\n")
        .await
        .unwrap();
    store
        .store("bob@remote.org", &[ALICE.to_string()], "second\n")
        .await
        .unwrap();
    let uids = store.list_message_uids(ALICE).await.unwrap();
    assert_eq!(uids.len(), 2);

    // A fresh store over the same root sees the same UIDs and bodies.
    let reopened = FilesystemMailboxStore::new(dir.path(), auth);
    assert_eq!(reopened.list_message_uids(ALICE).await.unwrap(), uids);
    let first = reopened
        .get_message(ALICE, &uids[0])
        .await
        .unwrap()
        .unwrap();
    assert!(first.contains("first"));
}

#[tokio::test]
async fn test_on_disk_layout() {
    let dir = tempfile::tempdir().unwrap();
    let auth = test_auth(&[("First.Last+tag@Example.COM", "pw")]);

    let store = FilesystemMailboxStore::new(dir.path(), auth);
    store
        .store(
            "sender@remote.org",
            &["First.Last+tag@Example.COM".to_string()],
            "hello\n",
        )
        .await
        .unwrap();

    let mailbox_dir = dir.path().join("example.com").join("firstlast");
    assert!(mailbox_dir.is_dir());

    let entries: Vec<_> = std::fs::read_dir(&mailbox_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].extension().unwrap(), "eml");

    let content = std::fs::read_to_string(&entries[0]).unwrap();
    assert!(content.starts_with("From: sender@remote.org\nTo: First.Last+tag@Example.COM\n"));
}

#[tokio::test]
async fn test_foreign_files_are_ignored_in_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    let auth = test_auth(&[(ALICE, "pass123")]);
    let store = FilesystemMailboxStore::new(dir.path(), auth);

    store
        .store("bob@remote.org", &[ALICE.to_string()], "real\n")
        .await
        .unwrap();

    let mailbox_dir = dir.path().join("example.com").join("alice");
    std::fs::write(mailbox_dir.join("notes.txt"), "not a message").unwrap();

    assert_eq!(store.count_messages(ALICE).await.unwrap(), 1);
}
