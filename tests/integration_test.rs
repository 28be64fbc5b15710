use std::sync::Arc;

use filesync::{
    DeleteOutcome, DirectoryTarget, FileSyncController, GlobalSession, MemoryNotifier,
    Notice, OwnerId, SyncConfig, UploadFile, SESSION,
};
use tempdir::TempDir;

fn local_config(root: &TempDir) -> SyncConfig {
    SyncConfig {
        data_dir: root.path().join("data"),
        downloads_dir: root.path().join("downloads"),
        scratch_dir: Some(root.path().join("scratch")),
        ..SyncConfig::default()
    }
}

// Every scenario runs against the process-wide session, so they share one test.
#[tokio::test]
async fn test_local_stores_integration() {
    filesync::initialize();
    SESSION.init();
    SESSION.sign_in(OwnerId::new("alice"));

    let root = TempDir::new("filesync_it").expect("Failed to create temporary directory");
    let config = local_config(&root);
    let notifier = Arc::new(MemoryNotifier::new());
    let controller =
        FileSyncController::open_local(&config, Arc::new(GlobalSession), notifier.clone())
            .expect("Failed to open local stores");

    // Upload, then edit: the content changes, the recorded size does not.
    let mut selection = vec![UploadFile::new("notes.txt", "text/plain", "0123456789")];
    controller.upload(&mut selection).await.expect("upload failed");
    assert!(selection.is_empty());

    let files = controller.files();
    assert_eq!(files.len(), 1);
    let notes = files[0].clone();
    assert_eq!(notes.display_name, "notes.txt");
    assert_eq!(notes.size_bytes, 10);

    let mut editor = Some(controller.open_editor(&notes).await.expect("open failed"));
    editor.as_mut().unwrap().set_content("hello world");
    controller.save_edits(&mut editor).await.expect("save failed");
    assert!(editor.is_none());
    assert_eq!(controller.files()[0].size_bytes, 10);

    // Download goes through a transient copy under the display name.
    let target = DirectoryTarget::new(&config.downloads_dir);
    let saved = controller.download(&notes, &target).await.expect("download failed");
    assert_eq!(saved, config.downloads_dir.join("notes.txt"));
    assert_eq!(std::fs::read_to_string(&saved).unwrap(), "hello world");
    let scratch = config.scratch_dir.clone().unwrap();
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);

    // The metadata document outlives the controller.
    drop(controller);
    let controller =
        FileSyncController::open_local(&config, Arc::new(GlobalSession), notifier.clone())
            .expect("Failed to reopen local stores");
    let files = controller.reload().await.expect("reload failed");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, notes.id);

    // Another user sees nothing of alice's files.
    SESSION.sign_in(OwnerId::new("bob"));
    assert!(controller.reload().await.unwrap().is_empty());
    SESSION.sign_in(OwnerId::new("alice"));

    // Delete removes both the record and the blob.
    let outcome = controller.delete(&notes).await.expect("delete failed");
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(controller.files().is_empty());
    assert!(controller.reconcile().await.unwrap().is_clean());
    let blob_path = config.blob_root().join(notes.blob_key.as_str());
    assert!(!blob_path.exists());

    assert_eq!(
        notifier.last(),
        Some(Notice::Success("File deleted successfully!".to_owned()))
    );
    assert!(notifier.errors().is_empty());

    SESSION.teardown();
}
