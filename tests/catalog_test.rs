// Catalog facade tests: authorization, audit trail, delete, retention cleanup,
// verification and downloads

mod common;

use chrono::{Duration, Utc};
use common::Harness;
use dumpvault::backup::{format_size, BackupError, BackupMetadata};
use dumpvault::security::{AuditAction, AuthContext};
use pretty_assertions::assert_eq;
use tokio::io::AsyncReadExt;

/// Place an artifact with a back-dated sidecar directly in the backup directory.
async fn seed(h: &Harness, age_days: i64, size: usize) -> String {
    let created_at = Utc::now() - Duration::days(age_days);
    let filename = format!("backup-{}.sql.gz", created_at.format("%Y%m%d-%H%M%S"));
    std::fs::write(h.path(&filename), vec![b'x'; size]).unwrap();

    h.store()
        .write(&BackupMetadata {
            filename: filename.clone(),
            created_at,
            size_bytes: size as u64,
            size_formatted: format_size(size as u64),
            checksum: "0".repeat(64),
            duration_ms: 10,
            database_name: "shop".to_string(),
            compressed: true,
        })
        .await
        .unwrap();
    filename
}

#[tokio::test]
async fn test_each_mutation_emits_one_audit_event() {
    let h = Harness::new(&["INSERT INTO items VALUES (1);"]);

    let record = h.catalog.create(&h.admin).await.unwrap();
    let events = h.audit.get_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::BackupCreated);
    assert_eq!(events[0].actor, "ops-admin");
    assert_eq!(events[0].target.as_deref(), Some(record.filename.as_str()));
    assert_eq!(
        events[0].after.as_ref().unwrap()["checksum"],
        serde_json::json!(record.checksum)
    );

    h.catalog.delete(&h.admin, &record.filename).await.unwrap();
    h.catalog.clean(&h.admin).await.unwrap();

    let actions: Vec<AuditAction> = h
        .audit
        .get_events()
        .await
        .iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::BackupCreated,
            AuditAction::BackupDeleted,
            AuditAction::BackupsCleaned
        ]
    );

    // Failed operations leave the trail alone
    assert!(h.catalog.delete(&h.admin, &record.filename).await.is_err());
    assert_eq!(h.audit.get_events().await.len(), 3);
}

#[tokio::test]
async fn test_non_admin_is_denied_everything_mutating() {
    let h = Harness::new(&["INSERT INTO items VALUES (1);"]);
    let record = h.catalog.create(&h.admin).await.unwrap();
    h.audit.clear().await;

    let viewer = AuthContext::new("viewer-1", vec!["viewer".to_string()]);

    let denied = [
        h.catalog.create(&viewer).await.map(|_| ()),
        h.catalog
            .restore(&viewer, &dumpvault::backup::RestoreRequest::new(&record.filename))
            .await
            .map(|_| ()),
        h.catalog.delete(&viewer, &record.filename).await,
        h.catalog.clean(&viewer).await.map(|_| ()),
    ];
    for result in denied {
        let err = result.unwrap_err();
        assert!(matches!(err, BackupError::PermissionDenied(_)));
        assert_eq!(err.public_message(), "Permission denied");
    }

    // Reads stay open
    assert_eq!(h.catalog.list().await.unwrap().backups.len(), 1);
    assert!(h.audit.get_events().await.is_empty());
    assert_eq!(h.db.steps().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_artifact_and_sidecar() {
    let h = Harness::new(&["INSERT INTO items VALUES (1);"]);
    let record = h.catalog.create(&h.admin).await.unwrap();

    h.catalog.delete(&h.admin, &record.filename).await.unwrap();

    assert!(h.files().is_empty());
    assert!(matches!(
        h.catalog.get(&record.filename).await,
        Err(BackupError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_tolerates_missing_sidecar() {
    let h = Harness::new(&[]);
    std::fs::write(h.path("backup-20240101-000000.sql"), b"-- orphan\n").unwrap();

    h.catalog
        .delete(&h.admin, "backup-20240101-000000.sql")
        .await
        .unwrap();
    assert!(h.files().is_empty());

    let events = h.audit.get_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].before, None);
}

#[tokio::test]
async fn test_delete_missing_artifact_is_not_found() {
    let h = Harness::new(&[]);

    let err = h
        .catalog
        .delete(&h.admin, "backup-20240101-000000.sql.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::NotFound(_)));

    let err = h.catalog.delete(&h.admin, "../backup-1.sql").await.unwrap_err();
    assert!(matches!(err, BackupError::PathTraversal(_)));
}

#[tokio::test]
async fn test_clean_keeps_floor_and_recent_backups() {
    let h = Harness::new(&[]);
    let mut by_age = Vec::new();
    for age in [1, 5, 10, 20, 31, 40, 50, 60, 70, 80] {
        by_age.push((age, seed(&h, age, 100).await));
    }

    let result = h.catalog.clean(&h.admin).await.unwrap();

    // The 31-day backup is inside the floor of five, everything older goes
    let mut expected: Vec<String> = by_age
        .iter()
        .filter(|(age, _)| [40, 50, 60, 70, 80].contains(age))
        .map(|(_, name)| name.clone())
        .collect();
    let mut deleted = result.deleted.clone();
    expected.sort();
    deleted.sort();
    assert_eq!(deleted, expected);
    assert_eq!(result.deleted_count, 5);
    assert_eq!(result.kept_count, 5);
    assert_eq!(result.freed_space, 500);

    for name in &expected {
        assert!(!h.path(name).exists());
        assert!(!h.store().exists(name).await);
    }
    assert_eq!(h.catalog.list().await.unwrap().backups.len(), 5);

    let events = h.audit.get_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].before, Some(serde_json::json!({ "count": 10 })));
}

#[tokio::test]
async fn test_clean_below_floor_deletes_nothing() {
    let h = Harness::new(&[]);
    for age in [100, 200, 300] {
        seed(&h, age, 10).await;
    }

    let result = h.catalog.clean(&h.admin).await.unwrap();
    assert_eq!(result.deleted_count, 0);
    assert_eq!(result.kept_count, 3);
    assert!(result.deleted.is_empty());
}

#[tokio::test]
async fn test_clean_ignores_orphan_files() {
    let h = Harness::new(&[]);
    for age in [40, 50, 60, 70, 80, 90] {
        seed(&h, age, 10).await;
    }
    let orphan = "backup-20000101-000000.sql";
    std::fs::write(h.path(orphan), b"partial").unwrap();

    let result = h.catalog.clean(&h.admin).await.unwrap();
    assert_eq!(result.deleted_count, 1);
    assert!(h.path(orphan).exists());
}

#[tokio::test]
async fn test_clean_audits_deletions_before_a_failure() {
    let h = Harness::new(&[]);
    let mut names = Vec::new();
    for age in [1, 2, 3, 4, 5, 40, 50] {
        names.push(seed(&h, age, 10).await);
    }
    // The oldest expired artifact cannot be unlinked as a file
    let stuck = names[6].clone();
    std::fs::remove_file(h.path(&stuck)).unwrap();
    std::fs::create_dir(h.path(&stuck)).unwrap();

    let err = h.catalog.clean(&h.admin).await.unwrap_err();
    assert!(matches!(err, BackupError::Io { .. }), "{:?}", err);

    assert!(!h.path(&names[5]).exists());
    assert_eq!(h.catalog.list().await.unwrap().backups.len(), 6);

    let events = h.audit.get_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::BackupsCleaned);
    let after = events[0].after.as_ref().unwrap();
    assert_eq!(after["deleted"], serde_json::json!([names[5].clone()]));
    assert_eq!(after["deletedCount"], serde_json::json!(1));
    assert_eq!(after["error"], serde_json::json!(err.public_message()));
}

#[tokio::test]
async fn test_clean_failing_on_first_deletion_is_not_audited() {
    let h = Harness::new(&[]);
    let mut names = Vec::new();
    for age in [1, 2, 3, 4, 5, 40] {
        names.push(seed(&h, age, 10).await);
    }
    std::fs::remove_file(h.path(&names[5])).unwrap();
    std::fs::create_dir(h.path(&names[5])).unwrap();

    assert!(h.catalog.clean(&h.admin).await.is_err());
    assert!(h.audit.get_events().await.is_empty());
}

#[tokio::test]
async fn test_verify_detects_tampering() {
    let h = Harness::new(&["INSERT INTO items VALUES (1);"]);
    let record = h.catalog.create(&h.admin).await.unwrap();

    let ok = h.catalog.verify(&record.filename).await.unwrap();
    assert!(ok.valid);
    assert_eq!(ok.expected, record.checksum);

    std::fs::write(&record.path, b"tampered").unwrap();
    let bad = h.catalog.verify(&record.filename).await.unwrap();
    assert!(!bad.valid);
    assert_eq!(bad.expected, record.checksum);
    assert_ne!(bad.actual, bad.expected);
}

#[tokio::test]
async fn test_file_path_and_download() {
    let h = Harness::new(&["INSERT INTO items VALUES (1);"]);
    let record = h.catalog.create(&h.admin).await.unwrap();

    let path = h.catalog.get_file_path(&record.filename).await.unwrap();
    assert_eq!(path, record.path);

    let mut download = h.catalog.open_download(&record.filename).await.unwrap();
    assert_eq!(download.size_bytes, record.size_bytes);
    assert_eq!(
        download.content_disposition(),
        format!("attachment; filename=\"{}\"", record.filename)
    );

    let mut bytes = Vec::new();
    download.file.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, std::fs::read(&record.path).unwrap());

    // Artifacts without a sidecar are not downloadable
    std::fs::write(h.path("backup-20240101-000000.sql"), b"-- orphan").unwrap();
    assert!(matches!(
        h.catalog.get_file_path("backup-20240101-000000.sql").await,
        Err(BackupError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_catalog_rejects_invalid_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path()).with_prefix("bad prefix/..");

    let result = dumpvault::backup::BackupCatalog::with_defaults(config);
    assert!(matches!(result, Err(BackupError::Config(_))));
}
