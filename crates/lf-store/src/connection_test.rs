//! Tests for StoreDb connection, migrations, and transaction handling.

use crate::repo::{classes, images, labels, projects, tags};
use crate::{clear_live_dataset, StoreDb, StoreError};
use duckdb::Connection;
use lf_core::ProjectType;

// ── Helpers ────────────────────────────────────────────────────────────

fn count(db: &StoreDb, sql: &str) -> i64 {
    db.with_conn(|conn| {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map_err(StoreError::from)
    })
    .unwrap()
}

fn seed_project(conn: &Connection) -> i64 {
    let project = projects::insert_project(conn, "p", ProjectType::Detection, "tester").unwrap();
    let class_id = classes::insert_class(conn, project.id, "cat", "#ff0000", None, "tester").unwrap();
    let image_id =
        images::insert_image(conn, project.id, &images::NewImage::named("a.jpg", 10, 10), "tester")
            .unwrap();
    labels::insert_label(conn, image_id, class_id, r#"{"x":1,"y":1,"width":2,"height":2}"#, "tester")
        .unwrap();
    tags::insert_tag(conn, project.id, "night", "#000000", "tester").unwrap();
    project.id
}

// ── Connection & migration ─────────────────────────────────────────────

#[test]
fn open_memory_succeeds() {
    let db = StoreDb::open_memory().unwrap();
    assert!(count(&db, "SELECT COUNT(*) FROM lf.schema_version") >= 1);
}

#[test]
fn open_file_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.duckdb");
    assert!(!path.exists());
    let _db = StoreDb::open(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.duckdb");
    {
        let _db1 = StoreDb::open(&path).unwrap();
    }
    let db2 = StoreDb::open(&path).unwrap();
    assert_eq!(
        count(&db2, "SELECT COUNT(*) FROM lf.schema_version"),
        crate::ddl::MIGRATIONS.len() as i64,
        "schema_version should have one row per migration"
    );
}

#[test]
fn new_accepts_memory_path() {
    let db = StoreDb::new(":memory:").unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.images"), 0);
}

#[test]
fn split_check_rejects_unknown_value() {
    let db = StoreDb::open_memory().unwrap();
    let result = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO lf.images (id, project_id, file_name, split, created_at, created_by)
             VALUES (1, 1, 'a.jpg', 'validation', now(), 'x')",
            [],
        )
        .map_err(StoreError::from)
    });
    assert!(result.is_err());
}

#[test]
fn ratio_check_rejects_bad_sum() {
    let db = StoreDb::open_memory().unwrap();
    let result = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO lf.project_splits (id, project_id, class_id, train_ratio, dev_ratio, test_ratio)
             VALUES (1, 1, NULL, 70, 20, 20)",
            [],
        )
        .map_err(StoreError::from)
    });
    assert!(result.is_err());
}

// ── Transactions ───────────────────────────────────────────────────────

#[test]
fn transaction_commits_on_ok() {
    let db = StoreDb::open_memory().unwrap();
    db.transaction(|conn| -> Result<(), StoreError> {
        seed_project(conn);
        Ok(())
    })
    .unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.images"), 1);
}

#[test]
fn transaction_rolls_back_on_err() {
    let db = StoreDb::open_memory().unwrap();
    let result = db.transaction(|conn| -> Result<(), StoreError> {
        seed_project(conn);
        Err(StoreError::QueryError("boom".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.images"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.image_labels"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.projects"), 0);
}

#[test]
fn clear_live_dataset_only_touches_one_project() {
    let db = StoreDb::open_memory().unwrap();
    let (first, _second) = db
        .transaction(|conn| -> Result<(i64, i64), StoreError> {
            Ok((seed_project(conn), seed_project(conn)))
        })
        .unwrap();

    let removed = db.with_conn(|conn| clear_live_dataset(conn, first)).unwrap();
    assert_eq!(removed, 4, "label, image, class, tag");
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.images"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.image_labels"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.project_classes"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM lf.projects"), 2);
}
