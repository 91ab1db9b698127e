use super::*;
use crate::blobs::FsImageBlobStore;
use flate2::read::GzDecoder;
use lf_store::repo::images::NewImage;
use lf_store::repo::projects;
use lf_store::{StoreDb, StoreError};
use std::io::Read;

struct Setup {
    db: StoreDb,
    project_id: i64,
    cat: i64,
    dog: i64,
    _dir: tempfile::TempDir,
    blobs: FsImageBlobStore,
}

fn image(name: &str, split: Split) -> NewImage {
    NewImage {
        split,
        ..NewImage::named(name, 200, 100)
    }
}

/// Dog is created first so it has the lower id and label index 0.
fn setup(project_type: ProjectType) -> Setup {
    let db = StoreDb::open_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (project_id, cat, dog) = db
        .transaction(|conn| -> Result<_, StoreError> {
            let p = projects::insert_project(conn, "p", project_type, "u")?;
            let dog = classes::insert_class(conn, p.id, "dog", "#0f0", None, "u")?;
            let cat = classes::insert_class(conn, p.id, "cat", "#f00", None, "u")?;
            Ok((p.id, cat, dog))
        })
        .unwrap();
    std::fs::create_dir_all(dir.path().join(project_id.to_string())).unwrap();
    let blobs = FsImageBlobStore::new(dir.path());
    Setup {
        db,
        project_id,
        cat,
        dog,
        _dir: dir,
        blobs,
    }
}

fn put_blob(s: &Setup, name: &str) {
    std::fs::write(
        s.blobs.path_for(s.project_id, name),
        format!("bytes of {name}"),
    )
    .unwrap();
}

fn unpack(archive: &[u8]) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        entries.insert(path, body);
    }
    entries
}

fn live(s: &Setup) -> DatasetScope {
    DatasetScope::Live {
        project_id: s.project_id,
    }
}

#[test]
fn detection_layout_uses_class_index_directories() {
    let s = setup(ProjectType::Detection);
    let image_id = s
        .db
        .with_conn(|conn| -> Result<_, StoreError> {
            let id = images::insert_image(conn, s.project_id, &image("a.jpg", Split::Training), "u")?;
            labels::insert_label(conn, id, s.cat, r#"{"x":0,"y":0,"width":100,"height":50}"#, "u")?;
            Ok(id)
        })
        .unwrap();
    put_blob(&s, "a.jpg");

    let export = s
        .db
        .with_conn(|conn| export_dataset(conn, live(&s), ProjectType::Detection, &s.blobs))
        .unwrap();
    let entries = unpack(&export.archive);

    let label_path = format!("training/1/{image_id}_a.txt");
    assert_eq!(
        entries.get(&label_path).map(String::as_str),
        Some("1 0.250000 0.250000 0.500000 0.500000\n")
    );
    assert!(entries.contains_key(&format!("training/1/{image_id}_a.jpg")));
    assert_eq!(export.class_names, vec!["dog".to_string(), "cat".to_string()]);
    assert_eq!(export.summary.training, 1);
    assert_eq!(export.summary.labels, 1);
    assert_eq!(export.summary.missing_images, 0);

    let data_yaml: serde_yaml::Value = serde_yaml::from_str(&entries["data.yaml"]).unwrap();
    assert_eq!(data_yaml["nc"], serde_yaml::Value::from(2));
    assert_eq!(data_yaml["val"], serde_yaml::Value::from("dev"));
}

#[test]
fn multi_class_image_is_filed_under_lowest_index() {
    let s = setup(ProjectType::Detection);
    let image_id = s
        .db
        .with_conn(|conn| -> Result<_, StoreError> {
            let id = images::insert_image(conn, s.project_id, &image("b.jpg", Split::Dev), "u")?;
            let pos = r#"{"x":10,"y":10,"width":20,"height":20}"#;
            labels::insert_label(conn, id, s.cat, pos, "u")?;
            labels::insert_label(conn, id, s.dog, pos, "u")?;
            Ok(id)
        })
        .unwrap();

    let export = s
        .db
        .with_conn(|conn| export_dataset(conn, live(&s), ProjectType::Detection, &s.blobs))
        .unwrap();
    let entries = unpack(&export.archive);
    let label = &entries[&format!("dev/0/{image_id}_b.txt")];
    assert_eq!(label.lines().count(), 2);
    assert_eq!(export.summary.missing_images, 1);
    assert_eq!(export.summary.labels, 2);
}

#[test]
fn unassigned_and_background_images() {
    let s = setup(ProjectType::Detection);
    let background = s
        .db
        .with_conn(|conn| -> Result<_, StoreError> {
            images::insert_image(conn, s.project_id, &image("skip.jpg", Split::Unassigned), "u")?;
            let id = images::insert_image(conn, s.project_id, &image("bg.jpg", Split::Test), "u")?;
            images::set_label_state(conn, id, true, true)?;
            Ok(id)
        })
        .unwrap();

    let export = s
        .db
        .with_conn(|conn| export_dataset(conn, live(&s), ProjectType::Detection, &s.blobs))
        .unwrap();
    let entries = unpack(&export.archive);
    assert_eq!(
        entries.get(&format!("test/{BACKGROUND_DIR}/{background}_bg.txt")).map(String::as_str),
        Some("")
    );
    assert_eq!(export.summary.test, 1);
    assert_eq!(export.summary.skipped_unassigned, 1);
}

#[test]
fn classification_writes_no_label_files() {
    let s = setup(ProjectType::Classification);
    s.db
        .with_conn(|conn| -> Result<_, StoreError> {
            let id = images::insert_image(conn, s.project_id, &image("c.jpg", Split::Training), "u")?;
            labels::insert_label(conn, id, s.dog, r#"{"x":1,"y":1,"width":1,"height":1}"#, "u")?;
            let bg = images::insert_image(conn, s.project_id, &image("d.jpg", Split::Training), "u")?;
            images::set_label_state(conn, bg, true, true)?;
            Ok(())
        })
        .unwrap();
    put_blob(&s, "c.jpg");

    let export = s
        .db
        .with_conn(|conn| export_dataset(conn, live(&s), ProjectType::Classification, &s.blobs))
        .unwrap();
    let entries = unpack(&export.archive);
    assert!(entries.keys().all(|k| !k.ends_with(".txt")));
    assert!(entries.keys().any(|k| k.starts_with("training/0/")));
    assert_eq!(export.summary.training, 1);
    assert_eq!(export.summary.skipped_unlabeled, 1);
}

#[test]
fn class_index_map_orders_by_id() {
    let s = setup(ProjectType::Detection);
    let classes = s
        .db
        .with_conn(|conn| classes::list_classes(conn, live(&s)))
        .unwrap();
    let map = class_index_map(&classes);
    assert_eq!(map[&s.dog], 0);
    assert_eq!(map[&s.cat], 1);
}
