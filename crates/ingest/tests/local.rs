//! Ingesting real directory trees.

use fchange_ingest::error::ErrorKind;
use fchange_ingest::{ExtensionFilter, IngestOptions, Ingester};
use fchange_source::SourceOptions;
use fchange_store::{Database, DiffEngine, FileRecordStore, ScanStore};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write(path: &Path, data: &[u8], mtime: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime)).unwrap();
}

fn location(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

async fn setup(roots: &[&str]) -> (Database, Ingester) {
    let db = Database::connect_in_memory().await.unwrap();
    let scans = ScanStore::from(&db);
    for root in roots {
        scans.add_root(root).await.unwrap();
    }
    let ingester = Ingester::new(&db, SourceOptions::default(), IngestOptions::default());
    (db, ingester)
}

async fn paths_and_sizes(db: &Database, scanid: i64) -> Vec<(String, u64)> {
    let records = FileRecordStore::from(db).all_files(scanid).await.unwrap();
    let mut found: Vec<_> = records.into_iter().map(|r| (r.path(), r.size)).collect();
    found.sort();
    found
}

#[tokio::test]
async fn test_every_regular_file_is_recorded() {
    let dir = TempDir::new().unwrap();
    let root = location(dir.path());
    write(&dir.path().join("a.txt"), b"1", 100);
    write(&dir.path().join("sub/b.txt"), b"22", 100);
    write(&dir.path().join("sub/deeper/c.txt"), b"333", 100);
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    let (db, ingester) = setup(&[&root]).await;

    let summary = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.hashed, 3);
    assert_eq!(summary.directories, 4);
    assert_eq!(summary.skipped, 0);

    let scans = ScanStore::from(&db);
    assert_eq!(scans.last_scan().await.unwrap(), Some(summary.scanid));
    assert!(scans.get_scan(summary.scanid).await.unwrap().unwrap().is_complete());
    assert_eq!(
        paths_and_sizes(&db, summary.scanid).await,
        [
            (format!("{root}/a.txt"), 1),
            (format!("{root}/sub/b.txt"), 2),
            (format!("{root}/sub/deeper/c.txt"), 3),
        ]
    );
    db.close().await;
}

#[tokio::test]
async fn test_unchanged_files_are_not_rehashed() {
    let dir = TempDir::new().unwrap();
    let root = location(dir.path());
    write(&dir.path().join("a.txt"), b"alpha", 100);
    write(&dir.path().join("b/c.txt"), b"charlie", 100);
    let (db, ingester) = setup(&[&root]).await;

    let first = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!((first.hashed, first.cached), (2, 0));
    let second = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!((second.hashed, second.cached), (0, 2));
    assert_ne!(first.scanid, second.scanid);

    // Same size, new mtime: hashed again.
    write(&dir.path().join("a.txt"), b"ALPHA", 200);
    let third = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!((third.hashed, third.cached), (1, 1));
    db.close().await;
}

#[tokio::test]
async fn test_changed_content_between_scans() {
    let dir = TempDir::new().unwrap();
    let root = location(dir.path());
    write(&dir.path().join("12345.txt"), b"AAAAAA", 1_000);
    write(&dir.path().join("23456.txt"), b"BBBBBB", 1_000);
    let (db, ingester) = setup(&[&root]).await;
    let diff = DiffEngine::from(&db);

    let scan1 = ingester.run(std::slice::from_ref(&root)).await.unwrap().scanid;
    let scan2 = ingester.run(std::slice::from_ref(&root)).await.unwrap().scanid;
    assert!(diff.changed_files(scan1, scan2).await.unwrap().is_empty());

    write(&dir.path().join("23456.txt"), b"CCCCCC", 2_000);
    let scan3 = ingester.run(std::slice::from_ref(&root)).await.unwrap().scanid;
    let changed = diff.changed_files(scan2, scan3).await.unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].filename, "23456.txt");
    assert_eq!(changed[0].scanid, scan3);
    assert_eq!(changed[0].size, 6);
    assert_eq!(changed[0].mtime, 2_000);
    assert!(diff.new_files(scan2, scan3).await.unwrap().is_empty());
    assert!(diff.deleted_files(scan2, scan3).await.unwrap().is_empty());
    db.close().await;
}

#[tokio::test]
async fn test_duplicates_across_roots() {
    let dir = TempDir::new().unwrap();
    let dir1 = location(&dir.path().join("DIR1"));
    let dir2 = location(&dir.path().join("DIR2"));
    write(&dir.path().join("DIR1/23456.txt"), b"BBBBBB", 1_000);
    write(&dir.path().join("DIR2/23456.txt"), b"BBBBBB", 2_000);
    write(&dir.path().join("DIR2/other.txt"), b"OTHER!", 2_000);
    let (db, ingester) = setup(&[&dir1, &dir2]).await;

    let summary = ingester.run(&[dir1.clone(), dir2.clone()]).await.unwrap();
    assert_eq!(summary.files, 3);
    let groups = DiffEngine::from(&db).duplicate_files(summary.scanid, 0).await.unwrap();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.size, 6);
    assert_eq!(group.files.len(), 2);
    assert!(group.files.iter().all(|f| f.hashid == group.hashid && f.filename == "23456.txt"));
    assert_ne!(group.files[0].dirnameid, group.files[1].dirnameid);
    assert_ne!(group.files[0].rootid, group.files[1].rootid);
    db.close().await;
}

#[tokio::test]
async fn test_zip_members_are_indexed() {
    let dir = TempDir::new().unwrap();
    let root = location(dir.path());
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).unwrap());
    let mut writer = zip::ZipWriter::new(std::fs::File::create(dir.path().join("bundle.zip")).unwrap());
    writer.start_file("a.txt", options).unwrap();
    writer.write_all(b"first").unwrap();
    writer.start_file("b/c.txt", options).unwrap();
    writer.write_all(b"second").unwrap();
    writer.finish().unwrap();
    write(&dir.path().join("broken.zip"), b"PK\x03\x04 but not really", 100);
    let (db, ingester) = setup(&[&root]).await;

    let summary = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.skipped, 0);
    let found = paths_and_sizes(&db, summary.scanid).await;
    let found: Vec<_> = found.iter().map(|(path, size)| (path.strip_prefix(&root).unwrap(), *size)).collect();
    assert_eq!(found[0], ("/broken.zip", 19));
    assert_eq!(found[2], ("/bundle.zip/a.txt", 5));
    assert_eq!(found[3], ("/bundle.zip/b/c.txt", 6));

    let hashes = fchange_store::ContentHashStore::from(&db);
    assert!(hashes.find(&blake3::hash(b"second").to_hex().to_string()).await.unwrap().is_some());

    let again = ingester.run(std::slice::from_ref(&root)).await.unwrap();
    assert_eq!((again.hashed, again.cached), (0, 4));
    db.close().await;
}

#[tokio::test]
async fn test_filtered_archive_takes_its_members_along() {
    let dir = TempDir::new().unwrap();
    let root = location(dir.path());
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut writer = zip::ZipWriter::new(std::fs::File::create(dir.path().join("bundle.zip")).unwrap());
    writer.start_file("inner.txt", options).unwrap();
    writer.write_all(b"inner").unwrap();
    writer.finish().unwrap();
    write(&dir.path().join("plain.txt"), b"plain", 100);
    let (db, _) = setup(&[&root]).await;

    for (only, ignore, expected) in [
        (&[][..], &[".zip"][..], vec!["/plain.txt"]),
        (&[".txt"][..], &[][..], vec!["/plain.txt"]),
        (&[".zip"][..], &[][..], vec!["/bundle.zip", "/bundle.zip/inner.txt"]),
    ] {
        let options = IngestOptions {
            filter: ExtensionFilter::new(only, ignore),
            ..Default::default()
        };
        let ingester = Ingester::new(&db, SourceOptions::default(), options);
        let summary = ingester.run(std::slice::from_ref(&root)).await.unwrap();
        let found: Vec<String> = paths_and_sizes(&db, summary.scanid)
            .await
            .into_iter()
            .map(|(path, _)| path.strip_prefix(&root).unwrap().to_string())
            .collect();
        assert_eq!(found, expected, "only {only:?}, ignore {ignore:?}");
    }
    db.close().await;
}

#[tokio::test]
async fn test_configuration_errors_happen_before_the_scan() {
    let dir = TempDir::new().unwrap();
    let registered = location(&dir.path().join("missing"));
    let unregistered = location(dir.path());
    let (db, ingester) = setup(&[&registered]).await;

    for locations in [vec![registered.clone()], vec![unregistered], vec!["relative/dir".to_string()], vec![]] {
        let err = ingester.run(&locations).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Configuration(_)), "{locations:?}: {err:?}");
    }
    assert!(ScanStore::from(&db).list_scans().await.unwrap().is_empty());
    db.close().await;
}

#[tokio::test]
async fn test_disabled_roots() {
    let dir = TempDir::new().unwrap();
    let kept = location(&dir.path().join("kept"));
    let dropped = location(&dir.path().join("dropped"));
    write(&dir.path().join("kept/a.txt"), b"a", 100);
    write(&dir.path().join("dropped/b.txt"), b"b", 100);
    let (db, ingester) = setup(&[&kept, &dropped]).await;
    let scans = ScanStore::from(&db);
    let files = FileRecordStore::from(&db);

    let first = ingester.scan_enabled_roots().await.unwrap();
    assert_eq!(first.files, 2);

    scans.disable_root(&dropped).await.unwrap();
    assert!(!scans.enabled_roots().await.unwrap().contains(&dropped));
    let second = ingester.scan_enabled_roots().await.unwrap();
    assert_eq!(second.files, 1);

    // Records of the disabled root stay queryable.
    assert_eq!(files.count_files(first.scanid).await.unwrap(), 2);
    let deleted = DiffEngine::from(&db).deleted_files(first.scanid, second.scanid).await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].filename, "b.txt");
    db.close().await;
}
