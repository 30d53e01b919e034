//! Snapshot read/write through the public API, including symlink survival
//! across rehydration into a brand-new VFS.

use std::sync::Mutex;

use sprout::{
    BootstrapOptions, BootstrapResult, CacheStats, MemoryStore, SnapshotSource, Vfs,
    parse_repo_url, read_snapshot, write_snapshot,
};

// One test resets the process-wide memory tier; serialize the binary.
static LOCK: Mutex<()> = Mutex::new(());

fn options<'a>() -> BootstrapOptions<'a> {
    BootstrapOptions {
        project_snapshot_cache_max_entries: Some(64),
        ..BootstrapOptions::default()
    }
}

fn result_for(url: &str, extracted: &[&str]) -> BootstrapResult {
    BootstrapResult {
        repo: parse_repo_url(url).unwrap(),
        root_path: "/project".to_string(),
        project_path: "/project".to_string(),
        extracted_files: extracted.iter().map(|s| (*s).to_string()).collect(),
        install_result: None,
        transformed_project_files: None,
        cache: CacheStats::default(),
    }
}

#[test]
fn snapshot_round_trip_preserves_symlinks_and_result() {
    let _guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let url = "acme/snapshot-links";
    let mut vfs = Vfs::new();
    vfs.write_file("/project/target.txt", b"the target bytes".to_vec())
        .unwrap();
    vfs.symlink("/project/target.txt", "/project/target-link.txt")
        .unwrap();

    let store = MemoryStore::new();
    let options = options();
    let result = result_for(url, &["/project/target.txt"]);
    assert!(write_snapshot(&vfs, url, &options, Some(&store), &result));

    let mut restored = Vfs::new();
    let outcome = read_snapshot(&mut restored, url, &options, Some(&store)).unwrap();
    assert_eq!(outcome.result, result.to_snapshot_result());
    assert!(
        restored
            .lstat("/project/target-link.txt")
            .unwrap()
            .is_symlink()
    );
    assert_eq!(
        restored.read_file("/project/target-link.txt").unwrap(),
        b"the target bytes"
    );
    assert_eq!(restored.to_snapshot(), vfs.to_snapshot());
}

#[test]
fn snapshot_read_falls_back_to_the_persistent_store() {
    let _guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let url = "acme/snapshot-persist";
    let mut vfs = Vfs::new();
    vfs.write_file("/project/file.txt", b"contents".to_vec()).unwrap();

    let store = MemoryStore::new();
    let options = options();
    let result = result_for(url, &["/project/file.txt"]);
    write_snapshot(&vfs, url, &options, Some(&store), &result);
    sprout::reset_memory_cache();

    let mut restored = Vfs::new();
    let outcome = read_snapshot(&mut restored, url, &options, Some(&store)).unwrap();
    assert_eq!(outcome.source, SnapshotSource::Persistent);
    assert_eq!(restored.read_file("/project/file.txt").unwrap(), b"contents");
}

#[test]
fn changed_option_misses_unrelated_option_hits() {
    let _guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let url = "acme/snapshot-keys";
    let mut vfs = Vfs::new();
    vfs.write_file("/project/file.txt", b"x".to_vec()).unwrap();

    let base = options();
    let result = result_for(url, &["/project/file.txt"]);
    assert!(write_snapshot(&vfs, url, &base, None, &result));

    // A fingerprinted option changes the key.
    let with_dev = BootstrapOptions {
        include_dev: true,
        ..options()
    };
    assert!(read_snapshot(&mut Vfs::new(), url, &with_dev, None).is_none());

    // A non-semantic option (the reporter) does not.
    let reporter = sprout_types::test_util::CollectingReporter::new();
    let with_reporter = BootstrapOptions {
        reporter: Some(&reporter),
        ..options()
    };
    assert!(read_snapshot(&mut Vfs::new(), url, &with_reporter, None).is_some());
}
