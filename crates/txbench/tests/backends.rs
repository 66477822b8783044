//! End-to-end runs against the embedded engines.

use tempfile::TempDir;
use txbench::backend::{
    Backend, BtreeBackend, BtreeConfig, LsmBackend, LsmConfig, SqliteBackend, SqliteConfig,
};
use txbench::diagnostics::noop;
use txbench::{BatchSpec, KeyPrefixPolicy, Runner, WriteMode};

fn spec() -> BatchSpec {
    BatchSpec::new(3).with_batch_size(100)
}

fn btree(dir: &TempDir) -> BtreeBackend {
    BtreeBackend::open(&BtreeConfig::new(dir.path().join("btree.redb")), noop()).unwrap()
}

fn lsm(dir: &TempDir) -> LsmBackend {
    LsmBackend::open(&LsmConfig::new(dir.path().join("lsm")), noop()).unwrap()
}

fn sqlite(dir: &TempDir) -> SqliteBackend {
    SqliteBackend::open(&SqliteConfig::new(dir.path().join("sqlite.db")), noop()).unwrap()
}

#[test]
fn test_btree_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = btree(&dir);

    let outcome = Runner::new(spec()).run(&mut backend);
    assert!(outcome.is_success());
    assert_eq!(outcome.samples.len(), 3);
    assert_eq!(backend.len().unwrap(), 300);
    assert_eq!(backend.get(b"2answer99").unwrap(), Some(b"141".to_vec()));
    backend.close();
}

#[test]
fn test_lsm_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = lsm(&dir);

    let outcome = Runner::new(spec()).run(&mut backend);
    assert!(outcome.is_success());
    assert_eq!(backend.len().unwrap(), 300);
    assert_eq!(backend.get(b"0answer0").unwrap(), Some(b"42".to_vec()));
    backend.close();
}

#[test]
fn test_sqlite_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = sqlite(&dir);

    let outcome = Runner::new(spec()).run(&mut backend);
    assert!(outcome.is_success());
    assert_eq!(backend.len().unwrap(), 300);
    assert_eq!(backend.get(b"1answer50").unwrap(), Some(b"92".to_vec()));
    backend.close();
}

#[test]
fn test_shared_prefix_leaves_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec().with_key_prefix_policy(KeyPrefixPolicy::Shared);

    let mut backend = btree(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 100);
    backend.close();

    let mut backend = lsm(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 100);
    backend.close();

    let mut backend = sqlite(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 100);
    backend.close();
}

#[test]
fn test_batch_mode() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec().with_write_mode(WriteMode::Batch);

    let mut backend = btree(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 300);
    backend.close();

    let mut backend = lsm(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 300);
    backend.close();

    let mut backend = sqlite(&dir);
    assert!(Runner::new(spec).run(&mut backend).is_success());
    assert_eq!(backend.len().unwrap(), 300);
    backend.close();
}

#[test]
fn test_abort_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let mut backend = btree(&dir);
    let mut txn = backend.begin().unwrap();
    backend.write(&mut txn, b"0answer0", b"42").unwrap();
    backend.abort(txn);
    assert!(backend.is_empty().unwrap());
    backend.close();

    let mut backend = lsm(&dir);
    let mut txn = backend.begin().unwrap();
    backend.write(&mut txn, b"0answer0", b"42").unwrap();
    backend.abort(txn);
    assert!(backend.is_empty().unwrap());
    backend.close();

    let mut backend = sqlite(&dir);
    let mut txn = backend.begin().unwrap();
    backend.write(&mut txn, b"0answer0", b"42").unwrap();
    backend.abort(txn);
    assert!(backend.is_empty().unwrap());
    backend.close();
}

#[test]
fn test_run_backend_closes_and_data_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = BtreeConfig::new(dir.path().join("btree.redb"));

    let outcome = Runner::new(spec())
        .run_backend::<BtreeBackend>(&config)
        .unwrap();
    assert!(outcome.is_success());

    // The file lock is released on close, so the store opens again.
    let backend = BtreeBackend::open(&config, noop()).unwrap();
    assert_eq!(backend.len().unwrap(), 300);
}

#[test]
fn test_writes_after_close_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = sqlite(&dir);
    backend.close();
    assert!(backend.begin().is_err());
}
