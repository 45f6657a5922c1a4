//! Tests for the checkpoint service.
//!
//! Uses a recording provider to validate idempotency, prepare-once,
//! ref validation and shutdown removal.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cradle_core::{Error, Result};
use cradle_daemon::checkpoint::Provider;
use cradle_daemon::services::CheckpointService;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    prepares: Mutex<Vec<String>>,
    removes: Mutex<Vec<PathBuf>>,
    fail_remove: bool,
}

struct RecordingProvider(Arc<Recorder>);

impl Provider for RecordingProvider {
    fn prepare(&self, reference: &str, target: &Path) -> Result<()> {
        self.0.prepares.lock().unwrap().push(reference.to_string());
        std::fs::write(target.join("inventory.img"), reference)?;
        Ok(())
    }

    fn remove(&self, target: &Path) -> Result<()> {
        self.0.removes.lock().unwrap().push(target.to_path_buf());
        if self.0.fail_remove {
            return Err(Error::Provider("remove failed".into()));
        }
        let _ = std::fs::remove_dir_all(target);
        Ok(())
    }
}

fn service(root: &Path, recorder: &Arc<Recorder>) -> CheckpointService {
    let svc = CheckpointService::new(root, Box::new(RecordingProvider(Arc::clone(recorder))));
    svc.init().unwrap();
    svc
}

#[test]
fn test_get_materialises_and_is_idempotent() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = service(root.path(), &recorder);

    let first = svc.get("img-a").unwrap();
    let second = svc.get("img-a").unwrap();

    assert_eq!(first, second);
    assert_eq!(*recorder.prepares.lock().unwrap(), vec!["img-a"]);

    // The returned path holds what the provider produced.
    let content = std::fs::read_to_string(first.join("inventory.img")).unwrap();
    assert_eq!(content, "img-a");
}

#[test]
fn test_distinct_refs_get_distinct_targets() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = service(root.path(), &recorder);

    let a = svc.get("img-a").unwrap();
    let b = svc.get("img-b").unwrap();

    assert_ne!(a, b);
    assert!(a.starts_with(root.path().join("checkpoint")));
    assert!(b.starts_with(root.path().join("checkpoint")));
}

#[test]
fn test_concurrent_gets_prepare_once() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = Arc::new(service(root.path(), &recorder));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || svc.get("img-a").unwrap())
        })
        .collect();

    let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(recorder.prepares.lock().unwrap().len(), 1);
}

#[test]
fn test_empty_ref_rejected() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = service(root.path(), &recorder);

    let err = svc.get("").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    assert!(recorder.prepares.lock().unwrap().is_empty());
}

#[test]
fn test_escaping_ref_rejected() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = service(root.path(), &recorder);

    for reference in ["../escape", "/etc/shadow", "a/../../b"] {
        let err = svc.get(reference).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "ref {reference}");
    }
    assert!(recorder.prepares.lock().unwrap().is_empty());
}

#[test]
fn test_failed_prepare_is_retried_on_next_get() {
    struct FailOnce(Mutex<bool>);
    impl Provider for FailOnce {
        fn prepare(&self, _reference: &str, _target: &Path) -> Result<()> {
            let mut failed = self.0.lock().unwrap();
            if *failed {
                return Ok(());
            }
            *failed = true;
            Err(Error::Provider("transient".into()))
        }
        fn remove(&self, _target: &Path) -> Result<()> {
            Ok(())
        }
    }

    let root = TempDir::new().unwrap();
    let svc = CheckpointService::new(root.path(), Box::new(FailOnce(Mutex::new(false))));
    svc.init().unwrap();

    // A failed prepare must not poison the ref.
    assert!(svc.get("img-a").is_err());
    assert!(svc.get("img-a").is_ok());
}

#[test]
fn test_stop_removes_each_target_once() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let svc = service(root.path(), &recorder);

    let a = svc.get("img-a").unwrap();
    let b = svc.get("img-b").unwrap();

    svc.stop().unwrap();

    let removes = recorder.removes.lock().unwrap();
    assert_eq!(removes.len(), 2);
    assert!(removes.contains(&a));
    assert!(removes.contains(&b));
    drop(removes);

    // Nothing left to remove on a second stop.
    svc.stop().unwrap();
    assert_eq!(recorder.removes.lock().unwrap().len(), 2);
}

#[test]
fn test_stop_aggregates_remove_failures() {
    let root = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder {
        fail_remove: true,
        ..Default::default()
    });
    let svc = service(root.path(), &recorder);

    svc.get("img-a").unwrap();
    svc.get("img-b").unwrap();

    // Both removes are attempted despite the failures.
    let err = svc.stop().unwrap_err();
    assert!(matches!(err, Error::Cleanup(_)), "got {err:?}");
    assert_eq!(recorder.removes.lock().unwrap().len(), 2);
}
