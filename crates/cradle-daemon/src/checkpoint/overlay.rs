//! Content-addressed overlay provider
//!
//! Serves checkpoints out of a shared read-only cache keyed by ref: prepare
//! overlay-mounts the cached layer at the target with per-target scratch
//! dirs, so many targets share one unpacked copy. Implements the
//! reference-counting capability so the cache can track liveness.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cradle_core::{mount, Error, Result};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Provider, RefCounter};
use crate::config::OverlayConfig;

#[derive(Debug)]
pub struct OverlayProvider {
    cache: PathBuf,
    refs: Mutex<HashMap<String, u64>>,
}

impl OverlayProvider {
    pub fn new(config: OverlayConfig) -> Result<Self> {
        if !config.cache_path.is_dir() {
            return Err(Error::Config(format!(
                "checkpoint cache {} does not exist",
                config.cache_path.display()
            )));
        }
        Ok(Self {
            cache: config.cache_path,
            refs: Mutex::new(HashMap::new()),
        })
    }

    /// Liveness count for a ref, as reported to the backing cache.
    pub fn count(&self, reference: &str) -> u64 {
        self.refs.lock().get(reference).copied().unwrap_or(0)
    }

    fn scratch_dirs(target: &Path) -> (PathBuf, PathBuf) {
        let name = target
            .file_name()
            .map_or_else(|| "target".into(), |n| n.to_string_lossy().into_owned());
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        (
            parent.join(format!("{name}.upper")),
            parent.join(format!("{name}.work")),
        )
    }
}

impl Provider for OverlayProvider {
    fn prepare(&self, reference: &str, target: &Path) -> Result<()> {
        let lower = self.cache.join(reference);
        if !lower.is_dir() {
            return Err(Error::Provider(format!(
                "no cached checkpoint for '{reference}'"
            )));
        }

        let (upper, work) = Self::scratch_dirs(target);
        fs::create_dir_all(&upper)?;
        fs::create_dir_all(&work)?;

        mount::mount_overlay(&[lower], &upper, &work, target)
            .map_err(|e| Error::Provider(e.to_string()))?;
        debug!(%reference, target = %target.display(), "checkpoint overlay mounted");
        Ok(())
    }

    fn remove(&self, target: &Path) -> Result<()> {
        let unmounted = mount::umount_detach(target);

        let (upper, work) = Self::scratch_dirs(target);
        for dir in [target, upper.as_path(), work.as_path()] {
            if let Err(e) = fs::remove_dir_all(dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(Error::Provider(format!(
                        "failed to remove {}: {e}",
                        dir.display()
                    )));
                }
            }
        }

        unmounted.map_err(|e| Error::Provider(e.to_string()))
    }

    fn ref_counter(&self) -> Option<&dyn RefCounter> {
        Some(self)
    }
}

impl RefCounter for OverlayProvider {
    fn add(&self, reference: &str) {
        let mut refs = self.refs.lock();
        let count = refs.entry(reference.to_string()).or_insert(0);
        *count += 1;
        trace!(%reference, count, "checkpoint reference added");
    }
}
