//! Rootfs layer stacks for mount-namespace slots

use std::fs;
use std::path::{Path, PathBuf};

use cradle_core::{Error, Result};

/// A mountable rootfs recipe: overlay lower stack plus per-slot scratch
/// directories. `merged` is where the assembled tree becomes visible.
#[derive(Debug, Clone)]
pub struct RootfsSpec {
    pub lower: Vec<PathBuf>,
    pub upper: PathBuf,
    pub work: PathBuf,
    pub merged: PathBuf,
}

/// Yields a fresh mountable rootfs for an image reference. The returned spec
/// is mounted inside a helper's unshared mount namespace, so `acquire` only
/// lays out directories and never mounts anything itself.
pub trait RootfsProvider: Send + Sync {
    fn acquire(&self, reference: &str, slot_dir: &Path) -> Result<RootfsSpec>;
}

/// Reads pre-extracted layer directories from a local image store laid out as
/// `<store>/<ref>/layers/<n>/`. Layer directories sort lexicographically,
/// highest layer first in the overlay stack.
pub struct LocalImageStore {
    store: PathBuf,
}

impl LocalImageStore {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self {
            store: store.into(),
        }
    }
}

impl RootfsProvider for LocalImageStore {
    fn acquire(&self, reference: &str, slot_dir: &Path) -> Result<RootfsSpec> {
        let layers_dir = self.store.join(reference).join("layers");
        if !layers_dir.is_dir() {
            return Err(Error::Provider(format!(
                "no layers for image '{reference}' under {}",
                layers_dir.display()
            )));
        }

        let mut lower: Vec<PathBuf> = fs::read_dir(&layers_dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .collect();
        if lower.is_empty() {
            return Err(Error::Provider(format!(
                "image '{reference}' has an empty layer stack"
            )));
        }
        lower.sort();
        lower.reverse();

        let spec = RootfsSpec {
            lower,
            upper: slot_dir.join("upper"),
            work: slot_dir.join("work"),
            merged: slot_dir.join("merged"),
        };
        for dir in [&spec.upper, &spec.work, &spec.merged] {
            fs::create_dir_all(dir)?;
        }

        Ok(spec)
    }
}
