//! Runtime-native provider
//!
//! Unpacks checkpoints from the runtime's local content store: a ref maps to
//! either `<store>/<ref>.tar` (unpacked with the tar crate) or a plain
//! `<store>/<ref>/` directory tree (copied). No shared cache, no
//! refcounting; every target owns a full copy.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use cradle_core::{Error, Result};
use tracing::debug;

use super::Provider;
use crate::config::NativeConfig;

#[derive(Debug)]
pub struct NativeProvider {
    store: PathBuf,
}

impl NativeProvider {
    pub fn new(config: NativeConfig) -> Result<Self> {
        if !config.store_path.is_dir() {
            return Err(Error::Config(format!(
                "checkpoint store {} does not exist",
                config.store_path.display()
            )));
        }
        Ok(Self {
            store: config.store_path,
        })
    }
}

impl Provider for NativeProvider {
    fn prepare(&self, reference: &str, target: &Path) -> Result<()> {
        let archive = self.store.join(format!("{reference}.tar"));
        if archive.is_file() {
            let file = File::open(&archive)?;
            tar::Archive::new(file).unpack(target).map_err(|e| {
                Error::Provider(format!("failed to unpack {}: {e}", archive.display()))
            })?;
            debug!(%reference, target = %target.display(), "checkpoint unpacked");
            return Ok(());
        }

        let tree = self.store.join(reference);
        if tree.is_dir() {
            copy_tree(&tree, target)?;
            debug!(%reference, target = %target.display(), "checkpoint copied");
            return Ok(());
        }

        Err(Error::Provider(format!(
            "no checkpoint for '{reference}' in {}",
            self.store.display()
        )))
    }

    fn remove(&self, target: &Path) -> Result<()> {
        match fs::remove_dir_all(target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Provider(format!(
                "failed to remove {}: {e}",
                target.display()
            ))),
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
