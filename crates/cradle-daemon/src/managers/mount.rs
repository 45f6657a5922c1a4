//! Mount namespace manager
//!
//! Each slot owns a mount namespace whose internal view contains a freshly
//! assembled container rootfs with the checkpoint tree bound into it. The
//! helper that unshares the namespace performs all mounting, so nothing ever
//! appears in the host mount table; the captured descriptor alone keeps the
//! namespace and its mounts alive.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cradle_core::ns::{acquire_namespace, NsType};
use cradle_core::{mount, Error, Result};
use tracing::{debug, warn};

use super::NsManager;
use crate::pool::{Lease, Pool, Slot};
use crate::rootfs::RootfsProvider;

/// Narrow capability the mount manager needs from the checkpoint side:
/// materialise a checkpoint tree and hand back its host path. Implemented by
/// the checkpoint service and injected at construction, keeping the
/// dependency one-directional.
pub trait Supplier: Send + Sync {
    fn get(&self, reference: &str) -> Result<PathBuf>;
}

/// Directory inside the assembled rootfs where the checkpoint tree is bound
/// read-only.
const RESTORE_DIR: &str = ".restore";

#[derive(Debug)]
pub struct MountManager {
    pool: Pool<String>,
}

impl MountManager {
    /// Fill `capacity` slots, one configured ref per slot. Refs may repeat;
    /// the supplier serialises per-ref so duplicate slots share checkpoint
    /// work.
    pub fn new(
        root: &Path,
        capacity: usize,
        refs: &[String],
        supplier: Arc<dyn Supplier>,
        rootfs: Arc<dyn RootfsProvider>,
    ) -> Result<Self> {
        if refs.len() != capacity {
            return Err(Error::Config(format!(
                "mount pool capacity is {capacity} but {} refs are configured",
                refs.len()
            )));
        }

        let mounts_dir = root.join("mounts");
        fs::create_dir_all(&mounts_dir)?;

        let pool = Pool::new(
            capacity,
            |id| {
                let reference = &refs[id];
                let slot_dir = mounts_dir.join(id.to_string());
                fs::create_dir_all(&slot_dir)?;
                let fd_and_path = fill_slot(reference, &slot_dir, &*supplier, &*rootfs)?;
                debug!(id, %reference, "filled mount slot");
                Ok(fd_and_path)
            },
            {
                let mounts_dir = mounts_dir.clone();
                move |slot: Slot<String>| destroy_slot(&mounts_dir, slot)
            },
        )?;

        Ok(Self { pool })
    }
}

impl NsManager for MountManager {
    fn get(&self, _arg: Option<&str>) -> Result<Lease<String>> {
        self.pool.get()
    }

    fn put(&self, id: usize) -> Result<()> {
        self.pool.put(id)
    }

    fn cleanup(&self) -> Result<()> {
        self.pool.cleanup()
    }
}

fn fill_slot(
    reference: &str,
    slot_dir: &Path,
    supplier: &dyn Supplier,
    rootfs: &dyn RootfsProvider,
) -> Result<(std::os::fd::OwnedFd, String)> {
    let checkpoint_src = supplier.get(reference)?;
    let spec = rootfs.acquire(reference, slot_dir)?;
    let merged = spec.merged.clone();

    let fd = acquire_namespace(NsType::Mnt, move || {
        mount::make_private_recursive()?;
        mount::mount_overlay(&spec.lower, &spec.upper, &spec.work, &spec.merged)?;

        let restore = spec.merged.join(RESTORE_DIR);
        fs::create_dir_all(&restore)?;
        mount::bind_mount(&checkpoint_src, &restore)?;
        mount::remount_readonly(&restore)?;
        Ok(())
    })?;

    Ok((fd, merged.to_string_lossy().into_owned()))
}

fn destroy_slot(mounts_dir: &Path, slot: Slot<String>) -> Result<()> {
    // The namespace and every mount inside it vanish with the last
    // descriptor.
    drop(slot.fd);

    let merged = PathBuf::from(&slot.info);
    if let Err(e) = mount::umount_detach(&merged) {
        // Nothing is mounted daemon-side unless propagation leaked.
        debug!(id = slot.id, error = %e, "no daemon-side mount to detach");
    }

    let slot_dir = mounts_dir.join(slot.id.to_string());
    if let Err(e) = fs::remove_dir_all(&slot_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(id = slot.id, error = %e, "failed to remove mount slot dir");
            return Err(e.into());
        }
    }

    Ok(())
}
