//! Namespace managers, one warm pool per namespace kind
//!
//! UTS and IPC are plain unshare pools; the mount manager additionally binds
//! every slot to a restored rootfs (see [`mount`]).

pub mod mount;

use cradle_core::ns::{acquire_namespace, NsType};
use cradle_core::Result;
use tracing::debug;

use crate::pool::{Lease, Pool};

/// Common surface of the per-type managers. `info` is the rootfs path for
/// mount slots and empty otherwise.
pub trait NsManager: Send + Sync {
    fn get(&self, arg: Option<&str>) -> Result<Lease<String>>;
    fn put(&self, id: usize) -> Result<()>;
    fn cleanup(&self) -> Result<()>;
}

/// Pool of namespaces that need nothing beyond the unshare itself (UTS, IPC).
#[derive(Debug)]
pub struct UnshareManager {
    pool: Pool<String>,
}

impl UnshareManager {
    pub fn new(ty: NsType, capacity: usize) -> Result<Self> {
        let pool = Pool::new(
            capacity,
            |id| {
                let fd = acquire_namespace(ty, || Ok(()))?;
                debug!(%ty, id, "filled namespace slot");
                Ok((fd, String::new()))
            },
            |slot| {
                // Dropping the last descriptor lets the kernel reap the
                // namespace.
                drop(slot.fd);
                Ok(())
            },
        )?;

        Ok(Self { pool })
    }
}

impl NsManager for UnshareManager {
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
