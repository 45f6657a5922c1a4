//! Namespace service
//!
//! Routes `Get`/`Put` to the per-type managers. Responses carry the daemon's
//! pid next to the descriptor number: the number only means something inside
//! this process, and clients reopen it through `/proc/<pid>/fd/<fd>`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cradle_core::ns::NsType;
use cradle_core::protocol::{
    self, GetNamespaceRequest, GetNamespaceResponse, PutNamespaceRequest, PutNamespaceResponse,
    METHOD_GET_NAMESPACE, METHOD_PUT_NAMESPACE,
};
use cradle_core::{Error, Result};
use tracing::{error, info};

use crate::config::NamespaceConfig;
use crate::managers::mount::{MountManager, Supplier};
use crate::managers::{NsManager, UnshareManager};
use crate::rootfs::LocalImageStore;

const NO_SUCH_NAMESPACE: &str = "No such namespace";

pub struct NamespaceService {
    managers: HashMap<NsType, Box<dyn NsManager>>,
}

impl NamespaceService {
    /// Build and eagerly fill all three pools. Any fill failure is fatal.
    pub fn init(
        root: &Path,
        config: &NamespaceConfig,
        supplier: Arc<dyn Supplier>,
    ) -> Result<Self> {
        let rootfs = Arc::new(LocalImageStore::new(&config.image_store));

        let mut managers: HashMap<NsType, Box<dyn NsManager>> = HashMap::new();
        for ty in [NsType::Uts, NsType::Ipc] {
            managers.insert(ty, Box::new(UnshareManager::new(ty, config.capacity_of(ty))?));
        }
        managers.insert(
            NsType::Mnt,
            Box::new(MountManager::new(
                root,
                config.capacity_of(NsType::Mnt),
                &config.mount_refs,
                supplier,
                rootfs,
            )?),
        );

        info!(
            uts = config.capacity_of(NsType::Uts),
            ipc = config.capacity_of(NsType::Ipc),
            mnt = config.capacity_of(NsType::Mnt),
            "namespace service initialized"
        );
        Ok(Self { managers })
    }

    /// Serve one request on the connection.
    pub async fn handle(&self, stream: &mut tokio::net::UnixStream) -> Result<()> {
        let method: String = protocol::expect_frame(stream).await?;
        match method.as_str() {
            METHOD_GET_NAMESPACE => {
                let req: GetNamespaceRequest = protocol::expect_frame(stream).await?;
                let rsp = self.get(&req);
                info!(t = %req.t, ns_id = rsp.ns_id, fd = rsp.fd, "Get");
                protocol::write_frame(stream, &rsp).await
            }
            METHOD_PUT_NAMESPACE => {
                let req: PutNamespaceRequest = protocol::expect_frame(stream).await?;
                let rsp = self.put(&req);
                info!(t = %req.t, id = req.id, error = %rsp.error, "Put");
                protocol::write_frame(stream, &rsp).await
            }
            other => Err(Error::InvalidArgument(format!("unknown method '{other}'"))),
        }
    }

    fn get(&self, req: &GetNamespaceRequest) -> GetNamespaceResponse {
        let Some(mgr) = self.manager_for(&req.t) else {
            return GetNamespaceResponse {
                fd: -1,
                info: NO_SUCH_NAMESPACE.to_string(),
                ..Default::default()
            };
        };

        match mgr.get(req.arg.as_deref()) {
            Ok(lease) => GetNamespaceResponse {
                ns_id: lease.id,
                pid: std::process::id(),
                fd: lease.fd,
                info: lease.info,
            },
            Err(e) => GetNamespaceResponse {
                fd: -1,
                info: e.to_string(),
                ..Default::default()
            },
        }
    }

    fn put(&self, req: &PutNamespaceRequest) -> PutNamespaceResponse {
        let error = match self.manager_for(&req.t) {
            None => NO_SUCH_NAMESPACE.to_string(),
            Some(mgr) => match mgr.put(req.id) {
                Ok(()) => String::new(),
                Err(e) => e.to_string(),
            },
        };
        PutNamespaceResponse { error }
    }

    /// A request names its namespace type as a string; anything that does
    /// not resolve to a pooled type gets the in-band "No such namespace"
    /// answer.
    fn manager_for(&self, t: &str) -> Option<&dyn NsManager> {
        let ty: NsType = t.parse().ok()?;
        self.managers.get(&ty).map(|m| m.as_ref())
    }

    /// Tear down every pool, logging and aggregating per-type failures.
    pub fn stop(&self) -> Result<()> {
        let mut failed = Vec::new();
        for (ty, mgr) in &self.managers {
            if let Err(e) = mgr.cleanup() {
                error!(t = %ty, error = %e, "namespace pool cleanup failed");
                failed.push(format!("{ty}: {e}"));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failed.join("; ")))
        }
    }
}
