//! Unix socket server
//!
//! One accept task, one handler task per connection. Within a connection
//! requests are strictly sequential: service-type frame, then method and
//! request frames, answered in order. Unknown service types and codec errors
//! close the connection and nothing else.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use cradle_core::protocol::{self, ServiceType};
use cradle_core::{Error, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checkpoint;
use crate::config;
use crate::managers::mount::Supplier;
use crate::services::{CheckpointService, NamespaceService};

pub struct Server {
    listener: UnixListener,
    namespace: Arc<NamespaceService>,
    checkpoint: Arc<CheckpointService>,
}

impl Server {
    /// Read both service configs under `root`, build and initialise the
    /// services (filling every pool), and bind the socket. Any failure here
    /// is fatal: the daemon exits so its supervisor restarts it with clean
    /// state.
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        fs::set_permissions(root, fs::Permissions::from_mode(0o755))?;

        let provider = checkpoint::from_config(config::load_checkpoint_config(root)?)?;
        let checkpoint = Arc::new(CheckpointService::new(root, provider));
        checkpoint.init()?;

        let ns_config = config::load_namespace_config(root)?;
        let supplier: Arc<dyn Supplier> = checkpoint.clone();
        let namespace = Arc::new(NamespaceService::init(root, &ns_config, supplier)?);

        let socket = cradle_core::config::socket_path(root);
        match fs::remove_file(&socket) {
            Ok(()) => info!(socket = %socket.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(&socket)?;
        info!(socket = %socket.display(), "listening");

        Ok(Self {
            listener,
            namespace,
            checkpoint,
        })
    }

    /// Accept until shutdown is signalled or accepting fails, then drain the
    /// open connections and tear the services down.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handlers = JoinSet::new();

        let accept_result = loop {
            tokio::select! {
                res = self.listener.accept() => match res {
                    Ok((stream, _)) => {
                        handlers.spawn(serve_conn(
                            stream,
                            Arc::clone(&self.namespace),
                            Arc::clone(&self.checkpoint),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        break Err(Error::Io(e));
                    }
                },
                _ = shutdown.changed() => break Ok(()),
            }
        };

        info!(connections = handlers.len(), "draining connections");
        while handlers.join_next().await.is_some() {}

        if let Err(e) = self.namespace.stop() {
            error!(error = %e, "namespace service shutdown with error");
        }
        if let Err(e) = self.checkpoint.stop() {
            error!(error = %e, "checkpoint service shutdown with error");
        }

        accept_result
    }
}

/// Handle a single client connection until EOF, a codec error, or shutdown.
/// An in-flight request always completes; shutdown is observed between
/// requests.
async fn serve_conn(
    mut stream: UnixStream,
    namespace: Arc<NamespaceService>,
    checkpoint: Arc<CheckpointService>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let ty = tokio::select! {
            r = protocol::read_frame::<ServiceType, _>(&mut stream) => r,
            _ = shutdown.changed() => break,
        };

        let served = match ty {
            Ok(None) => break, // client disconnected
            Ok(Some(ServiceType::Namespace)) => namespace.handle(&mut stream).await,
            Ok(Some(ServiceType::Checkpoint)) => checkpoint.handle(&mut stream).await,
            Err(e) => {
                warn!(error = %e, "invalid request");
                break;
            }
        };

        if let Err(e) = served {
            warn!(error = %e, "request failed, closing connection");
            break;
        }

        if *shutdown.borrow() {
            break;
        }
    }
}
