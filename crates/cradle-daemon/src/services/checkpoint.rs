//! Checkpoint service
//!
//! A content-addressed directory cache: the first `get` for a ref
//! materialises the tree through the provider, every later `get` returns the
//! same path. The service-wide lock runs `prepare` inside the critical
//! section, which serialises prepares and gives at-most-one per ref.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use cradle_core::protocol::{
    self, GetCheckpointRequest, GetCheckpointResponse, METHOD_GET_CHECKPOINT,
};
use cradle_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::checkpoint::Provider;
use crate::managers::mount::Supplier;

pub struct CheckpointService {
    /// `<root>/checkpoint`, holding one target directory per live ref.
    root: PathBuf,
    provider: Box<dyn Provider>,
    targets: Mutex<HashMap<String, PathBuf>>,
}

impl CheckpointService {
    pub fn new(root: &Path, provider: Box<dyn Provider>) -> Self {
        Self {
            root: root.join("checkpoint"),
            provider,
            targets: Mutex::new(HashMap::new()),
        }
    }

    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        info!(root = %self.root.display(), "checkpoint service initialized");
        Ok(())
    }

    /// Materialise (or look up) the checkpoint tree for `reference`.
    pub fn get(&self, reference: &str) -> Result<PathBuf> {
        validate_ref(reference)?;
        let target = self.root.join(reference);

        let mut targets = self.targets.lock();
        if targets.contains_key(reference) {
            return Ok(target);
        }

        std::fs::create_dir_all(&target)?;
        self.provider.prepare(reference, &target)?;
        targets.insert(reference.to_string(), target.clone());
        Ok(target)
    }

    /// Remove every live target through the provider. Failures are logged
    /// and aggregated; shutdown continues regardless.
    pub fn stop(&self) -> Result<()> {
        let targets = std::mem::take(&mut *self.targets.lock());

        let mut failed = Vec::new();
        for (reference, target) in targets {
            if let Err(e) = self.provider.remove(&target) {
                error!(%reference, error = %e, "failed to remove checkpoint target");
                failed.push(format!("{reference}: {e}"));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failed.join("; ")))
        }
    }

    /// Serve one request on the connection.
    pub async fn handle(&self, stream: &mut tokio::net::UnixStream) -> Result<()> {
        let method: String = protocol::expect_frame(stream).await?;
        match method.as_str() {
            METHOD_GET_CHECKPOINT => {
                let req: GetCheckpointRequest = protocol::expect_frame(stream).await?;
                info!(reference = %req.reference, "GetCheckpoint");

                let mut rsp = GetCheckpointResponse::default();
                match self.get(&req.reference) {
                    Ok(path) => {
                        rsp.path = path.to_string_lossy().into_owned();
                        if let Some(counter) = self.provider.ref_counter() {
                            counter.add(&req.reference);
                        }
                    }
                    Err(e) => warn!(reference = %req.reference, error = %e, "GetCheckpoint failed"),
                }

                protocol::write_frame(stream, &rsp).await
            }
            other => Err(Error::InvalidArgument(format!("unknown method '{other}'"))),
        }
    }
}

impl Supplier for CheckpointService {
    fn get(&self, reference: &str) -> Result<PathBuf> {
        Self::get(self, reference)
    }
}

/// Refs become path components under the service root; anything that could
/// escape it is rejected up front.
fn validate_ref(reference: &str) -> Result<()> {
    if reference.is_empty() {
        return Err(Error::InvalidArgument("empty checkpoint ref".into()));
    }
    let path = Path::new(reference);
    if path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(Error::InvalidArgument(format!(
            "invalid checkpoint ref '{reference}'"
        )));
    }
    Ok(())
}
