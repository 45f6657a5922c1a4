//! On-disk service configuration
//!
//! Both files live directly under the daemon root and are read once at
//! startup. A missing namespace file falls back to defaults; a missing or
//! malformed checkpoint file is fatal, since the daemon cannot guess which
//! provider to run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cradle_core::ns::NsType;
use cradle_core::{Error, Result};
use serde::Deserialize;
use tracing::warn;

pub const NAMESPACE_CONFIG: &str = "namespace_service.json";
pub const CHECKPOINT_CONFIG: &str = "checkpoint_service.json";

const DEFAULT_CAPACITY: usize = 5;

/// Validated namespace service configuration.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    pub capacity: HashMap<NsType, usize>,
    /// One checkpoint ref per mount slot, in slot order.
    pub mount_refs: Vec<String>,
    /// Local image store backing the rootfs provider.
    pub image_store: PathBuf,
}

impl NamespaceConfig {
    pub fn capacity_of(&self, ty: NsType) -> usize {
        self.capacity.get(&ty).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default, Deserialize)]
struct NamespaceConfigFile {
    #[serde(default)]
    capacity: HashMap<NsType, usize>,
    #[serde(default)]
    extra_args: HashMap<NsType, Vec<String>>,
    image_store: Option<PathBuf>,
}

/// Load `<root>/namespace_service.json`, merging present keys over defaults
/// (capacity 5 per type, no extra args).
pub fn load_namespace_config(root: &Path) -> Result<NamespaceConfig> {
    let path = root.join(NAMESPACE_CONFIG);
    let file: NamespaceConfigFile = if path.exists() {
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
    } else {
        NamespaceConfigFile::default()
    };

    let mut capacity: HashMap<NsType, usize> =
        NsType::ALL.iter().map(|t| (*t, DEFAULT_CAPACITY)).collect();
    for (ty, n) in &file.capacity {
        capacity.insert(*ty, *n);
    }

    // extra_args carries the per-slot mount refs; any other key is a
    // misconfiguration and is surfaced rather than ignored.
    let mut mount_refs = Vec::new();
    for (ty, args) in file.extra_args {
        match ty {
            NsType::Mnt => mount_refs = args,
            other => {
                return Err(Error::Config(format!(
                    "extra_args are only supported for mnt, found '{other}'"
                )))
            }
        }
    }

    // Warm mount slots are only usable with a ref each; with none configured
    // the mount pool is disabled rather than failing a default setup.
    if mount_refs.is_empty() && capacity_of(&capacity, NsType::Mnt) > 0 {
        warn!("no mount refs configured, disabling the mount namespace pool");
        capacity.insert(NsType::Mnt, 0);
    }

    let mnt_capacity = capacity_of(&capacity, NsType::Mnt);
    if !mount_refs.is_empty() && mount_refs.len() != mnt_capacity {
        return Err(Error::Config(format!(
            "extra_args[mnt] has {} refs but mnt capacity is {mnt_capacity}",
            mount_refs.len()
        )));
    }

    Ok(NamespaceConfig {
        capacity,
        mount_refs,
        image_store: file.image_store.unwrap_or_else(|| root.join("images")),
    })
}

fn capacity_of(capacity: &HashMap<NsType, usize>, ty: NsType) -> usize {
    capacity.get(&ty).copied().unwrap_or(0)
}

/// Tagged checkpoint provider selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum ProviderConfig {
    ContentAddressed(OverlayConfig),
    RuntimeNative(NativeConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Shared content-addressed cache of unpacked checkpoint layers.
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeConfig {
    /// Local store holding `<ref>.tar` archives or `<ref>/` trees.
    pub store_path: PathBuf,
}

/// Load `<root>/checkpoint_service.json`. Missing file, unknown provider
/// type and malformed provider config are all fatal.
pub fn load_checkpoint_config(root: &Path) -> Result<ProviderConfig> {
    let path = root.join(CHECKPOINT_CONFIG);
    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}
