//! Checkpoint providers
//!
//! A provider materialises the checkpoint tree for a ref into a target
//! directory and removes it again at shutdown. Exactly one provider is
//! active per daemon instance, selected by the tagged checkpoint config.

pub mod native;
pub mod overlay;

use std::path::Path;

use cradle_core::Result;

use crate::config::ProviderConfig;

pub use native::NativeProvider;
pub use overlay::OverlayProvider;

pub trait Provider: Send + Sync {
    /// Materialise the checkpoint for `reference` into `target`. The target
    /// directory exists and is empty.
    fn prepare(&self, reference: &str, target: &Path) -> Result<()>;

    /// Tear down a previously prepared target.
    fn remove(&self, target: &Path) -> Result<()>;

    /// Reference-counting capability, advertised by providers whose backing
    /// cache tracks liveness. Discovered by this check, never by downcasting.
    fn ref_counter(&self) -> Option<&dyn RefCounter> {
        None
    }
}

pub trait RefCounter: Send + Sync {
    fn add(&self, reference: &str);
}

pub fn from_config(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::ContentAddressed(c) => Ok(Box::new(OverlayProvider::new(c)?)),
        ProviderConfig::RuntimeNative(c) => Ok(Box::new(NativeProvider::new(c)?)),
    }
}
