//! Linux namespace primitives
//!
//! A warm namespace is created by a short-lived helper process that unshares
//! the requested namespace, runs any in-namespace setup, and then parks until
//! the daemon has captured `/proc/<helper>/ns/<name>`. The open file
//! descriptor keeps the namespace alive after the helper exits.

mod clone;
mod helper;

pub use helper::acquire_namespace;

use std::fmt;
use std::str::FromStr;

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The namespace kinds the daemon pre-provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NsType {
    Uts,
    Ipc,
    Mnt,
}

impl NsType {
    pub const ALL: [Self; 3] = [Self::Uts, Self::Ipc, Self::Mnt];

    /// The `unshare(2)` flag creating this namespace kind.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Mnt => CloneFlags::CLONE_NEWNS,
        }
    }

    /// The entry name under `/proc/<pid>/ns/`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Mnt => "mnt",
        }
    }
}

impl fmt::Display for NsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

impl FromStr for NsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uts" => Ok(Self::Uts),
            "ipc" => Ok(Self::Ipc),
            "mnt" => Ok(Self::Mnt),
            other => Err(Error::InvalidArgument(format!(
                "unknown namespace type '{other}'"
            ))),
        }
    }
}
