//! Error types for cradle-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A warm pool has no idle slot left. The display form is part of the
    /// wire contract: clients match on the literal text.
    #[error("Exhausted")]
    Exhausted,

    #[error("unknown slot id {0}")]
    UnknownId(usize),

    #[error("slot {0} is not in use")]
    NotInUse(usize),

    #[error("namespace error: {0}")]
    Namespace(String),

    #[error("mount error: {0}")]
    Mount(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
