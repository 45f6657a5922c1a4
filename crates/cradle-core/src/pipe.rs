//! Parent/helper handshake over a pair of pipes
//!
//! The helper signals once its namespaces and mounts are in place; the parent
//! releases it once `/proc/<pid>/ns/<name>` has been captured.

use std::io::{Read, Write};
use std::os::unix::io::FromRawFd;

use crate::{Error, Result};

const READY: u8 = 0;
const FAILED: u8 = 1;
const RELEASE: u8 = 0;

/// Two pipes wired between the daemon and a namespace helper.
#[derive(Debug)]
pub struct HandshakePipe {
    ready_rx: std::fs::File,
    ready_tx: std::fs::File,
    release_rx: std::fs::File,
    release_tx: std::fs::File,
}

impl HandshakePipe {
    pub fn new() -> Result<Self> {
        let (ready_rx, ready_tx) = create_pipe()?;
        let (release_rx, release_tx) = create_pipe()?;

        Ok(Self {
            ready_rx,
            ready_tx,
            release_rx,
            release_tx,
        })
    }

    /// Split into the daemon end and the helper end. Each side keeps only the
    /// two descriptors it uses; the rest close on drop.
    #[must_use]
    pub fn split(self) -> (ParentEnd, HelperEnd) {
        let parent = ParentEnd {
            ready_rx: self.ready_rx,
            release_tx: self.release_tx,
        };

        let helper = HelperEnd {
            ready_tx: self.ready_tx,
            release_rx: self.release_rx,
        };

        (parent, helper)
    }
}

/// Daemon end of the handshake
#[derive(Debug)]
pub struct ParentEnd {
    ready_rx: std::fs::File,
    release_tx: std::fs::File,
}

impl ParentEnd {
    /// Block until the helper reports its setup outcome. An early EOF means
    /// the helper died before signalling.
    pub fn wait_ready(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        match self.ready_rx.read(&mut byte)? {
            0 => Err(Error::Namespace("helper exited before signalling".into())),
            _ if byte[0] == READY => Ok(()),
            _ => Err(Error::Namespace("helper setup failed".into())),
        }
    }

    /// Let the helper exit.
    pub fn release(&mut self) -> Result<()> {
        self.release_tx.write_all(&[RELEASE])?;
        self.release_tx.flush()?;
        Ok(())
    }
}

/// Helper end of the handshake
#[derive(Debug)]
pub struct HelperEnd {
    ready_tx: std::fs::File,
    release_rx: std::fs::File,
}

impl HelperEnd {
    pub fn signal_ready(&mut self) -> Result<()> {
        self.ready_tx.write_all(&[READY])?;
        self.ready_tx.flush()?;
        Ok(())
    }

    pub fn signal_failed(&mut self) -> Result<()> {
        self.ready_tx.write_all(&[FAILED])?;
        self.ready_tx.flush()?;
        Ok(())
    }

    /// Park until the parent releases us. EOF counts as a release so an
    /// aborted parent never leaves the helper behind.
    pub fn wait_release(&mut self) -> Result<()> {
        let mut byte = [0u8; 1];
        let _ = self.release_rx.read(&mut byte)?;
        Ok(())
    }
}

/// Create a pipe (returns read end, write end)
fn create_pipe() -> Result<(std::fs::File, std::fs::File)> {
    let mut fds = [0i32; 2];

    // SAFETY: pipe2 syscall
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };

    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    // SAFETY: we just created these file descriptors
    let read_end = unsafe { std::fs::File::from_raw_fd(fds[0]) };
    let write_end = unsafe { std::fs::File::from_raw_fd(fds[1]) };

    Ok((read_end, write_end))
}
