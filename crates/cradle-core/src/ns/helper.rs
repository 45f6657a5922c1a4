//! Out-of-process namespace creation
//!
//! A namespace must outlive the task that unshared it, so creation happens in
//! a disposable child: the child unshares, runs the caller's in-namespace
//! setup, and parks; the daemon opens the child's `/proc/<pid>/ns/<name>`
//! entry and only then lets the child exit. The kernel keeps the namespace
//! (and, for mount namespaces, everything mounted in it) alive through the
//! open descriptor.

use std::fs::File;
use std::os::fd::OwnedFd;

use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use super::{clone, NsType};
use crate::pipe::{HandshakePipe, HelperEnd};
use crate::{Error, Result};

/// Create one namespace of kind `ty` and return a descriptor that keeps it
/// alive. `setup` runs inside the helper after `unshare(2)` succeeds, with
/// the new namespace already active; mount managers use it to assemble the
/// rootfs visible from within.
pub fn acquire_namespace(ty: NsType, setup: impl FnOnce() -> Result<()>) -> Result<OwnedFd> {
    let (mut parent, helper) = HandshakePipe::new()?.split();

    let pid = clone::spawn_helper(move || helper_main(ty, setup, helper))?;

    let result = capture(ty, pid, &mut parent);

    // Release and reap the helper on both paths; a helper stuck in
    // wait_release would otherwise survive a failed capture.
    let _ = parent.release();
    if let Err(e) = waitpid(Pid::from_raw(pid), None) {
        tracing::warn!(pid, error = %e, "failed to reap namespace helper");
    }

    result
}

fn capture(ty: NsType, pid: libc::pid_t, parent: &mut crate::pipe::ParentEnd) -> Result<OwnedFd> {
    parent.wait_ready()?;

    let path = format!("/proc/{pid}/ns/{}", ty.proc_name());
    let file = File::open(&path)
        .map_err(|e| Error::Namespace(format!("failed to open {path}: {e}")))?;

    tracing::debug!(%ty, pid, "captured namespace descriptor");
    Ok(OwnedFd::from(file))
}

fn helper_main(ty: NsType, setup: impl FnOnce() -> Result<()>, mut pipe: HelperEnd) -> i32 {
    if let Err(e) = unshare_and_setup(ty, setup) {
        tracing::error!(%ty, error = %e, "namespace helper setup failed");
        let _ = pipe.signal_failed();
        return 1;
    }

    if pipe.signal_ready().is_err() {
        return 1;
    }

    // Hold the namespace open until the daemon has its descriptor.
    let _ = pipe.wait_release();
    0
}

fn unshare_and_setup(ty: NsType, setup: impl FnOnce() -> Result<()>) -> Result<()> {
    nix::sched::unshare(ty.clone_flag())
        .map_err(|e| Error::Namespace(format!("failed to unshare {ty}: {e}")))?;
    setup()
}
