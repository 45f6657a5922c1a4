//! clone3 syscall wrapper for short-lived namespace helpers

use libc::pid_t;

use crate::{Error, Result};

/// clone3 clone_args structure, CLONE_ARGS_SIZE_VER0 layout (from
/// linux/sched.h). The trailing set_tid/cgroup fields are not needed here;
/// the kernel accepts the 64-byte VER0 size.
#[repr(C)]
#[derive(Debug, Default)]
struct CloneArgs {
    flags: u64,
    pidfd: u64,
    child_tid: u64,
    parent_tid: u64,
    exit_signal: u64,
    stack: u64,
    stack_size: u64,
    tls: u64,
}

unsafe fn clone3(args: &CloneArgs) -> Result<pid_t> {
    // SAFETY: clone3 with a valid VER0-sized argument block
    let ret = unsafe {
        libc::syscall(
            libc::SYS_clone3,
            args as *const CloneArgs,
            std::mem::size_of::<CloneArgs>(),
        )
    };

    if ret == -1 {
        return Err(Error::Namespace(format!(
            "clone3 failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(ret as pid_t)
}

/// Fork a helper process running `child_fn`; the helper's exit status is the
/// closure's return value. The parent must reap the helper with `waitpid`.
pub fn spawn_helper(child_fn: impl FnOnce() -> i32) -> Result<pid_t> {
    let args = CloneArgs {
        exit_signal: u64::from(libc::SIGCHLD as u32),
        ..Default::default()
    };

    // SAFETY: forking the process with clone3
    let pid = unsafe { clone3(&args)? };

    if pid == 0 {
        // Child process
        let code = child_fn();
        // SAFETY: exiting the child without running parent-owned destructors
        unsafe { libc::_exit(code) };
    }

    // Parent process
    Ok(pid)
}
