//! Mount syscall wrappers for rootfs assembly
//!
//! Used inside mount-namespace helpers (overlay + bind assembly) and by the
//! content-addressed checkpoint provider on the daemon side.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Stop mount events from propagating back to the host mount table. Must run
/// inside a freshly unshared mount namespace before anything is mounted.
pub fn make_private_recursive() -> Result<()> {
    let root = path_to_cstring(Path::new("/"))?;

    // SAFETY: mount syscall changing propagation only
    let ret = unsafe {
        libc::mount(
            std::ptr::null(),
            root.as_ptr(),
            std::ptr::null(),
            libc::MS_PRIVATE | libc::MS_REC,
            std::ptr::null(),
        )
    };

    if ret != 0 {
        return Err(Error::Mount(format!(
            "failed to make / private: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

pub fn bind_mount(src: &Path, dst: &Path) -> Result<()> {
    let src_c = path_to_cstring(src)?;
    let dst_c = path_to_cstring(dst)?;

    // SAFETY: mount syscall with bind flag
    let ret = unsafe {
        libc::mount(
            src_c.as_ptr(),
            dst_c.as_ptr(),
            std::ptr::null(),
            libc::MS_BIND | libc::MS_REC,
            std::ptr::null(),
        )
    };

    if ret != 0 {
        return Err(Error::Mount(format!(
            "failed to bind mount {} to {}: {}",
            src.display(),
            dst.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

pub fn remount_readonly(path: &Path) -> Result<()> {
    let path_c = path_to_cstring(path)?;

    // SAFETY: mount syscall to remount read-only
    let ret = unsafe {
        libc::mount(
            std::ptr::null(),
            path_c.as_ptr(),
            std::ptr::null(),
            libc::MS_BIND | libc::MS_REMOUNT | libc::MS_RDONLY,
            std::ptr::null(),
        )
    };

    if ret != 0 {
        return Err(Error::Mount(format!(
            "failed to remount {} read-only: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Mount an overlay at `target` from a non-empty lower stack. The first
/// element of `lower` is the topmost layer, matching overlayfs `lowerdir`
/// ordering.
pub fn mount_overlay(lower: &[PathBuf], upper: &Path, work: &Path, target: &Path) -> Result<()> {
    if lower.is_empty() {
        return Err(Error::Mount(format!(
            "no lower layers for overlay at {}",
            target.display()
        )));
    }

    let lowerdir = lower
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    let data = format!(
        "lowerdir={lowerdir},upperdir={},workdir={}",
        upper.display(),
        work.display()
    );

    let target_c = path_to_cstring(target)?;
    let fstype = CString::new("overlay")
        .map_err(|e| Error::Mount(format!("invalid fstype: {e}")))?;
    let data_c = CString::new(data)
        .map_err(|e| Error::Mount(format!("invalid overlay options: {e}")))?;

    // SAFETY: mount syscall with overlay fstype and option string
    let ret = unsafe {
        libc::mount(
            fstype.as_ptr(),
            target_c.as_ptr(),
            fstype.as_ptr(),
            0,
            data_c.as_ptr().cast::<libc::c_void>(),
        )
    };

    if ret != 0 {
        return Err(Error::Mount(format!(
            "failed to mount overlay at {}: {}",
            target.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

pub fn umount_detach(path: &Path) -> Result<()> {
    let path_c = path_to_cstring(path)?;

    // SAFETY: umount2 syscall
    let ret = unsafe { libc::umount2(path_c.as_ptr(), libc::MNT_DETACH) };

    if ret != 0 {
        return Err(Error::Mount(format!(
            "umount2 failed for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| Error::Mount(format!("invalid path {}: {}", path.display(), e)))
}
