//! Raw direct-I/O syscalls the log file is built on (§4.4). Pulled out
//! behind plain functions so [`crate::log::FileLog`] can drive them through
//! `tokio::task::spawn_blocking` without smearing `unsafe` through the
//! higher-level logic. Every log's block alignment is the provider's
//! configured `block-size` (`bake_common::config::DEFAULT_BLOCK_SIZE` when
//! unset), not a fixed constant — `FileLog` carries it and these helpers
//! take it as a parameter so a deployment that tunes `block-size` actually
//! changes the on-disk layout, not just the buffer pool.

use bake_common::BakeError;
use std::os::unix::io::RawFd;

pub fn align_up(x: u64, alignment: u64) -> u64 {
    bake_backend::align_up(x, alignment)
}

pub fn align_down(x: u64, alignment: u64) -> u64 {
    bake_backend::align_down(x, alignment)
}

pub fn pread_exact(fd: RawFd, buf: &mut [u8], offset: u64) -> Result<(), BakeError> {
    let n = unsafe {
        libc::pread(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    };
    if n < 0 {
        return Err(io_error("pread"));
    }
    if n as usize != buf.len() {
        return Err(BakeError::Io(format!(
            "short read: wanted {} bytes, got {}",
            buf.len(),
            n
        )));
    }
    Ok(())
}

pub fn pwrite_all(fd: RawFd, buf: &[u8], offset: u64) -> Result<(), BakeError> {
    let n = unsafe {
        libc::pwrite(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            offset as libc::off_t,
        )
    };
    if n < 0 {
        return Err(io_error("pwrite"));
    }
    if n as usize != buf.len() {
        return Err(BakeError::Io(format!(
            "short write: wanted {} bytes, wrote {}",
            buf.len(),
            n
        )));
    }
    Ok(())
}

pub fn fdatasync(fd: RawFd) -> Result<(), BakeError> {
    let ret = unsafe { libc::fdatasync(fd) };
    if ret != 0 {
        return Err(io_error("fdatasync"));
    }
    Ok(())
}

/// Punches a hole over `[offset, offset+len)`, releasing the underlying
/// blocks without shifting any other log entry (§4.2 "remove").
#[cfg(target_os = "linux")]
pub fn punch_hole(fd: RawFd, offset: u64, len: u64) -> Result<(), BakeError> {
    let ret = unsafe {
        libc::fallocate(
            fd,
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            len as libc::off_t,
        )
    };
    if ret != 0 {
        return Err(io_error("fallocate"));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn punch_hole(_fd: RawFd, _offset: u64, _len: u64) -> Result<(), BakeError> {
    Err(BakeError::op_unsupported("remove (hole-punching requires Linux)"))
}

fn io_error(call: &str) -> BakeError {
    BakeError::Io(format!("{call}: {}", std::io::Error::last_os_error()))
}
