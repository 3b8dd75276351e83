use std::fs::File;
use std::io::{Error, Result};
use std::os::fd::{AsRawFd, FromRawFd};

use perf_event_open_sys as sys;

use super::Attr;

pub fn perf_event_open(
    attr: &mut Attr,
    pid: i32,
    cpu: i32,
    group_fd: i32,
    flags: u64,
) -> Result<File> {
    let fd = unsafe { sys::perf_event_open(attr, pid, cpu, group_fd, flags as _) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd) })
    } else {
        Err(Error::last_os_error())
    }
}

/// Starts the counter, or the whole group if `flags` contains
/// `PERF_IOC_FLAG_GROUP` and `file` is a group leader.
pub fn ioctl_enable(file: &File, flags: u32) -> Result<()> {
    let result = unsafe { sys::ioctls::ENABLE(file.as_raw_fd(), flags) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_disable(file: &File, flags: u32) -> Result<()> {
    let result = unsafe { sys::ioctls::DISABLE(file.as_raw_fd(), flags) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Clears event counts, leaving `time_enabled` and `time_running` untouched.
pub fn ioctl_reset(file: &File, flags: u32) -> Result<()> {
    let result = unsafe { sys::ioctls::RESET(file.as_raw_fd(), flags) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn read(file: &File, buf: &mut [u8]) -> Result<usize> {
    let fd = file.as_raw_fd();
    let count = buf.len();
    let buf = buf.as_mut_ptr() as _;
    let bytes = unsafe { libc::read(fd, buf, count) };
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

/// The number of processors currently online.
pub fn online_cpu_count() -> usize {
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if count < 1 {
        1
    } else {
        count as _
    }
}

/// Null-signal probe, see `kill(2)`.
///
/// Returns false only if the kernel reports the process as gone (`ESRCH`);
/// permission errors still mean the process exists.
pub fn process_exists(pid: i32) -> bool {
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}
