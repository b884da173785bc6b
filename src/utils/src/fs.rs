//! Descriptor level I/O used by the compression layer.
//!
//! Every helper here either completes the whole request or reports the
//! [`Errno`] of the syscall that failed. `EINTR` is retried, nothing else is.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::stat::fstat;
use nix::unistd;

/// Largest piece handed to a single `write(2)`. Some systems refuse writes
/// above `i32::MAX`.
pub const MAX_WRITE: usize = 100 << 20;

/// Amount of already consumed data that stays in the page cache when pages
/// are dropped during a read.
pub const KEEP_BUFFERED: u64 = 10 << 20;

const PAGE_MASK: u64 = !(4096 - 1);

/// Whether `fd` is the process's standard output.
pub fn is_stdout(fd: BorrowedFd<'_>) -> bool {
    fd.as_raw_fd() == libc::STDOUT_FILENO
}

/// Write all of `buf` to `fd`, retrying on interrupts and short writes.
pub fn reliable_write(fd: BorrowedFd<'_>, buf: &[u8]) -> nix::Result<()> {
    let mut offset = 0;
    while offset < buf.len() {
        let end = buf.len().min(offset + MAX_WRITE);
        match unistd::write(fd, &buf[offset..end]) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => offset += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read up to `buf.len()` bytes from `fd` with one syscall, retrying only on
/// interrupts. Returns 0 at end of file.
pub fn reliable_read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> nix::Result<usize> {
    loop {
        match unistd::read(fd.as_raw_fd(), buf) {
            Err(Errno::EINTR) => continue,
            res => return res,
        }
    }
}

pub fn reliable_fsync(fd: BorrowedFd<'_>) -> nix::Result<()> {
    loop {
        match unistd::fsync(fd.as_raw_fd()) {
            Err(Errno::EINTR) => continue,
            res => return res,
        }
    }
}

/// Close `fd` and report the result. An interrupted close is not retried,
/// the descriptor is gone either way.
pub fn reliable_close(fd: OwnedFd) -> nix::Result<()> {
    unistd::close(fd.into_raw_fd())
}

/// Size of the file behind `fd` as reported by `fstat(2)`.
pub fn file_size(fd: BorrowedFd<'_>) -> nix::Result<u64> {
    let stat = fstat(fd.as_raw_fd())?;
    Ok(stat.st_size.max(0) as u64)
}

/// Ask the kernel to drop cached pages of `fd` that lie more than
/// [`KEEP_BUFFERED`] bytes behind `offset`. Advisory only.
///
/// Returns whether advice was given.
pub fn remove_buffered_pages_behind(fd: BorrowedFd<'_>, offset: u64) -> bool {
    if offset > KEEP_BUFFERED {
        let len = (offset & PAGE_MASK).saturating_sub(KEEP_BUFFERED);
        fadvise_dontneed(fd, len);
        true
    } else {
        false
    }
}

/// Ask the kernel to drop all cached pages of `fd`. Advisory only.
pub fn remove_buffered_pages(fd: BorrowedFd<'_>) {
    fadvise_dontneed(fd, 0);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn fadvise_dontneed(fd: BorrowedFd<'_>, len: u64) {
    use nix::fcntl::{PosixFadviseAdvice, posix_fadvise};

    let len = libc::off_t::try_from(len).unwrap_or(libc::off_t::MAX);
    if let Err(e) = posix_fadvise(
        fd.as_raw_fd(),
        0,
        len,
        PosixFadviseAdvice::POSIX_FADV_DONTNEED,
    ) {
        tracing::trace!(fd = fd.as_raw_fd(), %e, "posix_fadvise ignored");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn fadvise_dontneed(_fd: BorrowedFd<'_>, _len: u64) {}

fn is_std_stream(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.as_os_str() == "-"
}

/// Open `path` for reading. An empty path or `-` means standard input.
pub fn open_for_reading(path: impl AsRef<Path>) -> io::Result<OwnedFd> {
    let path = path.as_ref();
    if is_std_stream(path) {
        return Ok(unsafe { OwnedFd::from_raw_fd(libc::STDIN_FILENO) });
    }
    let file = OpenOptions::new().read(true).open(path)?;
    Ok(file.into())
}

/// Open `path` for writing. An empty path or `-` means standard output.
///
/// Existing files are truncated when `overwrite` is set, otherwise opening
/// an existing file fails with `AlreadyExists`.
pub fn open_for_writing(path: impl AsRef<Path>, overwrite: bool) -> io::Result<OwnedFd> {
    let path = path.as_ref();
    if is_std_stream(path) {
        return Ok(unsafe { OwnedFd::from_raw_fd(libc::STDOUT_FILENO) });
    }
    let mut options = OpenOptions::new();
    options.write(true).mode(0o666);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    Ok(options.open(path)?.into())
}
