//! Writes that finish the job
//!
//! `write`, `pwrite` and `writev` may stop short. These wrappers keep going
//! until the whole buffer is written. An interrupted or zero-length write is
//! retried; after ten attempts in a row without progress the call gives up
//! with [`io::ErrorKind::WriteZero`]. Any other error is returned at once.

use std::io::{self, IoSlice};
use std::os::fd::{AsFd, AsRawFd};

const MAX_STALLS: usize = 10;

fn write_loop(size: usize, mut op: impl FnMut(usize) -> isize) -> io::Result<usize> {
    let mut total = 0;
    let mut stalls = 0;
    while total < size {
        stalls += 1;
        if stalls > MAX_STALLS {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("write stalled after {total} of {size} bytes"),
            ));
        }
        let status = op(total);
        if status > 0 {
            stalls = 0;
            total += status as usize;
        } else if status < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
    Ok(total)
}

/// Write all of `buf` to `fd`.
pub fn xwrite<Fd: AsFd>(fd: Fd, buf: &[u8]) -> io::Result<usize> {
    let raw = fd.as_fd().as_raw_fd();
    write_loop(buf.len(), |done| {
        let rest = &buf[done..];
        // SAFETY: rest is a live slice of rest.len() bytes.
        unsafe { libc::write(raw, rest.as_ptr().cast(), rest.len()) }
    })
}

/// Write all of `buf` to `fd` starting at `offset`, leaving the file
/// position alone.
pub fn xpwrite<Fd: AsFd>(fd: Fd, buf: &[u8], offset: u64) -> io::Result<usize> {
    let raw = fd.as_fd().as_raw_fd();
    let Ok(offset) = libc::off_t::try_from(offset) else {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    };
    write_loop(buf.len(), |done| {
        let rest = &buf[done..];
        let at = offset.saturating_add(done as libc::off_t);
        // SAFETY: rest is a live slice of rest.len() bytes.
        unsafe { libc::pwrite(raw, rest.as_ptr().cast(), rest.len(), at) }
    })
}

/// Write every buffer in `bufs` to `fd`, in order.
pub fn xwritev<Fd: AsFd>(fd: Fd, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    let raw = fd.as_fd().as_raw_fd();
    let size = bufs.iter().map(|b| b.len()).sum();
    let mut iov: Vec<libc::iovec> = Vec::with_capacity(bufs.len());

    write_loop(size, |done| {
        iov.clear();
        let mut skip = done;
        for buf in bufs {
            if skip >= buf.len() {
                skip -= buf.len();
                continue;
            }
            let rest = &buf[skip..];
            skip = 0;
            iov.push(libc::iovec {
                iov_base: rest.as_ptr() as *mut libc::c_void,
                iov_len: rest.len(),
            });
        }
        let count = iov.len().min(libc::c_int::MAX as usize) as libc::c_int;
        // SAFETY: every iovec points into a live slice of bufs and writev
        // only reads through them.
        unsafe { libc::writev(raw, iov.as_ptr(), count) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    fn contents(file: &mut std::fs::File) -> Vec<u8> {
        let mut out = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_xwrite() {
        let mut file = tempfile::tempfile().unwrap();
        let data = vec![b'x'; 256 * 1024];
        assert_eq!(xwrite(&file, &data).unwrap(), data.len());
        assert_eq!(contents(&mut file), data);
    }

    #[test]
    fn test_xwrite_empty() {
        let file = tempfile::tempfile().unwrap();
        assert_eq!(xwrite(&file, b"").unwrap(), 0);
    }

    #[test]
    fn test_xpwrite_at_offset() {
        let mut file = tempfile::tempfile().unwrap();
        xwrite(&file, b"hello world").unwrap();
        assert_eq!(xpwrite(&file, b"WORLD", 6).unwrap(), 5);
        assert_eq!(contents(&mut file), b"hello WORLD");
    }

    #[test]
    fn test_xwritev() {
        let mut file = tempfile::tempfile().unwrap();
        let bufs = [IoSlice::new(b"one "), IoSlice::new(b""), IoSlice::new(b"two "), IoSlice::new(b"three")];
        assert_eq!(xwritev(&file, &bufs).unwrap(), 13);
        assert_eq!(contents(&mut file), b"one two three");
    }

    #[test]
    fn test_xwrite_error() {
        let (reader, writer) = std::io::pipe().unwrap();
        drop(reader);
        // With SIGPIPE ignored the write fails with EPIPE.
        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        let err = xwrite(&writer, b"data").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    }

    #[test]
    fn test_stall_gives_up() {
        let mut calls = 0;
        let err = write_loop(4, |_| {
            calls += 1;
            0
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(calls, MAX_STALLS);
    }

    #[test]
    fn test_partial_progress_resets_stalls() {
        let mut calls = 0;
        let written = write_loop(20, |_| {
            calls += 1;
            if calls % 5 == 0 { 2 } else { 0 }
        })
        .unwrap();
        assert_eq!(written, 20);
        assert_eq!(calls, 50);
    }
}
