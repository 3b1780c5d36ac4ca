//! Pipe and descriptor-flag helpers (Unix).

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};

/// Create a unidirectional pipe, returning `(read_end, write_end)`.
///
/// Both ends are close-on-exec; the child only sees the end that gets
/// `dup2`'d onto one of its standard streams.
pub(crate) fn pipe() -> io::Result<(File, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    set_cloexec(&read)?;
    set_cloexec(&write)?;
    Ok((File::from(read), write))
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD)?);
    fcntl(fd, FcntlArg::F_SETFD(flags | FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Switches a descriptor to `O_NONBLOCK` and restores its previous status
/// flags when dropped.
pub(crate) struct NonBlocking<'fd> {
    fd: BorrowedFd<'fd>,
    saved: OFlag,
}

impl<'fd> NonBlocking<'fd> {
    pub(crate) fn enable(fd: &'fd impl AsFd) -> io::Result<Self> {
        let fd = fd.as_fd();
        let saved = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
        fcntl(fd, FcntlArg::F_SETFL(saved | OFlag::O_NONBLOCK))?;
        Ok(Self { fd, saved })
    }
}

impl Drop for NonBlocking<'_> {
    fn drop(&mut self) {
        let _ = fcntl(self.fd, FcntlArg::F_SETFL(self.saved));
    }
}

/// Whether `O_NONBLOCK` is currently set on `fd`.
#[cfg(test)]
pub(crate) fn is_nonblocking(fd: &impl AsFd) -> io::Result<bool> {
    let flags = OFlag::from_bits_truncate(fcntl(fd.as_fd(), FcntlArg::F_GETFL)?);
    Ok(flags.contains(OFlag::O_NONBLOCK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn guard_restores_blocking_mode() {
        let (read, _write) = pipe().unwrap();
        assert!(!is_nonblocking(&read).unwrap());
        {
            let _guard = NonBlocking::enable(&read).unwrap();
            assert!(is_nonblocking(&read).unwrap());
        }
        assert!(!is_nonblocking(&read).unwrap());
    }

    #[test]
    fn both_ends_are_close_on_exec() {
        let (read, write) = pipe().unwrap();
        for fd in [read.as_fd(), write.as_fd()] {
            let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD).unwrap());
            assert!(flags.contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn empty_pipe_would_block_under_guard() {
        let (read, _write) = pipe().unwrap();
        let _guard = NonBlocking::enable(&read).unwrap();
        let mut buf = [0u8; 8];
        let err = (&read).read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn bytes_flow_from_write_to_read_end() {
        let (mut read, write) = pipe().unwrap();
        let mut write = File::from(write);
        write.write_all(b"ping\n").unwrap();
        drop(write);
        let mut text = String::new();
        read.read_to_string(&mut text).unwrap();
        assert_eq!(text, "ping\n");
    }
}
