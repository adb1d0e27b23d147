//! Syscall gateway for the streams.
//!
//! NOTE TO MAINTAINERS: Interaction with any sys calls should be contained
//! within this module.

use std::{io::IoSlice, os::unix::io::RawFd, path::Path};

pub use nix::{
	errno::Errno, fcntl::OFlag as OpenFlags, sys::stat::Mode as OpenMode,
};

#[cfg(any(feature = "mock", test))]
pub mod mock;

/// The descriptor syscalls the buffers and streams depend on. This is made
/// generic so a mock gateway can be subbed in for testing. In production use
/// [`Nix`].
pub trait SyscallProvider {
	/// Open `path` and return the new descriptor.
	fn open(
		&self,
		path: &Path,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<RawFd, Errno>;

	/// Close `fd`.
	fn close(&self, fd: RawFd) -> Result<(), Errno>;

	/// Read up to `buf.len()` bytes from `fd`. `Ok(0)` means end of input.
	fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno>;

	/// Write the concatenation of `iov` to `fd` with a single call. May write
	/// fewer bytes than requested.
	fn writev(&self, fd: RawFd, iov: &[IoSlice<'_>]) -> Result<usize, Errno>;
}

/// Syscalls backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nix;

impl SyscallProvider for Nix {
	fn open(
		&self,
		path: &Path,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<RawFd, Errno> {
		nix::fcntl::open(path, flags, mode)
	}

	fn close(&self, fd: RawFd) -> Result<(), Errno> {
		// Linux releases the descriptor even when close is interrupted, so
		// this is never retried.
		nix::unistd::close(fd)
	}

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
		loop {
			match nix::unistd::read(fd, buf) {
				// https://stackoverflow.com/questions/1674162/how-to-handle-eintr-interrupted-system-call#1674348
				// Not necessarily actually an error, just the syscall was
				// interrupted while in progress.
				Err(Errno::EINTR) => continue,
				result => return result,
			}
		}
	}

	fn writev(&self, fd: RawFd, iov: &[IoSlice<'_>]) -> Result<usize, Errno> {
		loop {
			match nix::sys::uio::writev(fd, iov) {
				Err(Errno::EINTR) => continue,
				result => return result,
			}
		}
	}
}

impl<T: SyscallProvider + ?Sized> SyscallProvider for &T {
	fn open(
		&self,
		path: &Path,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<RawFd, Errno> {
		(**self).open(path, flags, mode)
	}

	fn close(&self, fd: RawFd) -> Result<(), Errno> {
		(**self).close(fd)
	}

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
		(**self).read(fd, buf)
	}

	fn writev(&self, fd: RawFd, iov: &[IoSlice<'_>]) -> Result<usize, Errno> {
		(**self).writev(fd, iov)
	}
}
