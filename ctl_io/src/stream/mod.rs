//! Buffered streams over a single descriptor.
//!
//! Both stream kinds own one [`CircularBuffer`] (or none, in which case they
//! are permanently faulted) and at most one descriptor, which they close on
//! drop. Neither is thread safe; one stream serves one connection.

use std::{io::IoSlice, os::unix::io::RawFd, path::Path};

use tracing::debug;

use crate::{
	buffer::{CircularBuffer, FillTo},
	io::{Errno, OpenFlags, OpenMode, SyscallProvider},
};

pub mod input;
pub mod output;

pub use input::{InputStream, LineEnd};
pub use output::OutputStream;

/// The descriptor half of a stream: the gateway, the descriptor and the
/// errno of the last failed syscall. Every failed syscall is recorded here.
#[derive(Debug)]
pub(crate) struct Endpoint<S> {
	sys: S,
	fd: Option<RawFd>,
	io_error: Option<Errno>,
}

impl<S: SyscallProvider> Endpoint<S> {
	pub(crate) fn new(sys: S, fd: Option<RawFd>) -> Self {
		Self { sys, fd, io_error: None }
	}

	pub(crate) fn sys(&self) -> &S {
		&self.sys
	}

	pub(crate) fn fd(&self) -> Option<RawFd> {
		self.fd
	}

	pub(crate) fn io_error(&self) -> Option<Errno> {
		self.io_error
	}

	pub(crate) fn clear(&mut self) {
		self.io_error = None;
	}

	/// Adopt `fd` without closing whatever was held before.
	pub(crate) fn set_fd(&mut self, fd: Option<RawFd>) {
		self.fd = fd;
	}

	pub(crate) fn release(&mut self) -> Option<RawFd> {
		let fd = self.fd.take();
		if let Some(fd) = fd {
			debug!(fd, "released descriptor");
		}
		fd
	}

	fn record(&mut self, errno: Errno) -> Errno {
		self.io_error = Some(errno);
		errno
	}

	fn live_fd(&mut self) -> Result<RawFd, Errno> {
		match self.fd {
			Some(fd) => Ok(fd),
			None => Err(self.record(Errno::EBADF)),
		}
	}

	/// Open `path` with `access | flags`. A descriptor already held is
	/// replaced, not closed.
	pub(crate) fn open(
		&mut self,
		path: &Path,
		access: OpenFlags,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<(), Errno> {
		match self.sys.open(path, access | flags, mode) {
			Ok(fd) => {
				debug!(fd, path = %path.display(), "opened descriptor");
				self.fd = Some(fd);
				Ok(())
			}
			Err(errno) => {
				debug!(path = %path.display(), error = %errno, "open failed");
				self.fd = None;
				Err(self.record(errno))
			}
		}
	}

	/// Close the held descriptor. On failure the descriptor is kept.
	pub(crate) fn close(&mut self) -> Result<(), Errno> {
		let fd = self.live_fd()?;
		if let Err(errno) = self.sys.close(fd) {
			return Err(self.record(errno));
		}
		debug!(fd, "closed descriptor");
		self.fd = None;
		Ok(())
	}

	pub(crate) fn fill<const N: usize>(
		&mut self,
		buf: &mut CircularBuffer<N>,
		limit: usize,
	) -> Result<usize, Errno> {
		let fd = self.live_fd()?;
		buf.fill_at_most(&self.sys, fd, limit)
			.map_err(|errno| self.record(errno))
	}

	pub(crate) fn fill_to<const N: usize>(
		&mut self,
		buf: &mut CircularBuffer<N>,
		threshold: usize,
	) -> Result<FillTo, Errno> {
		let fd = self.live_fd()?;
		buf.fill_to(&self.sys, fd, threshold)
			.map_err(|errno| self.record(errno))
	}

	/// One vectored write. Accepting nothing while data is pending fails with
	/// `EAGAIN`, so callers looping until drained always make progress.
	pub(crate) fn writev(&mut self, iov: &[IoSlice<'_>]) -> Result<usize, Errno> {
		let fd = self.live_fd()?;
		match self.sys.writev(fd, iov) {
			Ok(0) if iov.iter().any(|slice| !slice.is_empty()) => {
				Err(self.record(Errno::EAGAIN))
			}
			Ok(written) => Ok(written),
			Err(errno) => Err(self.record(errno)),
		}
	}
}
