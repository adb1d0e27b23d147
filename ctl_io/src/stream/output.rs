//! Buffered output over a descriptor, drained with vectored writes.

use std::{io::IoSlice, os::unix::io::RawFd, path::Path};

use tracing::warn;

use super::Endpoint;
use crate::{
	buffer::{CircularBuffer, STREAM_BUFFER_SIZE},
	decimal,
	io::{Errno, Nix, OpenFlags, OpenMode, SyscallProvider},
	state::{Failure, FaultKind, Faults, DESCRIPTOR_ORDER, OUTPUT_ORDER},
};

/// Output stream. Bytes count as written once they are buffered; they reach
/// the descriptor when the buffer would overflow, on [`Self::flush`], on
/// [`Self::close`] and on drop.
#[derive(Debug)]
pub struct OutputStream<
	S: SyscallProvider = Nix,
	const N: usize = STREAM_BUFFER_SIZE,
> {
	endpoint: Endpoint<S>,
	buf: Option<Box<CircularBuffer<N>>>,
}

impl<const N: usize> Default for OutputStream<Nix, N> {
	fn default() -> Self {
		Self::new(Nix)
	}
}

impl<S: SyscallProvider, const N: usize> OutputStream<S, N> {
	/// A closed stream with a fresh buffer.
	#[must_use]
	pub fn new(sys: S) -> Self {
		Self::with_buffer(sys, Some(Box::default()))
	}

	/// A closed stream with an externally supplied buffer. Without one the
	/// stream is permanently faulted.
	#[must_use]
	pub fn with_buffer(sys: S, buf: Option<Box<CircularBuffer<N>>>) -> Self {
		Self { endpoint: Endpoint::new(sys, None), buf }
	}

	/// A stream over an already open descriptor, which it takes ownership of.
	#[must_use]
	pub fn from_raw_fd(sys: S, fd: RawFd) -> Self {
		let mut stream = Self::new(sys);
		stream.set_fd(fd);
		stream
	}

	/// Open `path` write only.
	pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), Failure> {
		self.open_with_mode(path, OpenFlags::empty(), OpenMode::empty())
	}

	/// Open `path` write only, with extra `flags`.
	pub fn open_with_flags(
		&mut self,
		path: impl AsRef<Path>,
		flags: OpenFlags,
	) -> Result<(), Failure> {
		self.open_with_mode(path, flags, OpenMode::empty())
	}

	/// Open `path` write only, with extra `flags` and a creation `mode`.
	pub fn open_with_mode(
		&mut self,
		path: impl AsRef<Path>,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<(), Failure> {
		self.endpoint
			.open(path.as_ref(), OpenFlags::O_WRONLY, flags, mode)
			.map_err(|_| self.failure(DESCRIPTOR_ORDER))
	}

	/// Flush, then close the descriptor. If the flush fails the descriptor
	/// stays open.
	pub fn close(&mut self) -> Result<(), Failure> {
		self.flush()?;
		self.endpoint.close().map_err(|_| self.failure(OUTPUT_ORDER))
	}

	/// The held descriptor.
	#[must_use]
	pub fn fd(&self) -> Option<RawFd> {
		self.endpoint.fd()
	}

	/// Whether a descriptor is held.
	#[must_use]
	pub fn is_open(&self) -> bool {
		self.endpoint.fd().is_some()
	}

	/// Take ownership of `fd`. A descriptor already held is not closed.
	pub fn set_fd(&mut self, fd: RawFd) {
		self.endpoint.set_fd(Some(fd));
	}

	/// Give up the descriptor without flushing or closing it.
	pub fn release_fd(&mut self) -> Option<RawFd> {
		self.endpoint.release()
	}

	/// The backing buffer, if any.
	#[must_use]
	pub fn buffer(&self) -> Option<&CircularBuffer<N>> {
		self.buf.as_deref()
	}

	/// The syscall gateway.
	#[must_use]
	pub fn sys(&self) -> &S {
		self.endpoint.sys()
	}

	/// Facets currently set.
	#[must_use]
	pub fn current_state(&self) -> Faults {
		Faults::new(false, self.buf.is_none(), false, self.endpoint.io_error())
	}

	/// Whether no facet is set.
	#[must_use]
	pub fn good(&self) -> bool {
		self.current_state().is_empty()
	}

	/// Whether the stream has no buffer.
	#[must_use]
	pub fn buffer_failure(&self) -> bool {
		self.buf.is_none()
	}

	/// The saved errno of the last failed syscall.
	#[must_use]
	pub fn io_failure(&self) -> Option<Errno> {
		self.endpoint.io_error()
	}

	/// Reset the saved errno. A missing buffer cannot be cleared.
	pub fn clear(&mut self) {
		self.endpoint.clear();
	}

	fn failure(&self, order: &'static [FaultKind]) -> Failure {
		Failure::new(self.current_state(), order)
	}

	/// Queue `data`, writing out as much as needed to make it fit.
	///
	/// Returns `data.len()` once everything is buffered or written. If a
	/// write fails after part of `data` already went out, returns the count
	/// that did; if none did, fails.
	pub fn put(&mut self, data: &[u8]) -> Result<usize, Failure> {
		if !self.good() {
			return Err(self.failure(OUTPUT_ORDER));
		}
		if data.is_empty() {
			return Ok(0);
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(OUTPUT_ORDER));
		};

		let mut remaining = data;
		while remaining.len() > buf.free() {
			let queued = buf.len();
			let result = {
				let [head, tail] = buf.io_slices();
				self.endpoint.writev(&[head, tail, IoSlice::new(remaining)])
			};
			let written = match result {
				Ok(written) => written,
				Err(_) => {
					let accepted = data.len() - remaining.len();
					if accepted > 0 {
						return Ok(accepted);
					}
					return Err(self.failure(OUTPUT_ORDER));
				}
			};

			if written >= queued {
				buf.consume(queued);
				remaining = &remaining[written - queued..];
			} else {
				// none of `remaining` went out
				buf.consume(written);
			}

			if remaining.is_empty() {
				return Ok(data.len());
			}
		}

		buf.append(remaining);
		Ok(data.len())
	}

	/// Write out everything buffered.
	pub fn flush(&mut self) -> Result<(), Failure> {
		if !self.good() {
			return Err(self.failure(OUTPUT_ORDER));
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(OUTPUT_ORDER));
		};

		while !buf.is_empty() {
			let result = self.endpoint.writev(&buf.io_slices());
			match result {
				Ok(written) => buf.consume(written),
				Err(_) => return Err(self.failure(OUTPUT_ORDER)),
			}
		}
		Ok(())
	}

	/// [`Self::put`] under its write-helper name.
	pub fn write_buf(&mut self, data: &[u8]) -> Result<usize, Failure> {
		self.put(data)
	}

	/// [`Self::put`] for a string.
	pub fn write_buf_str(&mut self, msg: &str) -> Result<usize, Failure> {
		self.put(msg.as_bytes())
	}

	/// Queue all of `data`; a partial write is a failure.
	pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Failure> {
		if self.put(data)? == data.len() {
			Ok(())
		} else {
			Err(self.failure(OUTPUT_ORDER))
		}
	}

	/// Queue all of `msg`.
	pub fn write_str(&mut self, msg: &str) -> Result<(), Failure> {
		self.write_bytes(msg.as_bytes())
	}

	/// Queue one byte.
	pub fn write_byte(&mut self, byte: u8) -> Result<(), Failure> {
		self.write_bytes(&[byte])
	}

	/// Queue the UTF-8 encoding of `c`.
	pub fn write_char(&mut self, c: char) -> Result<(), Failure> {
		let mut tmp = [0u8; 4];
		self.write_str(c.encode_utf8(&mut tmp))
	}

	/// Queue `num` in decimal.
	pub fn write_i32(&mut self, num: i32) -> Result<(), Failure> {
		let mut tmp = [0u8; decimal::I32_MAX_CHARS];
		self.write_bytes(decimal::encode_i32(num, &mut tmp))
	}

	/// Queue `num` in decimal.
	pub fn write_u32(&mut self, num: u32) -> Result<(), Failure> {
		let mut tmp = [0u8; decimal::U32_MAX_CHARS];
		self.write_bytes(decimal::encode_u32(num, &mut tmp))
	}

	/// Queue `num` in decimal.
	pub fn write_i64(&mut self, num: i64) -> Result<(), Failure> {
		let mut tmp = [0u8; decimal::I64_MAX_CHARS];
		self.write_bytes(decimal::encode_i64(num, &mut tmp))
	}

	/// Queue `num` in decimal.
	pub fn write_u64(&mut self, num: u64) -> Result<(), Failure> {
		let mut tmp = [0u8; decimal::U64_MAX_CHARS];
		self.write_bytes(decimal::encode_u64(num, &mut tmp))
	}

	/// Queue a newline, then flush.
	pub fn endl(&mut self) -> Result<(), Failure> {
		self.write_byte(b'\n')?;
		self.flush()
	}
}

impl<S: SyscallProvider, const N: usize> std::io::Write for OutputStream<S, N> {
	fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
		Ok(self.put(data)?)
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(OutputStream::flush(self)?)
	}
}

impl<S: SyscallProvider, const N: usize> Drop for OutputStream<S, N> {
	fn drop(&mut self) {
		let Some(fd) = self.fd() else {
			return;
		};
		// do not fail in Drop
		if let Err(failure) = self.flush() {
			warn!(fd, error = %failure.raise(), "flush on drop failed");
		}
		if let Err(errno) = self.endpoint.close() {
			warn!(fd, error = %errno, "close on drop failed");
		}
	}
}
