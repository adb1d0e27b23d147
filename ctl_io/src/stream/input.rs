//! Buffered input over a descriptor.

use std::{os::unix::io::RawFd, path::Path};

use tracing::warn;

use super::Endpoint;
use crate::{
	buffer::{CircularBuffer, FillTo, STREAM_BUFFER_SIZE},
	io::{Errno, Nix, OpenFlags, OpenMode, SyscallProvider},
	state::{
		Failure, FaultKind, Faults, DESCRIPTOR_ORDER, GET_BYTE_ORDER,
		GET_LINE_ORDER, UNTIL_EOF_ORDER,
	},
};

/// How a line returned by [`InputStream::get_line`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
	/// The delimiter was found and consumed.
	Delimiter,
	/// Input ended first. The line holds everything up to the end.
	EndOfInput,
}

/// Input stream. Refills its buffer from the descriptor only when it runs
/// dry.
#[derive(Debug)]
pub struct InputStream<
	S: SyscallProvider = Nix,
	const N: usize = STREAM_BUFFER_SIZE,
> {
	endpoint: Endpoint<S>,
	buf: Option<Box<CircularBuffer<N>>>,
	eof: bool,
	string_failed: bool,
}

impl<const N: usize> Default for InputStream<Nix, N> {
	fn default() -> Self {
		Self::new(Nix)
	}
}

impl<S: SyscallProvider, const N: usize> InputStream<S, N> {
	/// A closed stream with a fresh buffer.
	#[must_use]
	pub fn new(sys: S) -> Self {
		Self::with_buffer(sys, Some(Box::default()))
	}

	/// A closed stream with an externally supplied buffer. Without one the
	/// stream is permanently faulted.
	#[must_use]
	pub fn with_buffer(sys: S, buf: Option<Box<CircularBuffer<N>>>) -> Self {
		Self {
			endpoint: Endpoint::new(sys, None),
			buf,
			eof: false,
			string_failed: false,
		}
	}

	/// A stream over an already open descriptor, which it takes ownership of.
	#[must_use]
	pub fn from_raw_fd(sys: S, fd: RawFd) -> Self {
		let mut stream = Self::new(sys);
		stream.set_fd(fd);
		stream
	}

	/// Open `path` read only.
	pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), Failure> {
		self.open_with_mode(path, OpenFlags::empty(), OpenMode::empty())
	}

	/// Open `path` read only, with extra `flags`.
	pub fn open_with_flags(
		&mut self,
		path: impl AsRef<Path>,
		flags: OpenFlags,
	) -> Result<(), Failure> {
		self.open_with_mode(path, flags, OpenMode::empty())
	}

	/// Open `path` read only, with extra `flags` and a creation `mode`.
	pub fn open_with_mode(
		&mut self,
		path: impl AsRef<Path>,
		flags: OpenFlags,
		mode: OpenMode,
	) -> Result<(), Failure> {
		self.endpoint
			.open(path.as_ref(), OpenFlags::O_RDONLY, flags, mode)
			.map_err(|_| self.failure(DESCRIPTOR_ORDER))
	}

	/// Close the descriptor. Buffered input is kept.
	pub fn close(&mut self) -> Result<(), Failure> {
		self.endpoint.close().map_err(|_| self.failure(DESCRIPTOR_ORDER))
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

	/// Give up the descriptor without closing it.
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
		Faults::new(
			self.eof,
			self.buf.is_none(),
			self.string_failed,
			self.endpoint.io_error(),
		)
	}

	/// Whether no facet is set.
	#[must_use]
	pub fn good(&self) -> bool {
		self.current_state().is_empty()
	}

	/// Whether end of input was reached.
	#[must_use]
	pub fn eof(&self) -> bool {
		self.eof
	}

	/// Whether the stream has no buffer.
	#[must_use]
	pub fn buffer_failure(&self) -> bool {
		self.buf.is_none()
	}

	/// Whether a line destination failed to grow.
	#[must_use]
	pub fn string_failure(&self) -> bool {
		self.string_failed
	}

	/// The saved errno of the last failed syscall.
	#[must_use]
	pub fn io_failure(&self) -> Option<Errno> {
		self.endpoint.io_error()
	}

	/// Reset end of input, string failure and the saved errno. A missing
	/// buffer cannot be cleared.
	pub fn clear(&mut self) {
		self.eof = false;
		self.string_failed = false;
		self.endpoint.clear();
	}

	fn failure(&self, order: &'static [FaultKind]) -> Failure {
		Failure::new(self.current_state(), order)
	}

	/// Read one byte.
	pub fn get_byte(&mut self) -> Result<u8, Failure> {
		// string failure does not affect byte reads
		if self.eof || self.buf.is_none() || self.endpoint.io_error().is_some()
		{
			return Err(self.failure(GET_BYTE_ORDER));
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(GET_BYTE_ORDER));
		};

		if buf.is_empty() {
			match self.endpoint.fill(buf, 1) {
				Ok(0) => {
					self.eof = true;
					return Err(self.failure(GET_BYTE_ORDER));
				}
				Ok(_) => {}
				Err(_) => return Err(self.failure(GET_BYTE_ORDER)),
			}
		}

		let byte = buf.get(0).unwrap_or_default();
		buf.consume(1);
		Ok(byte)
	}

	/// Fill `dest`, refilling as often as needed.
	///
	/// Returns `dest.len()` once it is full. If input ends or a read fails
	/// first, every byte that did arrive is copied to the front of `dest`,
	/// the facet is set and that count is returned; if none arrived, fails.
	pub fn get_exact(&mut self, dest: &mut [u8]) -> Result<usize, Failure> {
		if self.eof || self.buf.is_none() || self.endpoint.io_error().is_some()
		{
			return Err(self.failure(GET_BYTE_ORDER));
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(GET_BYTE_ORDER));
		};

		let mut copied = 0;
		while copied < dest.len() {
			let want = (dest.len() - copied).min(N);
			let outcome = self.endpoint.fill_to(buf, want);

			let take = buf.len().min(want);
			buf.extract(&mut dest[copied..copied + take], 0);
			buf.consume(take);
			copied += take;

			match outcome {
				Ok(FillTo::Complete) => {}
				Ok(FillTo::EndOfInput) => {
					self.eof = true;
					return self.short_read(copied);
				}
				Err(_) => return self.short_read(copied),
			}
		}
		Ok(copied)
	}

	fn short_read(&self, copied: usize) -> Result<usize, Failure> {
		if copied == 0 {
			return Err(self.failure(GET_BYTE_ORDER));
		}
		Ok(copied)
	}

	/// Read the next line into `dest`, replacing its contents. The
	/// delimiter is consumed but not stored.
	///
	/// Fails with the end of file facet if input ended before any byte of a
	/// new line. A final line without a delimiter is returned with
	/// [`LineEnd::EndOfInput`]. If `dest` cannot grow, the bytes already
	/// scanned stay consumed.
	pub fn get_line(
		&mut self,
		dest: &mut Vec<u8>,
		delim: u8,
	) -> Result<LineEnd, Failure> {
		if !self.good() {
			return Err(self.failure(GET_LINE_ORDER));
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(GET_LINE_ORDER));
		};

		if buf.is_empty() {
			match self.endpoint.fill(buf, N) {
				Ok(0) => {
					self.eof = true;
					return Err(self.failure(GET_LINE_ORDER));
				}
				Ok(_) => {}
				Err(_) => return Err(self.failure(GET_LINE_ORDER)),
			}
		}
		dest.clear();

		loop {
			let span = buf.contiguous_span(0);
			let bytes = buf.span(span);
			let found = bytes.iter().position(|&b| b == delim);
			let take = found.unwrap_or(span.len);

			if dest.try_reserve(take).is_err() {
				self.string_failed = true;
				return Err(self.failure(GET_LINE_ORDER));
			}
			dest.extend_from_slice(&bytes[..take]);

			if found.is_some() {
				buf.consume(take + 1);
				return Ok(LineEnd::Delimiter);
			}
			buf.consume(take);

			if buf.is_empty() {
				match self.endpoint.fill(buf, N) {
					Ok(0) => return Ok(LineEnd::EndOfInput),
					Ok(_) => {}
					Err(_) => return Err(self.failure(GET_LINE_ORDER)),
				}
			}
		}
	}

	/// [`Self::get_line`] for callers draining a stream to its end: end of
	/// input before a new line is `Ok(None)` rather than a failure.
	pub fn get_line_until_eof(
		&mut self,
		dest: &mut Vec<u8>,
		delim: u8,
	) -> Result<Option<LineEnd>, Failure> {
		match self.get_line(dest, delim) {
			Ok(end) => Ok(Some(end)),
			Err(failure) => {
				let faults = failure.faults();
				if faults.eof() && faults.first(UNTIL_EOF_ORDER).is_none() {
					Ok(None)
				} else {
					Err(failure.with_order(UNTIL_EOF_ORDER))
				}
			}
		}
	}

	/// [`Self::get_line`] into a `String`. Fails with the string facet if
	/// the line is not UTF-8; the line is consumed either way and `dest` is
	/// left empty. Any other failure leaves `dest` as `get_line` would.
	pub fn get_line_string(
		&mut self,
		dest: &mut String,
		delim: u8,
	) -> Result<LineEnd, Failure> {
		let mut bytes = std::mem::take(dest).into_bytes();
		let result = self.get_line(&mut bytes, delim);
		// on failure `dest` holds whatever `get_line` left in `bytes`
		match String::from_utf8(bytes) {
			Ok(line) => {
				*dest = line;
				result
			}
			Err(_) if result.is_err() => result,
			Err(_) => {
				self.string_failed = true;
				Err(self.failure(GET_LINE_ORDER))
			}
		}
	}
}

impl<S: SyscallProvider, const N: usize> std::io::Read for InputStream<S, N> {
	fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
		if out.is_empty() || self.eof {
			return Ok(0);
		}
		if self.buf.is_none() || self.endpoint.io_error().is_some() {
			return Err(self.failure(GET_BYTE_ORDER).into());
		}
		let Some(buf) = self.buf.as_deref_mut() else {
			return Err(self.failure(GET_BYTE_ORDER).into());
		};

		if buf.is_empty() {
			match self.endpoint.fill(buf, N) {
				Ok(0) => {
					self.eof = true;
					return Ok(0);
				}
				Ok(_) => {}
				Err(errno) => {
					return Err(std::io::Error::from_raw_os_error(errno as i32))
				}
			}
		}

		let count = out.len().min(buf.len());
		buf.extract(&mut out[..count], 0);
		buf.consume(count);
		Ok(count)
	}
}

impl<S: SyscallProvider, const N: usize> Drop for InputStream<S, N> {
	fn drop(&mut self) {
		let Some(fd) = self.fd() else {
			return;
		};
		// do not fail in Drop
		if let Err(errno) = self.endpoint.close() {
			warn!(fd, error = %errno, "close on drop failed");
		}
	}
}
