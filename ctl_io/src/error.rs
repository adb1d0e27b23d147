//! Errors raised by stream operations.

use std::fmt;

use crate::{io::Errno, state::Failure};

/// The single error a failed stream operation surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
	/// A read found no more input.
	EndOfFile,
	/// The stream has no buffer to work with.
	BufferMissing,
	/// A line could not be stored in the destination.
	StringFailure,
	/// A syscall failed with the wrapped errno.
	System(Errno),
}

impl fmt::Display for StreamError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::EndOfFile => f.write_str("End Of File has been reached."),
			Self::BufferMissing => {
				f.write_str("Cannot use stream's buffer: buffer is missing!")
			}
			Self::StringFailure => {
				f.write_str("Cannot put lines into given string.")
			}
			Self::System(errno) => write!(f, "{}", errno.desc()),
		}
	}
}

impl std::error::Error for StreamError {}

impl From<Failure> for StreamError {
	fn from(failure: Failure) -> Self {
		failure.raise()
	}
}

impl From<StreamError> for std::io::Error {
	fn from(err: StreamError) -> Self {
		match err {
			StreamError::EndOfFile => {
				Self::new(std::io::ErrorKind::UnexpectedEof, err)
			}
			StreamError::BufferMissing => Self::other(err),
			StreamError::StringFailure => {
				Self::new(std::io::ErrorKind::OutOfMemory, err)
			}
			StreamError::System(errno) => Self::from_raw_os_error(errno as i32),
		}
	}
}

impl From<Failure> for std::io::Error {
	fn from(failure: Failure) -> Self {
		failure.raise().into()
	}
}
