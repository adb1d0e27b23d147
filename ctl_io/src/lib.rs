//! Buffered byte streams over raw file descriptors, for control processes
//! that talk over pipes, sockets and regular files.
//!
//! Every stream owns a fixed size [`CircularBuffer`] and issues as few
//! syscalls as it can: an [`OutputStream`] only writes once its buffer would
//! overflow (or on an explicit flush), and an [`InputStream`] only reads once
//! its buffer runs dry.
//!
//! Operations return `Result<_, Failure>`. A [`Failure`] carries every fault
//! facet set on the stream, and converts into a single [`StreamError`] with
//! `?`.
//!
//! # Maintainers Notes
//!
//! All syscalls go through [`SyscallProvider`]. Enable the `mock` feature to
//! get an in-memory gateway for tests.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod buffer;
pub mod decimal;
pub mod error;
pub mod io;
pub mod state;
pub mod stream;

pub use buffer::{CircularBuffer, StreamBuffer, STREAM_BUFFER_SIZE};
pub use error::StreamError;
pub use io::{Nix, SyscallProvider};
pub use state::{Failure, FaultKind, Faults};
pub use stream::{InputStream, LineEnd, OutputStream};
