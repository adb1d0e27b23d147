//! Fault facets of a stream.
//!
//! A stream tracks up to four independent facets. They stay set until the
//! stream is cleared. When an operation fails, the facets are captured in a
//! [`Failure`] together with the order that operation uses to decide which
//! single facet to surface as a [`StreamError`].

use crate::{error::StreamError, io::Errno};

/// One independently tracked failure condition. The declaration order is the
/// total order used when several facets are set at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaultKind {
	/// The descriptor reported end of input. Input streams only.
	EndOfFile,
	/// The stream has no backing buffer.
	BufferMissing,
	/// Growing the destination of a line read failed. Input streams only.
	StringFailure,
	/// The last syscall failed. The saved errno is in [`Faults::io_error`].
	Io,
}

impl FaultKind {
	/// Every facet, in surfacing order.
	pub const ALL: [FaultKind; 4] = [
		FaultKind::EndOfFile,
		FaultKind::BufferMissing,
		FaultKind::StringFailure,
		FaultKind::Io,
	];

	const fn bit(self) -> u8 {
		1 << self as u8
	}
}

/// Surfacing order for output stream operations.
pub(crate) const OUTPUT_ORDER: &[FaultKind] =
	&[FaultKind::BufferMissing, FaultKind::Io];
/// Surfacing order for open, and for closing an input stream.
pub(crate) const DESCRIPTOR_ORDER: &[FaultKind] = &[FaultKind::Io];
/// Surfacing order for byte reads.
pub(crate) const GET_BYTE_ORDER: &[FaultKind] =
	&[FaultKind::EndOfFile, FaultKind::BufferMissing, FaultKind::Io];
/// Surfacing order for line reads.
pub(crate) const GET_LINE_ORDER: &[FaultKind] = &FaultKind::ALL;
/// Surfacing order for line reads that treat end of input as a normal end.
pub(crate) const UNTIL_EOF_ORDER: &[FaultKind] =
	&[FaultKind::BufferMissing, FaultKind::StringFailure, FaultKind::Io];

/// Snapshot of the facets set on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Faults {
	bits: u8,
	io_error: Option<Errno>,
}

impl Faults {
	/// No facet set.
	#[must_use]
	pub const fn none() -> Self {
		Self { bits: 0, io_error: None }
	}

	pub(crate) fn new(
		eof: bool,
		buffer_missing: bool,
		string_failed: bool,
		io_error: Option<Errno>,
	) -> Self {
		let mut faults = Self { bits: 0, io_error };
		for (kind, set) in [
			(FaultKind::EndOfFile, eof),
			(FaultKind::BufferMissing, buffer_missing),
			(FaultKind::StringFailure, string_failed),
			(FaultKind::Io, io_error.is_some()),
		] {
			if set {
				faults.bits |= kind.bit();
			}
		}
		faults
	}

	/// Whether no facet is set.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.bits == 0
	}

	/// Whether `kind` is set.
	#[must_use]
	pub fn contains(&self, kind: FaultKind) -> bool {
		self.bits & kind.bit() != 0
	}

	/// End of input was reached.
	#[must_use]
	pub fn eof(&self) -> bool {
		self.contains(FaultKind::EndOfFile)
	}

	/// The stream has no buffer.
	#[must_use]
	pub fn buffer_missing(&self) -> bool {
		self.contains(FaultKind::BufferMissing)
	}

	/// A line destination could not grow.
	#[must_use]
	pub fn string_failed(&self) -> bool {
		self.contains(FaultKind::StringFailure)
	}

	/// The saved errno of the last failed syscall.
	#[must_use]
	pub fn io_error(&self) -> Option<Errno> {
		self.io_error
	}

	/// The set facets, in surfacing order.
	pub fn iter(&self) -> impl Iterator<Item = FaultKind> + '_ {
		FaultKind::ALL.into_iter().filter(|kind| self.contains(*kind))
	}

	/// The first facet of `order` that is set.
	#[must_use]
	pub fn first(&self, order: &[FaultKind]) -> Option<FaultKind> {
		order.iter().copied().find(|kind| self.contains(*kind))
	}
}

/// A failed stream operation: the facets at the time of failure and the
/// order in which that operation surfaces them.
///
/// Match on it to inspect facets individually, or convert it into a
/// [`StreamError`] (`?` does this) to get the single highest priority one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
	faults: Faults,
	order: &'static [FaultKind],
}

impl Failure {
	pub(crate) fn new(faults: Faults, order: &'static [FaultKind]) -> Self {
		Self { faults, order }
	}

	/// The facets set when the operation failed.
	#[must_use]
	pub fn faults(&self) -> Faults {
		self.faults
	}

	/// The facet this operation reports. Falls back to the first set facet
	/// in the total order if none in the operation's own order is set.
	#[must_use]
	pub fn kind(&self) -> FaultKind {
		self.faults
			.first(self.order)
			.or_else(|| self.faults.iter().next())
			.unwrap_or(FaultKind::Io)
	}

	/// Surface as a single error.
	#[must_use]
	pub fn raise(self) -> StreamError {
		match self.kind() {
			FaultKind::EndOfFile => StreamError::EndOfFile,
			FaultKind::BufferMissing => StreamError::BufferMissing,
			FaultKind::StringFailure => StreamError::StringFailure,
			FaultKind::Io => StreamError::System(
				self.faults.io_error().unwrap_or(Errno::UnknownErrno),
			),
		}
	}

	pub(crate) fn with_order(self, order: &'static [FaultKind]) -> Self {
		Self { order, ..self }
	}
}
