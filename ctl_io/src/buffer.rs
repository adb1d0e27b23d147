//! Fixed capacity byte ring used to batch control protocol traffic.
//!
//! The valid region is the `len()` bytes starting at the read cursor,
//! wrapping at the physical end of the storage. Any range of the ring is at
//! most two contiguous [`Span`]s, which is what lets the streams hand the
//! queued bytes straight to `writev` instead of staging them.

use std::{fmt, io::IoSlice, os::unix::io::RawFd};

use crate::io::{Errno, SyscallProvider};

/// Capacity of the buffer backing the control protocol transport.
pub const STREAM_BUFFER_SIZE: usize = 1024;

/// The buffer type the streams use by default.
pub type StreamBuffer = CircularBuffer<STREAM_BUFFER_SIZE>;

/// Position inside a ring of capacity `N`. All arithmetic is modulo `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingIndex<const N: usize>(usize);

impl<const N: usize> RingIndex<N> {
	const NON_EMPTY: () = assert!(N > 0, "ring capacity must be non-zero");

	/// The first slot of the ring.
	pub const ZERO: Self = Self(0);

	/// Wrap `raw` into the ring.
	#[must_use]
	pub fn new(raw: usize) -> Self {
		let () = Self::NON_EMPTY;
		Self(raw % N)
	}

	/// Physical offset into the storage.
	#[must_use]
	pub fn get(self) -> usize {
		self.0
	}

	/// Move forward by `amount` slots, where `amount <= N`.
	#[must_use]
	pub fn advance(self, amount: usize) -> Self {
		debug_assert!(amount <= N);
		let pos = self.0 + amount;
		if pos >= N {
			Self(pos - N)
		} else {
			Self(pos)
		}
	}

	/// Slots left before the physical end of the storage.
	#[must_use]
	pub fn until_end(self) -> usize {
		N - self.0
	}
}

/// A contiguous run of the backing storage, as a physical offset and a
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
	/// Physical offset of the first byte.
	pub offset: usize,
	/// Number of bytes in the run.
	pub len: usize,
}

impl Span {
	/// Whether the span covers no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	fn end(&self) -> usize {
		self.offset + self.len
	}
}

/// Outcome of [`CircularBuffer::fill_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillTo {
	/// The buffer holds at least the requested number of bytes.
	Complete,
	/// The descriptor reported end of input before the threshold was
	/// reached. Whatever was read is still in the buffer.
	EndOfInput,
}

/// Fixed capacity circular byte buffer. It never grows.
pub struct CircularBuffer<const N: usize> {
	storage: [u8; N],
	cursor: RingIndex<N>,
	length: usize,
}

impl<const N: usize> CircularBuffer<N> {
	/// Create an empty buffer.
	#[must_use]
	pub fn new() -> Self {
		let () = RingIndex::<N>::NON_EMPTY;
		Self { storage: [0; N], cursor: RingIndex::ZERO, length: 0 }
	}

	/// Total capacity in bytes.
	#[must_use]
	pub const fn capacity(&self) -> usize {
		N
	}

	/// Number of valid bytes held.
	#[must_use]
	pub fn len(&self) -> usize {
		self.length
	}

	/// Whether the buffer holds no valid bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.length == 0
	}

	/// Free space in bytes.
	#[must_use]
	pub fn free(&self) -> usize {
		N - self.length
	}

	fn tail(&self) -> RingIndex<N> {
		self.cursor.advance(self.length)
	}

	/// The contiguous run of valid bytes starting at logical offset
	/// `index`. The run stops at the physical end of the storage or at the
	/// end of the valid data, whichever comes first.
	///
	/// # Panics
	///
	/// Panics if `index > len()`.
	#[must_use]
	pub fn contiguous_span(&self, index: usize) -> Span {
		assert!(index <= self.length, "index {index} past end of data");
		let start = self.cursor.advance(index);
		Span {
			offset: start.get(),
			len: start.until_end().min(self.length - index),
		}
	}

	/// The contiguous run of free space at the tail of the data.
	#[must_use]
	pub fn free_span(&self) -> Span {
		let tail = self.tail();
		Span { offset: tail.get(), len: tail.until_end().min(self.free()) }
	}

	/// Bytes covered by a span previously obtained from this buffer.
	///
	/// # Panics
	///
	/// Panics if the span lies outside the storage.
	#[must_use]
	pub fn span(&self, span: Span) -> &[u8] {
		&self.storage[span.offset..span.end()]
	}

	/// The valid data as at most two slices, in logical order. The second
	/// slice is empty unless the data wraps.
	#[must_use]
	pub fn as_slices(&self) -> (&[u8], &[u8]) {
		let first = self.contiguous_span(0);
		let rest = self.length - first.len;
		(self.span(first), &self.storage[..rest])
	}

	/// The valid data as `writev` descriptors.
	#[must_use]
	pub fn io_slices(&self) -> [IoSlice<'_>; 2] {
		let (head, tail) = self.as_slices();
		[IoSlice::new(head), IoSlice::new(tail)]
	}

	/// Byte at logical offset `index`, if it is valid data.
	#[must_use]
	pub fn get(&self, index: usize) -> Option<u8> {
		if index >= self.length {
			return None;
		}
		Some(self.storage[self.cursor.advance(index).get()])
	}

	/// Issue one read into the free space at the tail. Returns the number of
	/// bytes read, where 0 means end of input.
	pub fn fill<S: SyscallProvider + ?Sized>(
		&mut self,
		sys: &S,
		fd: RawFd,
	) -> Result<usize, Errno> {
		self.fill_at_most(sys, fd, N)
	}

	/// Like [`Self::fill`] but reads no more than `limit` bytes.
	pub fn fill_at_most<S: SyscallProvider + ?Sized>(
		&mut self,
		sys: &S,
		fd: RawFd,
		limit: usize,
	) -> Result<usize, Errno> {
		let free = self.free_span();
		let end = free.offset + free.len.min(limit);
		let read = sys.read(fd, &mut self.storage[free.offset..end])?;
		self.length += read;
		Ok(read)
	}

	/// Call [`Self::fill`] until at least `threshold` bytes are held.
	///
	/// # Panics
	///
	/// Panics if `threshold` exceeds the capacity.
	pub fn fill_to<S: SyscallProvider + ?Sized>(
		&mut self,
		sys: &S,
		fd: RawFd,
		threshold: usize,
	) -> Result<FillTo, Errno> {
		assert!(threshold <= N, "threshold {threshold} exceeds capacity {N}");
		while self.length < threshold {
			if self.fill(sys, fd)? == 0 {
				return Ok(FillTo::EndOfInput);
			}
		}
		Ok(FillTo::Complete)
	}

	/// Drop `amount` bytes from the front.
	///
	/// # Panics
	///
	/// Panics if `amount > len()`.
	pub fn consume(&mut self, amount: usize) {
		assert!(
			amount <= self.length,
			"consume {amount} of {} bytes",
			self.length
		);
		self.cursor = self.cursor.advance(amount);
		self.length -= amount;
	}

	/// Copy `dest.len()` bytes starting at logical offset `index` into
	/// `dest`. The buffer is left untouched.
	///
	/// # Panics
	///
	/// Panics if the range is not entirely valid data.
	pub fn extract(&self, dest: &mut [u8], index: usize) {
		assert!(
			index + dest.len() <= self.length,
			"extract {}..{} of {} bytes",
			index,
			index + dest.len(),
			self.length
		);
		let start = self.cursor.advance(index).get();
		let first = dest.len().min(N - start);
		let (head, tail) = dest.split_at_mut(first);
		head.copy_from_slice(&self.storage[start..start + first]);
		tail.copy_from_slice(&self.storage[..tail.len()]);
	}

	/// Owned copy of `len` bytes starting at logical offset `index`.
	///
	/// # Panics
	///
	/// Panics if the range is not entirely valid data.
	#[must_use]
	pub fn extract_vec(&self, index: usize, len: usize) -> Vec<u8> {
		let mut out = vec![0; len];
		self.extract(&mut out, index);
		out
	}

	/// Copy `data` onto the tail. The caller must have checked that it fits.
	///
	/// # Panics
	///
	/// Panics if `data.len() > free()`.
	pub fn append(&mut self, data: &[u8]) {
		assert!(
			data.len() <= self.free(),
			"append {} bytes with {} free",
			data.len(),
			self.free()
		);
		let start = self.tail().get();
		let first = data.len().min(N - start);
		let (head, tail) = data.split_at(first);
		self.storage[start..start + first].copy_from_slice(head);
		self.storage[..tail.len()].copy_from_slice(tail);
		self.length += data.len();
	}
}

impl<const N: usize> Default for CircularBuffer<N> {
	fn default() -> Self {
		Self::new()
	}
}

impl<const N: usize> fmt::Debug for CircularBuffer<N> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CircularBuffer")
			.field("capacity", &N)
			.field("cursor", &self.cursor.get())
			.field("length", &self.length)
			.finish()
	}
}

#[cfg(test)]
mod test {
	use std::collections::VecDeque;

	use rand::{rngs::StdRng, Rng, SeedableRng};

	use super::*;
	use crate::io::mock::MockSys;

	fn buffer_at<const N: usize>(cursor: usize) -> CircularBuffer<N> {
		let mut buf = CircularBuffer::<N>::new();
		buf.append(&vec![0; cursor]);
		buf.consume(cursor);
		buf
	}

	#[test]
	fn ring_index_wraps() {
		let idx = RingIndex::<8>::new(13);
		assert_eq!(idx.get(), 5);
		assert_eq!(idx.advance(3).get(), 0);
		assert_eq!(idx.advance(8), idx);
		assert_eq!(idx.until_end(), 3);
	}

	#[test]
	fn append_consume_tracks_length() {
		let mut buf = CircularBuffer::<16>::new();
		assert_eq!(buf.free(), 16);

		buf.append(b"hello");
		assert_eq!(buf.len(), 5);
		assert_eq!(buf.free(), 11);

		buf.consume(3);
		assert_eq!(buf.len(), 2);
		assert_eq!(buf.extract_vec(0, 2), b"lo");

		buf.consume(2);
		assert!(buf.is_empty());
	}

	#[test]
	fn extract_across_physical_end() {
		let mut buf = buffer_at::<8>(6);
		buf.append(b"abcde");

		assert_eq!(buf.contiguous_span(0), Span { offset: 6, len: 2 });
		assert_eq!(buf.extract_vec(0, 5), b"abcde");
		assert_eq!(buf.extract_vec(1, 3), b"bcd");

		let mut dest = [0u8; 2];
		buf.extract(&mut dest, 3);
		assert_eq!(&dest, b"de");
		// extract does not consume
		assert_eq!(buf.len(), 5);
	}

	#[test]
	fn contiguous_span_honours_logical_index() {
		let mut buf = buffer_at::<8>(5);
		buf.append(b"0123456");

		assert_eq!(buf.contiguous_span(0), Span { offset: 5, len: 3 });
		assert_eq!(buf.contiguous_span(2), Span { offset: 7, len: 1 });
		assert_eq!(buf.contiguous_span(3), Span { offset: 0, len: 4 });
		assert_eq!(buf.span(buf.contiguous_span(3)), b"3456");
		assert!(buf.contiguous_span(7).is_empty());
	}

	#[test]
	fn slices_split_at_wrap() {
		let mut buf = buffer_at::<8>(6);
		buf.append(b"wxyz");
		let (head, tail) = buf.as_slices();
		assert_eq!(head, b"wx");
		assert_eq!(tail, b"yz");

		buf.consume(2);
		let (head, tail) = buf.as_slices();
		assert_eq!(head, b"yz");
		assert!(tail.is_empty());
	}

	#[test]
	fn full_buffer_has_no_free_span() {
		let mut buf = buffer_at::<4>(3);
		buf.append(b"abcd");
		assert_eq!(buf.free(), 0);
		assert!(buf.free_span().is_empty());
		assert_eq!(buf.extract_vec(0, 4), b"abcd");
	}

	#[test]
	fn get_peeks_without_consuming() {
		let mut buf = buffer_at::<4>(3);
		buf.append(b"xyz");
		assert_eq!(buf.get(0), Some(b'x'));
		assert_eq!(buf.get(1), Some(b'y'));
		assert_eq!(buf.get(2), Some(b'z'));
		assert_eq!(buf.get(3), None);
		assert_eq!(buf.len(), 3);
	}

	#[test]
	#[should_panic(expected = "append 5 bytes with 4 free")]
	fn append_past_capacity_panics() {
		let mut buf = CircularBuffer::<4>::new();
		buf.append(b"12345");
	}

	#[test]
	#[should_panic(expected = "consume 2 of 1 bytes")]
	fn consume_past_length_panics() {
		let mut buf = CircularBuffer::<4>::new();
		buf.append(b"1");
		buf.consume(2);
	}

	#[test]
	fn matches_deque_model() {
		let mut rng = StdRng::seed_from_u64(0x00c0_ffee);
		let mut buf = CircularBuffer::<37>::new();
		let mut model = VecDeque::new();

		for _ in 0..5_000 {
			if rng.gen_bool(0.5) {
				let n = rng.gen_range(0..=buf.free());
				let data: Vec<u8> = (0..n).map(|_| rng.gen()).collect();
				buf.append(&data);
				model.extend(data);
			} else {
				let n = rng.gen_range(0..=buf.len());
				buf.consume(n);
				model.drain(..n);
			}

			assert_eq!(buf.len(), model.len());
			let expected: Vec<u8> = model.iter().copied().collect();
			assert_eq!(buf.extract_vec(0, buf.len()), expected);
			let (head, tail) = buf.as_slices();
			assert_eq!([head, tail].concat(), expected);
		}
	}

	#[test]
	fn fill_reads_into_tail_without_crossing_end() {
		let sys = MockSys::new();
		let fd = sys.attach_reader(b"abcdefgh");

		let mut buf = buffer_at::<8>(6);
		buf.append(b"q");

		// tail is at offset 7: only one contiguous byte before the end
		assert_eq!(buf.fill(&sys, fd).unwrap(), 1);
		assert_eq!(buf.fill(&sys, fd).unwrap(), 6);
		assert_eq!(buf.free(), 0);
		assert_eq!(buf.extract_vec(0, 8), b"qabcdefg");
	}

	#[test]
	fn fill_at_most_respects_limit() {
		let sys = MockSys::new();
		let fd = sys.attach_reader(b"abc");

		let mut buf = CircularBuffer::<8>::new();
		assert_eq!(buf.fill_at_most(&sys, fd, 1).unwrap(), 1);
		assert_eq!(buf.extract_vec(0, 1), b"a");
	}

	#[test]
	fn fill_to_loops_until_threshold() {
		let sys = MockSys::new();
		let fd = sys.attach_reader(b"0123456789");
		sys.limit_reads(fd, 3);

		let mut buf = CircularBuffer::<16>::new();
		assert_eq!(buf.fill_to(&sys, fd, 7).unwrap(), FillTo::Complete);
		assert_eq!(buf.len(), 9);
		assert_eq!(sys.syscalls(), 3);
	}

	#[test]
	fn fill_to_reports_end_of_input() {
		let sys = MockSys::new();
		let fd = sys.attach_reader(b"abc");

		let mut buf = CircularBuffer::<16>::new();
		assert_eq!(buf.fill_to(&sys, fd, 8).unwrap(), FillTo::EndOfInput);
		assert_eq!(buf.extract_vec(0, 3), b"abc");
	}

	#[test]
	fn fill_propagates_errors() {
		let sys = MockSys::new();
		let fd = sys.attach_reader(b"abc");
		sys.fail_next_read(fd, Errno::EIO);

		let mut buf = CircularBuffer::<16>::new();
		assert_eq!(buf.fill_to(&sys, fd, 2), Err(Errno::EIO));
		assert!(buf.is_empty());
	}
}
