//! In-memory syscall gateway for tests. Never use in production.
//!
//! Descriptors are either opened from registered files or attached directly
//! (mirroring descriptors inherited from a parent process). Reads drain a
//! per-descriptor input queue; writes land in a per-descriptor sink and, for
//! descriptors opened from a path, are appended to that file as well.

use std::{
	cell::RefCell,
	collections::{HashMap, VecDeque},
	io::IoSlice,
	os::unix::io::RawFd,
	path::{Path, PathBuf},
	rc::Rc,
};

use super::{Errno, OpenFlags, OpenMode, SyscallProvider};

const FIRST_MOCK_FD: RawFd = 3;

/// What the next `writev` on a descriptor should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
	/// Accept at most this many bytes.
	Accept(usize),
	/// Fail with the given error, writing nothing.
	Fail(Errno),
}

#[derive(Debug, Default)]
struct MockDescriptor {
	path: Option<PathBuf>,
	flags: Option<OpenFlags>,
	open: bool,
	input: VecDeque<u8>,
	written: Vec<u8>,
	read_limit: Option<usize>,
	read_errors: VecDeque<Errno>,
	write_steps: VecDeque<WriteStep>,
	close_error: Option<Errno>,
}

#[derive(Debug)]
struct MockState {
	next_fd: RawFd,
	syscalls: usize,
	files: HashMap<PathBuf, Vec<u8>>,
	descriptors: HashMap<RawFd, MockDescriptor>,
}

/// Scriptable gateway. Clones share the same state, so a test can keep a
/// handle while a stream owns another.
#[derive(Debug, Clone)]
pub struct MockSys {
	state: Rc<RefCell<MockState>>,
}

impl Default for MockSys {
	fn default() -> Self {
		Self::new()
	}
}

impl MockSys {
	/// Create a gateway with no files and no descriptors.
	#[must_use]
	pub fn new() -> Self {
		let state = MockState {
			next_fd: FIRST_MOCK_FD,
			syscalls: 0,
			files: HashMap::new(),
			descriptors: HashMap::new(),
		};
		Self { state: Rc::new(RefCell::new(state)) }
	}

	/// Register a file that `open` can find.
	pub fn add_file(&self, path: impl AsRef<Path>, contents: &[u8]) {
		self.state
			.borrow_mut()
			.files
			.insert(path.as_ref().to_path_buf(), contents.to_vec());
	}

	/// Current contents of a registered file.
	#[must_use]
	pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
		self.state.borrow().files.get(path.as_ref()).cloned()
	}

	/// Attach an already open descriptor that will yield `input`.
	#[must_use]
	pub fn attach_reader(&self, input: &[u8]) -> RawFd {
		self.attach(MockDescriptor {
			open: true,
			input: input.iter().copied().collect(),
			..MockDescriptor::default()
		})
	}

	/// Attach an already open descriptor that collects writes.
	#[must_use]
	pub fn attach_writer(&self) -> RawFd {
		self.attach(MockDescriptor { open: true, ..MockDescriptor::default() })
	}

	/// Queue more input on `fd`.
	pub fn push_input(&self, fd: RawFd, input: &[u8]) {
		self.with(fd, |d| d.input.extend(input));
	}

	/// Cap every subsequent read on `fd` at `max` bytes.
	pub fn limit_reads(&self, fd: RawFd, max: usize) {
		self.with(fd, |d| d.read_limit = Some(max));
	}

	/// Make the next read on `fd` fail with `errno`.
	pub fn fail_next_read(&self, fd: RawFd, errno: Errno) {
		self.with(fd, |d| d.read_errors.push_back(errno));
	}

	/// Script the next `writev` calls on `fd`. Once the script runs out,
	/// writes are accepted in full.
	pub fn script_writes(
		&self,
		fd: RawFd,
		steps: impl IntoIterator<Item = WriteStep>,
	) {
		self.with(fd, |d| d.write_steps.extend(steps));
	}

	/// Make the next close of `fd` fail with `errno`, leaving it open.
	pub fn fail_next_close(&self, fd: RawFd, errno: Errno) {
		self.with(fd, |d| d.close_error = Some(errno));
	}

	/// Everything written to `fd` so far.
	#[must_use]
	pub fn written(&self, fd: RawFd) -> Vec<u8> {
		self.with(fd, |d| d.written.clone())
	}

	/// Whether `fd` is currently open.
	#[must_use]
	pub fn is_open(&self, fd: RawFd) -> bool {
		self.state.borrow().descriptors.get(&fd).is_some_and(|d| d.open)
	}

	/// Flags `fd` was opened with, if it came from `open`.
	#[must_use]
	pub fn open_flags(&self, fd: RawFd) -> Option<OpenFlags> {
		self.with(fd, |d| d.flags)
	}

	/// Total number of syscalls issued through this gateway.
	#[must_use]
	pub fn syscalls(&self) -> usize {
		self.state.borrow().syscalls
	}

	fn attach(&self, descriptor: MockDescriptor) -> RawFd {
		let mut state = self.state.borrow_mut();
		let fd = state.next_fd;
		state.next_fd += 1;
		state.descriptors.insert(fd, descriptor);
		fd
	}

	fn with<T>(
		&self,
		fd: RawFd,
		f: impl FnOnce(&mut MockDescriptor) -> T,
	) -> T {
		let mut state = self.state.borrow_mut();
		let descriptor = state
			.descriptors
			.get_mut(&fd)
			.unwrap_or_else(|| panic!("unknown mock descriptor {fd}"));
		f(descriptor)
	}
}

impl SyscallProvider for MockSys {
	fn open(
		&self,
		path: &Path,
		flags: OpenFlags,
		_mode: OpenMode,
	) -> Result<RawFd, Errno> {
		let input = {
			let mut state = self.state.borrow_mut();
			state.syscalls += 1;
			if flags.contains(OpenFlags::O_CREAT) {
				state.files.entry(path.to_path_buf()).or_default();
			}
			let file = state.files.get_mut(path).ok_or(Errno::ENOENT)?;
			if flags.contains(OpenFlags::O_TRUNC) {
				file.clear();
			}
			file.iter().copied().collect()
		};

		Ok(self.attach(MockDescriptor {
			path: Some(path.to_path_buf()),
			flags: Some(flags),
			open: true,
			input,
			..MockDescriptor::default()
		}))
	}

	fn close(&self, fd: RawFd) -> Result<(), Errno> {
		let mut state = self.state.borrow_mut();
		state.syscalls += 1;
		let descriptor = match state.descriptors.get_mut(&fd) {
			Some(d) if d.open => d,
			_ => return Err(Errno::EBADF),
		};
		if let Some(errno) = descriptor.close_error.take() {
			return Err(errno);
		}
		descriptor.open = false;
		Ok(())
	}

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
		let mut state = self.state.borrow_mut();
		state.syscalls += 1;
		let descriptor = match state.descriptors.get_mut(&fd) {
			Some(d) if d.open => d,
			_ => return Err(Errno::EBADF),
		};
		if let Some(errno) = descriptor.read_errors.pop_front() {
			return Err(errno);
		}

		let limit = descriptor.read_limit.unwrap_or(usize::MAX);
		let count = buf.len().min(descriptor.input.len()).min(limit);
		for (slot, byte) in buf.iter_mut().zip(descriptor.input.drain(..count))
		{
			*slot = byte;
		}
		Ok(count)
	}

	fn writev(&self, fd: RawFd, iov: &[IoSlice<'_>]) -> Result<usize, Errno> {
		let mut state = self.state.borrow_mut();
		state.syscalls += 1;
		let descriptor = match state.descriptors.get_mut(&fd) {
			Some(d) if d.open => d,
			_ => return Err(Errno::EBADF),
		};

		let total: usize = iov.iter().map(|slice| slice.len()).sum();
		let count = match descriptor.write_steps.pop_front() {
			Some(WriteStep::Fail(errno)) => return Err(errno),
			Some(WriteStep::Accept(max)) => total.min(max),
			None => total,
		};

		let accepted: Vec<u8> = iov
			.iter()
			.flat_map(|slice| slice.iter().copied())
			.take(count)
			.collect();
		descriptor.written.extend_from_slice(&accepted);
		if let Some(path) = descriptor.path.clone() {
			if let Some(file) = state.files.get_mut(&path) {
				file.extend_from_slice(&accepted);
			}
		}
		Ok(count)
	}
}
