use std::{io, thread};

use ctl_io::{
	io::{Errno, OpenFlags, OpenMode},
	InputStream, LineEnd, Nix, OutputStream, StreamError,
};
use ctl_test_primitives::tmp_path;

fn owner_rw() -> OpenMode {
	OpenMode::S_IRUSR | OpenMode::S_IWUSR
}

#[test]
fn pipe_round_trip() -> Result<(), StreamError> {
	let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
	let mut output = OutputStream::<Nix>::from_raw_fd(Nix, write_fd);
	let mut input = InputStream::<Nix>::from_raw_fd(Nix, read_fd);

	output.write_str("status ")?;
	output.write_i32(-12)?;
	output.endl()?;
	output.write_str("uptime ")?;
	output.write_u64(u64::MAX)?;
	output.close()?;

	let mut line = String::new();
	assert_eq!(input.get_line_string(&mut line, b'\n')?, LineEnd::Delimiter);
	assert_eq!(line, "status -12");
	assert_eq!(input.get_line_string(&mut line, b'\n')?, LineEnd::EndOfInput);
	assert_eq!(line, "uptime 18446744073709551615");

	let eof = input.get_line_string(&mut line, b'\n').unwrap_err();
	assert_eq!(StreamError::from(eof), StreamError::EndOfFile);
	Ok(())
}

#[test]
fn large_writes_reach_a_concurrent_reader() {
	let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
	let expected: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

	let payload = expected.clone();
	let writer = thread::spawn(move || {
		let mut output = OutputStream::<Nix>::from_raw_fd(Nix, write_fd);
		for chunk in payload.chunks(700) {
			output.write_bytes(chunk).unwrap();
		}
		output.close().unwrap();
	});

	let mut input = InputStream::<Nix>::from_raw_fd(Nix, read_fd);
	let mut received = vec![0u8; expected.len()];
	assert_eq!(input.get_exact(&mut received), Ok(expected.len()));
	writer.join().unwrap();

	assert_eq!(received, expected);
	assert_eq!(input.get_byte().unwrap_err().raise(), StreamError::EndOfFile);
}

#[test]
fn file_round_trip() -> Result<(), StreamError> {
	let path = tmp_path("ctl_io_file_round_trip");
	let lines = ["alpha", "", "gamma with spaces", "delta"];

	let mut output = OutputStream::<Nix>::new(Nix);
	output.open_with_mode(
		&*path,
		OpenFlags::O_CREAT | OpenFlags::O_TRUNC,
		owner_rw(),
	)?;
	for line in lines {
		output.write_str(line)?;
		output.endl()?;
	}
	output.close()?;

	let mut input = InputStream::<Nix>::new(Nix);
	input.open(&*path)?;
	let mut line = Vec::new();
	let mut read = Vec::new();
	while input.get_line_until_eof(&mut line, b'\n')?.is_some() {
		read.push(String::from_utf8(line.clone()).unwrap());
	}
	input.close()?;

	assert_eq!(read, lines);
	Ok(())
}

#[test]
fn open_missing_file() {
	let path = tmp_path("ctl_io_missing");
	let mut input = InputStream::<Nix>::new(Nix);

	let failure = input.open(&*path).unwrap_err();
	assert_eq!(failure.raise(), StreamError::System(Errno::ENOENT));
	assert!(!input.is_open());
	assert_eq!(input.io_failure(), Some(Errno::ENOENT));
}

#[test]
fn std_io_copy_between_streams() {
	let source = tmp_path("ctl_io_copy_source");
	let dest = tmp_path("ctl_io_copy_dest");
	let contents: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
	std::fs::write(&*source, &contents).unwrap();

	let mut input = InputStream::<Nix>::new(Nix);
	input.open(&*source).unwrap();
	let mut output = OutputStream::<Nix>::new(Nix);
	output
		.open_with_mode(&*dest, OpenFlags::O_CREAT, owner_rw())
		.unwrap();

	let copied = io::copy(&mut input, &mut output).unwrap();
	drop(output);
	assert_eq!(copied, 5000);
	assert_eq!(std::fs::read(&*dest).unwrap(), contents);
}

#[test]
fn writing_to_a_closed_pipe_is_reported() {
	let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
	nix::unistd::close(read_fd).unwrap();
	let mut output = OutputStream::<Nix>::from_raw_fd(Nix, write_fd);

	// Buffered, so nothing is written yet.
	output.write_str("hello").unwrap();
	let failure = output.flush().unwrap_err();
	assert_eq!(failure.raise(), StreamError::System(Errno::EPIPE));
	assert!(!output.good());
}
