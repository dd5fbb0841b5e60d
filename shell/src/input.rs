use std::mem;
use std::os::unix::io::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;

use crate::signal;

const CHUNK: usize = 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
	Line(Vec<u8>),
	Interrupted,
	Eof,
}

/// Line reader over a raw descriptor. Unlike `BufRead`, a signal is
/// reported to the caller instead of retried: either `read(2)` fails with
/// `EINTR`, or the wakeup pipe becomes readable while waiting for input.
pub struct LineReader {
	fd: RawFd,
	wake: Option<RawFd>,
	buf: Vec<u8>,
}

impl LineReader {
	pub fn new(fd: RawFd, wake: Option<RawFd>) -> LineReader {
		LineReader { fd: fd, wake: wake, buf: vec![] }
	}

	fn wait_readable(&self, wake: RawFd) -> nix::Result<bool> {
		let (input, wake_fd) = unsafe { (BorrowedFd::borrow_raw(self.fd), BorrowedFd::borrow_raw(wake)) };
		let mut fds = [PollFd::new(input, PollFlags::POLLIN), PollFd::new(wake_fd, PollFlags::POLLIN)];
		match poll(&mut fds, PollTimeout::NONE) {
			Ok(_) => {},
			Err(Errno::EINTR) => return Ok(false),
			Err(e) => return Err(e),
		}
		if fds[1].revents().map_or(false, |r| r.contains(PollFlags::POLLIN)) {
			signal::drain(wake);
			return Ok(false);
		}
		Ok(true)
	}

	pub fn read_line(&mut self) -> nix::Result<Input> {
		loop {
			if let Some(i) = self.buf.iter().position(|&c| c == b'\n') {
				let rest = self.buf.split_off(i + 1);
				return Ok(Input::Line(mem::replace(&mut self.buf, rest)));
			}
			if let Some(wake) = self.wake {
				if !self.wait_readable(wake)? {
					return Ok(Input::Interrupted);
				}
			}
			let mut chunk = [0u8; CHUNK];
			match unistd::read(self.fd, &mut chunk) {
				Ok(0) => {
					return Ok(if self.buf.is_empty() {
						Input::Eof
					} else {
						Input::Line(mem::replace(&mut self.buf, vec![]))
					});
				},
				Ok(n) => self.buf.extend_from_slice(&chunk[.. n]),
				Err(Errno::EINTR) => return Ok(Input::Interrupted),
				Err(e) => return Err(e),
			}
		}
	}

	/// Drops a partially typed line.
	pub fn discard(&mut self) {
		self.buf.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;
	use std::io::Write;
	use std::os::unix::io::AsRawFd;

	#[test]
	fn splits_lines_and_keeps_unterminated_tail() {
		let (read_end, write_end) = unistd::pipe().unwrap();
		let mut writer = File::from(write_end);
		writer.write_all(b"ls -l\necho a | wc\nno newline").unwrap();
		drop(writer);
		let mut reader = LineReader::new(read_end.as_raw_fd(), None);
		assert_eq!(reader.read_line().unwrap(), Input::Line(b"ls -l\n".to_vec()));
		assert_eq!(reader.read_line().unwrap(), Input::Line(b"echo a | wc\n".to_vec()));
		assert_eq!(reader.read_line().unwrap(), Input::Line(b"no newline".to_vec()));
		assert_eq!(reader.read_line().unwrap(), Input::Eof);
	}

	#[test]
	fn discard_drops_buffered_partial_line() {
		let (read_end, write_end) = unistd::pipe().unwrap();
		let mut writer = File::from(write_end);
		writer.write_all(b"first\npartial").unwrap();
		drop(writer);
		let mut reader = LineReader::new(read_end.as_raw_fd(), None);
		assert_eq!(reader.read_line().unwrap(), Input::Line(b"first\n".to_vec()));
		reader.discard();
		assert_eq!(reader.read_line().unwrap(), Input::Eof);
	}

	#[test]
	fn pending_wakeup_interrupts_before_input() {
		let (read_end, write_end) = unistd::pipe().unwrap();
		let (wake_read, wake_write) = unistd::pipe2(nix::fcntl::OFlag::O_NONBLOCK).unwrap();
		let mut wake_writer = File::from(wake_write);
		wake_writer.write_all(b"x").unwrap();
		let mut writer = File::from(write_end);
		writer.write_all(b"true &\n").unwrap();

		let mut reader = LineReader::new(read_end.as_raw_fd(), Some(wake_read.as_raw_fd()));
		assert_eq!(reader.read_line().unwrap(), Input::Interrupted);
		assert_eq!(reader.read_line().unwrap(), Input::Line(b"true &\n".to_vec()));
		drop(writer);
		assert_eq!(reader.read_line().unwrap(), Input::Eof);
	}
}
