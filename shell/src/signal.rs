use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use libc::c_int;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static CHILD_EXITED: AtomicBool = AtomicBool::new(false);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

// Only flags and one byte on the self-pipe; reaping and printing happen in
// `Session::poll_signals`.
extern "C" fn on_signal(sig: c_int) {
	match sig {
		libc::SIGINT => INTERRUPTED.store(true, Ordering::SeqCst),
		libc::SIGCHLD => CHILD_EXITED.store(true, Ordering::SeqCst),
		_ => {},
	}
	let fd = WAKE_FD.load(Ordering::SeqCst);
	if fd >= 0 {
		let byte = [sig as u8];
		unsafe {
			libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
		}
	}
}

/// Read end of the self-pipe the handlers write to. Readable whenever a
/// signal arrived that has not been drained yet.
#[derive(Debug)]
pub struct Wakeup {
	read: OwnedFd,
	_write: OwnedFd,
}

impl Wakeup {
	pub fn fd(&self) -> RawFd {
		self.read.as_raw_fd()
	}
}

impl Drop for Wakeup {
	fn drop(&mut self) {
		WAKE_FD.store(-1, Ordering::SeqCst);
	}
}

/// Empties a non-blocking wakeup pipe.
pub fn drain(fd: RawFd) {
	let mut buf = [0u8; 64];
	loop {
		match unistd::read(fd, &mut buf) {
			Ok(n) if n > 0 => continue,
			Err(Errno::EINTR) => continue,
			_ => break,
		}
	}
}

/// Installed without `SA_RESTART`, so blocking reads and waits see `EINTR`.
pub fn install() -> nix::Result<Wakeup> {
	let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
	WAKE_FD.store(write.as_raw_fd(), Ordering::SeqCst);
	let wakeup = Wakeup { read: read, _write: write };

	let handler = SigHandler::Handler(on_signal);
	let interrupt = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
	let child = SigAction::new(handler, SaFlags::SA_NOCLDSTOP, SigSet::empty());
	unsafe {
		sigaction(Signal::SIGINT, &interrupt)?;
		sigaction(Signal::SIGCHLD, &child)?;
	}
	Ok(wakeup)
}

pub fn take_interrupt() -> bool {
	INTERRUPTED.swap(false, Ordering::SeqCst)
}

pub fn take_child_exited() -> bool {
	CHILD_EXITED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test::SERIAL;
	use nix::sys::signal::raise;

	#[test]
	fn handlers_raise_flags_and_wake_the_pipe() {
		let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
		let wakeup = install().unwrap();
		take_interrupt();
		drain(wakeup.fd());

		raise(Signal::SIGINT).unwrap();
		assert!(take_interrupt());
		assert!(!take_interrupt());
		let mut buf = [0u8; 8];
		assert_eq!(unistd::read(wakeup.fd(), &mut buf), Ok(1));
		assert_eq!(buf[0], libc::SIGINT as u8);

		raise(Signal::SIGCHLD).unwrap();
		assert!(take_child_exited());
		assert!(!take_child_exited());
		drain(wakeup.fd());
		assert_eq!(unistd::read(wakeup.fd(), &mut buf), Err(Errno::EAGAIN));
	}
}
