use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// One log line per terminated child, or `None` if nothing terminated.
pub fn describe_status(status: WaitStatus) -> Option<String> {
	match status {
		WaitStatus::Exited(pid, code) => Some(format!("Child {} exited with status {}", pid, code)),
		WaitStatus::Signaled(pid, sig, _) => Some(format!("Child {} killed by signal {}", pid, sig as i32)),
		WaitStatus::StillAlive => None,
		other => other.pid().map(|pid| format!("Child {} terminated unexpectedly", pid)),
	}
}

#[derive(Debug)]
pub struct TerminationLog {
	path: PathBuf,
}

impl TerminationLog {
	pub fn new(path: PathBuf) -> TerminationLog {
		TerminationLog { path: path }
	}

	pub fn append(&self, line: &str) -> io::Result<()> {
		let mut file = OpenOptions::new()
			.append(true)
			.create(true)
			.mode(0o644)
			.open(&self.path)?;
		writeln!(file, "{}", line)
	}
}

/// Every reaped child passes through here, whether it was collected by the
/// foreground wait or by the drain that follows SIGCHLD.
#[derive(Debug)]
pub struct JobTable {
	log: TerminationLog,
	foreground: HashSet<Pid>,
}

impl JobTable {
	pub fn new(log: TerminationLog) -> JobTable {
		JobTable { log: log, foreground: HashSet::new() }
	}

	fn record(&mut self, status: WaitStatus) {
		if let Some(pid) = status.pid() {
			self.foreground.remove(&pid);
			debug!(%pid, ?status, "reaped child");
		}
		if let Some(line) = describe_status(status) {
			if let Err(e) = self.log.append(&line) {
				let _ = writeln!(io::stderr(), "Failed to open log file: {}", e);
				warn!(path = %self.log.path.display(), "termination log unavailable");
			}
		}
	}

	/// Collects every child that has already terminated, without blocking.
	pub fn reap(&mut self) -> usize {
		let mut count = 0;
		loop {
			match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
				Ok(status) => {
					self.record(status);
					count += 1;
				},
				Err(Errno::EINTR) => continue,
				Err(e) => {
					warn!(error = %e, "waitpid failed");
					break;
				},
			}
		}
		count
	}

	/// Blocks until each of `pids` has terminated. Other children reaped on
	/// the way are logged but not counted. `on_signal` runs whenever the
	/// wait is interrupted.
	pub fn wait_foreground<F: FnMut()>(&mut self, pids: &[Pid], mut on_signal: F) {
		self.foreground.extend(pids.iter().cloned());
		while !self.foreground.is_empty() {
			match waitpid(None, None) {
				Ok(status) => self.record(status),
				Err(Errno::EINTR) => on_signal(),
				Err(e) => {
					warn!(error = %e, outstanding = self.foreground.len(), "giving up foreground wait");
					self.foreground.clear();
				},
			}
		}
	}

	#[cfg(test)]
	pub fn outstanding(&self) -> usize {
		self.foreground.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use nix::sys::signal::Signal;

	#[test]
	fn status_lines() {
		let pid = Pid::from_raw(4242);
		assert_eq!(describe_status(WaitStatus::Exited(pid, 3)).unwrap(),
		           "Child 4242 exited with status 3");
		assert_eq!(describe_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)).unwrap(),
		           "Child 4242 killed by signal 9");
		assert_eq!(describe_status(WaitStatus::Continued(pid)).unwrap(),
		           "Child 4242 terminated unexpectedly");
		assert_eq!(describe_status(WaitStatus::StillAlive), None);
	}

	#[test]
	fn log_appends_lines() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("child_termination.log");
		let log = TerminationLog::new(path.clone());
		log.append("Child 1 exited with status 0").unwrap();
		log.append("Child 2 killed by signal 15").unwrap();
		assert_eq!(fs::read_to_string(&path).unwrap(),
		           "Child 1 exited with status 0\nChild 2 killed by signal 15\n");
	}

	#[test]
	fn record_logs_and_clears_foreground() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("log");
		let mut jobs = JobTable::new(TerminationLog::new(path.clone()));
		let (a, b) = (Pid::from_raw(10), Pid::from_raw(11));
		jobs.foreground.extend([a, b].iter().cloned());
		jobs.record(WaitStatus::Exited(a, 0));
		jobs.record(WaitStatus::Exited(Pid::from_raw(99), 1));
		assert_eq!(jobs.outstanding(), 1);
		assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
	}
}
