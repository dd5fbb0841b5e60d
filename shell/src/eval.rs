use std::ffi::{CString, NulError};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

use crate::types::Pipeline;

#[derive(Debug, Error)]
pub enum FatalError {
	#[error("pipe: {}", .0.desc())]
	Pipe(#[source] nix::Error),
	#[error("fork: {}", .0.desc())]
	Fork(#[source] nix::Error),
	#[error("sigaction: {}", .0.desc())]
	Signal(#[source] nix::Error),
	#[error("read: {}", .0.desc())]
	Read(#[source] nix::Error),
	#[error("{0}")]
	Io(#[from] io::Error),
}

type Prepared = Result<CString, NulError>;

/// Everything a child needs, converted before forking so the child does
/// not allocate between `fork` and `exec`.
struct Plan {
	stages: Vec<Result<Vec<CString>, NulError>>,
	input: Option<Prepared>,
	output: Option<Prepared>,
	error: Option<Prepared>,
	error_to_output: bool,
	append: bool,
	error_append: bool,
}

impl Plan {
	fn new(pipeline: &Pipeline) -> Plan {
		let prepare = |name: Option<&str>| name.map(|s| CString::new(s.as_bytes()));
		Plan {
			stages: pipeline.stages().iter().map(|s| s.to_exec_argv()).collect(),
			input: prepare(pipeline.input_file()),
			output: prepare(pipeline.output_file()),
			error: prepare(pipeline.error_file()),
			error_to_output: pipeline.error_file().is_some() && pipeline.error_file() == pipeline.output_file(),
			append: pipeline.is_append(),
			error_append: pipeline.is_error_append(),
		}
	}

	fn output_flags(&self) -> OFlag {
		write_flags(self.append)
	}

	fn error_flags(&self) -> OFlag {
		write_flags(self.error_append)
	}
}

fn write_flags(append: bool) -> OFlag {
	OFlag::O_WRONLY | OFlag::O_CREAT | if append { OFlag::O_APPEND } else { OFlag::O_TRUNC }
}

fn write_stderr(parts: &[&[u8]]) {
	for part in parts {
		unsafe {
			libc::write(libc::STDERR_FILENO, part.as_ptr() as *const libc::c_void, part.len());
		}
	}
}

fn child_fail(context: &[u8], errno: Errno) -> ! {
	write_stderr(&[context, b": ", errno.desc().as_bytes(), b"\n"]);
	unsafe { libc::_exit(1) }
}

fn redirect(target: &Prepared, flags: OFlag, to: RawFd, context: &[u8]) {
	let path = match *target {
		Ok(ref path) => path,
		Err(_) => child_fail(context, Errno::EINVAL),
	};
	let mode = Mode::from_bits_truncate(0o666);
	let fd = fcntl::open(path.as_c_str(), flags, mode).unwrap_or_else(|e| child_fail(context, e));
	if let Err(e) = unistd::dup2(fd, to) {
		child_fail(b"dup2", e);
	}
	let _ = unistd::close(fd);
}

fn exec_stage(plan: &Plan, i: usize, pipes: &[(OwnedFd, OwnedFd)]) -> ! {
	let last = plan.stages.len() - 1;
	if i == 0 {
		if let Some(ref input) = plan.input {
			redirect(input, OFlag::O_RDONLY, libc::STDIN_FILENO, b"open input file");
		}
	}
	if i == last {
		if let Some(ref output) = plan.output {
			redirect(output, plan.output_flags(), libc::STDOUT_FILENO, b"open output file");
		}
		if plan.error_to_output {
			if let Err(e) = unistd::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) {
				child_fail(b"dup2", e);
			}
		} else if let Some(ref error) = plan.error {
			redirect(error, plan.error_flags(), libc::STDERR_FILENO, b"open error file");
		}
	}
	if i < last {
		if let Err(e) = unistd::dup2(pipes[i].1.as_raw_fd(), libc::STDOUT_FILENO) {
			child_fail(b"dup2", e);
		}
	}
	if i > 0 {
		if let Err(e) = unistd::dup2(pipes[i - 1].0.as_raw_fd(), libc::STDIN_FILENO) {
			child_fail(b"dup2", e);
		}
	}
	for &(ref read, ref write) in pipes {
		let _ = unistd::close(read.as_raw_fd());
		let _ = unistd::close(write.as_raw_fd());
	}

	let argv = match plan.stages[i] {
		Ok(ref argv) => argv,
		Err(_) => child_fail(b"execvp", Errno::EINVAL),
	};
	if argv.is_empty() {
		write_stderr(&[b"execvp: empty command\n"]);
		unsafe { libc::_exit(1) }
	}
	match unistd::execvp(&argv[0], argv) {
		Ok(never) => match never {},
		Err(e) => {
			write_stderr(&[argv[0].as_bytes(), b": "]);
			child_fail(b"execvp", e)
		},
	}
}

/// Creates the pipes, forks one child per stage and wires its standard
/// streams. Returns the children's pids in stage order; every pipe
/// descriptor is closed in the parent by the time this returns.
pub fn launch(pipeline: &Pipeline) -> Result<Vec<Pid>, FatalError> {
	let plan = Plan::new(pipeline);
	let count = plan.stages.len();
	assert!(count > 0);

	let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(count - 1);
	for _ in 1 .. count {
		pipes.push(unistd::pipe2(OFlag::O_CLOEXEC).map_err(FatalError::Pipe)?);
	}
	debug!(stages = count, pipes = pipes.len(), background = pipeline.is_background(), "launching pipeline");

	let _ = io::stdout().flush();
	let _ = io::stderr().flush();
	let mut children = Vec::with_capacity(count);
	for i in 0 .. count {
		match unsafe { unistd::fork() }.map_err(FatalError::Fork)? {
			ForkResult::Parent { child } => {
				debug!(%child, stage = i, "forked stage");
				children.push(child);
			},
			ForkResult::Child => exec_stage(&plan, i, &pipes),
		}
	}
	drop(pipes);
	Ok(children)
}
