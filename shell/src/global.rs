use std::io::{self, Write};

use tracing::{debug, warn};

use crate::builtin::{self, Dispatch};
use crate::config::Config;
use crate::eval::{self, FatalError};
use crate::job::{JobTable, TerminationLog};
use crate::parser::Sink;
use crate::signal;
use crate::types::{ArgumentVector, Pipeline, RedirectKind};

/// The shell's single pipeline under construction, plus what it needs to
/// run one.
pub struct Session {
	config: Config,
	pipeline: Pipeline,
	current: Option<ArgumentVector>,
	jobs: JobTable,
}

impl Session {
	pub fn new(config: Config) -> Session {
		let log = TerminationLog::new(config.termination_log.clone());
		Session {
			config: config,
			pipeline: Pipeline::new(),
			current: None,
			jobs: JobTable::new(log),
		}
	}

	#[cfg(test)]
	pub fn pipeline(&self) -> &Pipeline {
		&self.pipeline
	}

	pub fn prompt(&self) {
		let mut stdout = io::stdout();
		let _ = stdout.write_all(self.config.prompt.as_bytes());
		let _ = stdout.flush();
	}

	pub fn reset(&mut self) {
		self.pipeline.reset();
		self.current = None;
	}

	/// Drops a line that failed to parse and asks for the next one.
	pub fn discard_line(&mut self) {
		self.reset();
		self.prompt();
	}

	/// Handles whatever the signal handlers flagged. Returns true if the
	/// user interrupted, in which case a fresh prompt has been printed.
	pub fn poll_signals(&mut self) -> bool {
		if signal::take_child_exited() {
			self.jobs.reap();
		}
		if signal::take_interrupt() {
			println!();
			self.prompt();
			return true;
		}
		false
	}

	/// Collects children that already terminated; used when input ends.
	pub fn reap(&mut self) -> usize {
		self.jobs.reap()
	}

	/// Runs the pipeline built so far, then resets it and prompts again.
	/// Only failures that must end the shell are returned.
	pub fn execute(&mut self) -> Result<(), FatalError> {
		let result = self.run();
		self.reset();
		result?;
		self.prompt();
		Ok(())
	}

	fn run(&mut self) -> Result<(), FatalError> {
		if self.pipeline.is_empty() {
			return Ok(());
		}
		let stages = self.pipeline.stages();
		if stages.len() == 1 {
			if let Dispatch::Builtin(f) = builtin::dispatch(&stages[0]) {
				let status = f(&stages[0]);
				debug!(status, "builtin finished");
				return Ok(());
			}
		}

		if self.config.show_table {
			print!("{}", self.pipeline);
		}
		let children = eval::launch(&self.pipeline)?;
		if self.pipeline.is_background() {
			debug!(children = children.len(), "running in background");
		} else {
			self.jobs.wait_foreground(&children, || {
				if signal::take_interrupt() {
					println!();
				}
			});
		}
		Ok(())
	}
}

impl Sink for Session {
	fn new_argument_vector(&mut self) {
		self.current = Some(ArgumentVector::new());
	}

	fn append_argument(&mut self, text: &str) {
		self.current.get_or_insert_with(ArgumentVector::new).append(text);
	}

	fn add_stage(&mut self) {
		if let Some(stage) = self.current.take() {
			self.pipeline.add_stage(stage);
		}
	}

	fn set_redirection(&mut self, kind: RedirectKind, filename: &str) {
		if let Err(e) = self.pipeline.set_redirection(kind, filename) {
			let _ = writeln!(io::stderr(), "{}", e);
			warn!(%kind, filename, "redirection dropped");
		}
	}

	fn set_append_mode(&mut self) {
		self.pipeline.set_append_mode();
	}

	fn set_background(&mut self) {
		self.pipeline.set_background();
	}
}
