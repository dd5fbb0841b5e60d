mod builtin;
mod config;
mod eval;
mod expand;
mod global;
mod input;
mod job;
mod parser;
mod signal;
mod types;

use std::io::{self, Write};
use std::process;

use config::Config;
use eval::FatalError;
use global::Session;
use input::{Input, LineReader};

fn run() -> Result<(), FatalError> {
	let config = Config::new()?;
	tracing_subscriber::fmt()
		.with_writer(io::stderr)
		.with_max_level(config.log_level)
		.without_time()
		.with_target(false)
		.init();
	let wakeup = signal::install().map_err(FatalError::Signal)?;

	let mut session = Session::new(config);
	let mut reader = LineReader::new(libc::STDIN_FILENO, Some(wakeup.fd()));
	session.prompt();
	loop {
		if session.poll_signals() {
			reader.discard();
		}
		match reader.read_line().map_err(FatalError::Read)? {
			Input::Line(line) => {
				if let Err(e) = parser::parse(&line, &mut session) {
					let _ = writeln!(io::stderr(), "myshell: syntax error: {}", e);
					session.discard_line();
				} else {
					session.execute()?;
				}
			},
			Input::Interrupted => {},
			Input::Eof => {
				session.reap();
				println!();
				return Ok(());
			},
		}
	}
}

fn main() {
	if let Err(e) = run() {
		let _ = writeln!(io::stderr(), "myshell: {}", e);
		process::exit(1);
	}
}
