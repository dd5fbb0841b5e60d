use std::env;
use std::io;
use std::path::PathBuf;

use tracing::Level;

pub const PROMPT: &str = "myshell> ";
pub const TERMINATION_LOG: &str = "child_termination.log";

#[derive(Debug, Clone)]
pub struct Config {
	pub prompt: String,
	/// Absolute, so `cd` does not move the log.
	pub termination_log: PathBuf,
	/// Print the command table before launching a pipeline.
	pub show_table: bool,
	pub log_level: Level,
}

impl Config {
	pub fn new() -> io::Result<Config> {
		let cwd = env::current_dir()?;
		Ok(Config {
			prompt: PROMPT.to_owned(),
			termination_log: cwd.join(TERMINATION_LOG),
			show_table: true,
			log_level: Level::WARN,
		})
	}
}
