use std::ffi::{CString, NulError};
use std::fmt;

use thiserror::Error;

use crate::expand;

pub const MAX_MODIFIERS: usize = 10;
const INITIAL_ARGUMENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind { Input, Output, Append, Error, ErrorAppend }

impl fmt::Display for RedirectKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(match *self {
			RedirectKind::Input => "input",
			RedirectKind::Output => "output",
			RedirectKind::Append => "append",
			RedirectKind::Error => "error",
			RedirectKind::ErrorAppend => "error-append",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
	pub kind: RedirectKind,
	pub target: String,
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("Maximum number of modifiers reached.")]
pub struct ModifierOverflow;

/// Bounded record of every redirection seen while the line was parsed.
#[derive(Debug, Default)]
pub struct RedirectionSet {
	entries: Vec<Redirection>,
}

impl RedirectionSet {
	pub fn insert(&mut self, kind: RedirectKind, target: &str) -> Result<(), ModifierOverflow> {
		if self.entries.len() >= MAX_MODIFIERS {
			return Err(ModifierOverflow);
		}
		self.entries.push(Redirection { kind: kind, target: target.to_owned() });
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Redirection> {
		self.entries.iter()
	}
}

/// One program invocation: element 0 is the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector {
	arguments: Vec<String>,
}

impl Default for ArgumentVector {
	fn default() -> ArgumentVector {
		ArgumentVector::new()
	}
}

impl ArgumentVector {
	pub fn new() -> ArgumentVector {
		ArgumentVector { arguments: Vec::with_capacity(INITIAL_ARGUMENTS) }
	}

	/// Appends `argument`, replacing a wildcard pattern by its matches.
	/// A pattern with no match appends nothing.
	pub fn append(&mut self, argument: &str) {
		if expand::has_wildcard(argument) {
			for path in expand::expand(argument) {
				self.push(path);
			}
		} else {
			self.push(argument.to_owned());
		}
	}

	fn push(&mut self, argument: String) {
		let capacity = self.arguments.capacity();
		if self.arguments.len() == capacity {
			self.arguments.reserve_exact(capacity.max(1));
		}
		self.arguments.push(argument);
	}

	pub fn program(&self) -> Option<&str> {
		self.arguments.first().map(String::as_str)
	}

	pub fn arguments(&self) -> &[String] {
		&self.arguments
	}

	pub fn to_exec_argv(&self) -> Result<Vec<CString>, NulError> {
		self.arguments.iter().map(|s| CString::new(s.as_bytes())).collect()
	}
}

#[derive(Debug, Default)]
pub struct Pipeline {
	stages: Vec<ArgumentVector>,
	modifiers: RedirectionSet,
	output_file: Option<String>,
	input_file: Option<String>,
	error_file: Option<String>,
	append: bool,
	error_append: bool,
	background: bool,
}

impl Pipeline {
	pub fn new() -> Pipeline {
		Pipeline { stages: Vec::with_capacity(1), ..Pipeline::default() }
	}

	pub fn add_stage(&mut self, stage: ArgumentVector) {
		let capacity = self.stages.capacity();
		if self.stages.len() == capacity {
			self.stages.reserve_exact(capacity.max(1));
		}
		self.stages.push(stage);
	}

	/// Records a redirection. A later redirection of the same stream replaces
	/// the earlier target and its truncate/append mode.
	pub fn set_redirection(&mut self, kind: RedirectKind, target: &str) -> Result<(), ModifierOverflow> {
		self.modifiers.insert(kind, target)?;
		let slot = match kind {
			RedirectKind::Input => &mut self.input_file,
			RedirectKind::Output | RedirectKind::Append => {
				self.append = kind == RedirectKind::Append;
				&mut self.output_file
			},
			RedirectKind::Error | RedirectKind::ErrorAppend => {
				self.error_append = kind == RedirectKind::ErrorAppend;
				&mut self.error_file
			},
		};
		*slot = Some(target.to_owned());
		Ok(())
	}

	/// Switches the output file, not the error file, to append mode.
	pub fn set_append_mode(&mut self) {
		self.append = true;
	}

	pub fn set_background(&mut self) {
		self.background = true;
	}

	pub fn reset(&mut self) {
		*self = Pipeline::new();
	}

	pub fn stages(&self) -> &[ArgumentVector] {
		&self.stages
	}

	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}

	pub fn modifiers(&self) -> &RedirectionSet {
		&self.modifiers
	}

	pub fn output_file(&self) -> Option<&str> {
		self.output_file.as_deref()
	}

	pub fn input_file(&self) -> Option<&str> {
		self.input_file.as_deref()
	}

	pub fn error_file(&self) -> Option<&str> {
		self.error_file.as_deref()
	}

	pub fn is_append(&self) -> bool {
		self.append
	}

	pub fn is_error_append(&self) -> bool {
		self.error_append
	}

	pub fn is_background(&self) -> bool {
		self.background
	}
}

impl fmt::Display for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "\n")?;
		writeln!(f, "              COMMAND TABLE                ")?;
		writeln!(f)?;
		writeln!(f, "  #   Simple Commands")?;
		writeln!(f, "  --- ----------------------------------------------------------")?;
		for (i, stage) in self.stages.iter().enumerate() {
			write!(f, "  {:<3} ", i)?;
			for argument in stage.arguments() {
				write!(f, "\"{}\" \t", argument)?;
			}
			writeln!(f)?;
		}
		writeln!(f, "\n")?;
		writeln!(f, "  Output       Input        Error        Background")?;
		writeln!(f, "  ------------ ------------ ------------ ------------")?;
		writeln!(f, "  {:<12} {:<12} {:<12} {:<12}",
		         self.output_file().unwrap_or("default"),
		         self.input_file().unwrap_or("default"),
		         self.error_file().unwrap_or("default"),
		         if self.background { "YES" } else { "NO" })?;
		if self.modifiers().len() > 0 {
			writeln!(f)?;
			writeln!(f, "  Modifier     File")?;
			writeln!(f, "  ------------ ------------")?;
			for modifier in self.modifiers().iter() {
				writeln!(f, "  {:<12} {}", modifier.kind.to_string(), modifier.target)?;
			}
		}
		writeln!(f, "\n")
	}
}
