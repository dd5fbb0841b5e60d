use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use nix::unistd;
use thiserror::Error;
use tracing::debug;

use crate::types::ArgumentVector;

pub type Builtin = fn(&ArgumentVector) -> u8;

#[derive(Clone, Copy)]
pub enum Dispatch {
	Builtin(Builtin),
	External,
}

const BUILTINS: &[(&str, Builtin)] = &[
	("cd", builtin_cd),
];

pub fn dispatch(stage: &ArgumentVector) -> Dispatch {
	stage.program()
		.and_then(|name| BUILTINS.iter().find(|&&(n, _)| n == name))
		.map_or(Dispatch::External, |&(_, f)| Dispatch::Builtin(f))
}

#[derive(Debug, Error)]
pub enum CdError {
	#[error("HOME is not set")]
	NoHome,
	#[error("{}", .0.desc())]
	Chdir(#[from] nix::Error),
}

pub fn change_directory(dir: Option<&str>, home: Option<OsString>) -> Result<(), CdError> {
	let target = match dir {
		Some(dir) => PathBuf::from(dir),
		None => home.map(PathBuf::from).ok_or(CdError::NoHome)?,
	};
	unistd::chdir(target.as_path())?;
	debug!(dir = %target.display(), "changed directory");
	Ok(())
}

pub fn builtin_cd(stage: &ArgumentVector) -> u8 {
	let dir = stage.arguments().get(1).map(String::as_str);
	match change_directory(dir, env::var_os("HOME")) {
		Ok(()) => 0,
		Err(e) => {
			let _ = writeln!(io::stderr(), "cd failed: {}", e);
			1
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test::SERIAL;

	fn stage(words: &[&str]) -> ArgumentVector {
		let mut v = ArgumentVector::new();
		for w in words {
			v.append(w);
		}
		v
	}

	#[test]
	fn dispatch_table() {
		assert!(matches!(dispatch(&stage(&["cd", "/"])), Dispatch::Builtin(_)));
		assert!(matches!(dispatch(&stage(&["ls"])), Dispatch::External));
		assert!(matches!(dispatch(&stage(&["cdx"])), Dispatch::External));
		assert!(matches!(dispatch(&ArgumentVector::new()), Dispatch::External));
	}

	#[test]
	fn cd_without_argument_goes_home() {
		let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
		let saved = env::current_dir().unwrap();
		let home = tempfile::tempdir().unwrap();
		change_directory(None, Some(home.path().as_os_str().to_owned())).unwrap();
		assert_eq!(env::current_dir().unwrap(), home.path().canonicalize().unwrap());
		env::set_current_dir(saved).unwrap();
	}

	#[test]
	fn cd_failure_leaves_directory_unchanged() {
		let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
		let saved = env::current_dir().unwrap();
		let err = change_directory(Some("/no/such/directory/here"), None).unwrap_err();
		assert_eq!(err.to_string(), "No such file or directory");
		assert!(matches!(change_directory(None, None), Err(CdError::NoHome)));
		assert_eq!(env::current_dir().unwrap(), saved);
	}
}
