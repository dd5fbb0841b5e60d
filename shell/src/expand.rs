use std::borrow::Cow;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use glob::{glob_with, MatchOptions};
use nix::unistd::User;
use tracing::{debug, warn};

const WILDCARDS: &[char] = &['*', '?'];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
	case_sensitive: true,
	require_literal_separator: true,
	require_literal_leading_dot: true,
};

pub fn has_wildcard(word: &str) -> bool {
	word.contains(WILDCARDS)
}

/// Matches `pattern` against the filesystem, in sorted order.
pub fn expand(pattern: &str) -> Vec<String> {
	let pattern = expand_tilde(pattern, env::var_os("HOME"));
	let paths = match glob_with(&pattern, MATCH_OPTIONS) {
		Ok(paths) => paths,
		Err(e) => {
			warn!(pattern = %pattern, "invalid wildcard pattern: {}", e);
			return vec![];
		},
	};
	let mut matches = vec![];
	for entry in paths {
		match entry {
			Ok(path) => matches.push(path.to_string_lossy().into_owned()),
			Err(e) => debug!(error = %e, "skipping unreadable path"),
		}
	}
	debug!(pattern = %pattern, matches = matches.len(), "expanded wildcard");
	matches
}

/// `~` and `~/rest` use `home`; `~name/rest` looks the user up.
/// Words whose home directory cannot be found are returned unchanged.
pub fn expand_tilde(word: &str, home: Option<OsString>) -> Cow<'_, str> {
	let rest = match word.strip_prefix('~') {
		Some(rest) => rest,
		None => return Cow::Borrowed(word),
	};
	let (name, tail) = match rest.find('/') {
		Some(i) => rest.split_at(i),
		None => (rest, ""),
	};
	let dir: Option<PathBuf> = if name.is_empty() {
		home.map(PathBuf::from)
	} else {
		match User::from_name(name) {
			Ok(Some(user)) => Some(user.dir),
			_ => None,
		}
	};
	match dir {
		Some(dir) => Cow::Owned(format!("{}{}", dir.to_string_lossy(), tail)),
		None => Cow::Borrowed(word),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::{self, File};

	#[test]
	fn detects_metacharacters() {
		assert!(has_wildcard("*.rs"));
		assert!(has_wildcard("a?c"));
		assert!(!has_wildcard("plain"));
		assert!(!has_wildcard("~/notes"));
	}

	#[test]
	fn matches_are_sorted_and_case_sensitive() {
		let dir = tempfile::tempdir().unwrap();
		for name in &["b.txt", "a.txt", "C.TXT", ".hidden.txt", "ab"] {
			File::create(dir.path().join(name)).unwrap();
		}
		let base = dir.path().display();
		assert_eq!(expand(&format!("{}/*.txt", base)),
		           vec![format!("{}/a.txt", base), format!("{}/b.txt", base)]);
		assert_eq!(expand(&format!("{}/a?", base)), vec![format!("{}/ab", base)]);
	}

	#[test]
	fn star_does_not_cross_directories() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		File::create(dir.path().join("sub").join("x.txt")).unwrap();
		assert!(expand(&format!("{}/*.txt", dir.path().display())).is_empty());
		assert_eq!(expand(&format!("{}/*/*.txt", dir.path().display())).len(), 1);
	}

	#[test]
	fn unmatched_and_invalid_patterns_expand_to_nothing() {
		let dir = tempfile::tempdir().unwrap();
		assert!(expand(&format!("{}/*.none", dir.path().display())).is_empty());
		assert!(expand("[*").is_empty());
	}

	#[test]
	fn tilde_uses_given_home() {
		let home = Some(OsString::from("/home/u"));
		assert_eq!(expand_tilde("~", home.clone()), "/home/u");
		assert_eq!(expand_tilde("~/src/*.rs", home.clone()), "/home/u/src/*.rs");
		assert_eq!(expand_tilde("a~b", home.clone()), "a~b");
		assert_eq!(expand_tilde("~/x", None), "~/x");
		assert_eq!(expand_tilde("~no-such-user-here/x", home), "~no-such-user-here/x");
	}

	#[test]
	fn tilde_of_named_user() {
		assert_eq!(expand_tilde("~root/*", None), "/root/*");
	}
}
