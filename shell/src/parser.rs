use std::borrow::Cow;

use thiserror::Error;

use crate::types::RedirectKind;

/// Receiver of the mutation calls a parsed line turns into.
pub trait Sink {
	fn new_argument_vector(&mut self);
	fn append_argument(&mut self, text: &str);
	fn add_stage(&mut self);
	fn set_redirection(&mut self, kind: RedirectKind, filename: &str);
	fn set_append_mode(&mut self);
	fn set_background(&mut self);
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("empty redirect")]
	EmptyRedirect,
	#[error("bad file descriptor in redirect: {0}")]
	BadDescriptor(String),
	#[error("character after '&': '{0}'")]
	TrailingAfterBackground(char),
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Redirect { Input, Output, Append, Error, ErrorAppend, Both, BothAppend }

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n' | b'\r')
	}

	fn is_letter(c: u8) -> bool {
		match c {
			b'>' | b'<' | b'&' | b'|' => false,
			_ => !Parser::is_whitespace(c),
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn peek(&self) -> Option<u8> {
		self.line.get(self.i).cloned()
	}

	fn eat(&mut self, c: u8) -> bool {
		if self.peek() == Some(c) {
			self.i += 1;
			true
		} else {
			false
		}
	}

	fn read_word(&mut self) -> Cow<'a, str> {
		let orig = self.i;
		self.proceed_while(Parser::is_letter);
		String::from_utf8_lossy(&self.line[orig .. self.i])
	}

	fn read_number(&mut self) -> Option<&'a [u8]> {
		let orig = self.i;
		self.proceed_while(|c| c.is_ascii_digit());
		if orig == self.i { None } else { Some(&self.line[orig .. self.i]) }
	}

	fn parse_redirect(&mut self) -> ParseResult<Option<(Redirect, Cow<'a, str>)>> {
		let orig = self.i;
		let num = self.read_number();

		let typ = if self.eat(b'<') {
			Redirect::Input
		} else if self.eat(b'>') {
			let append = self.eat(b'>');
			let both = num.is_none() && self.eat(b'&');
			match (both, append) {
				(true, false) => Redirect::Both,
				(true, true) => Redirect::BothAppend,
				(false, false) => Redirect::Output,
				(false, true) => Redirect::Append,
			}
		} else {
			self.i = orig;
			return Ok(None);
		};

		let typ = match (num, typ) {
			(None, typ)
			| (Some(b"0"), typ @ Redirect::Input)
			| (Some(b"1"), typ @ Redirect::Output)
			| (Some(b"1"), typ @ Redirect::Append) => typ,
			(Some(b"2"), Redirect::Output) => Redirect::Error,
			(Some(b"2"), Redirect::Append) => Redirect::ErrorAppend,
			(Some(n), _) => {
				return Err(ParseError::BadDescriptor(String::from_utf8_lossy(n).into_owned()));
			},
		};

		self.skip_whitespaces();
		let target = self.read_word();
		if target.is_empty() {
			return Err(ParseError::EmptyRedirect);
		}
		Ok(Some((typ, target)))
	}

	fn parse_command<S: Sink>(&mut self, sink: &mut S) -> ParseResult<()> {
		let mut words = 0;
		sink.new_argument_vector();
		loop {
			self.skip_whitespaces();
			if let Some((typ, target)) = self.parse_redirect()? {
				apply_redirect(sink, typ, &target);
				continue;
			}
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			sink.append_argument(&word);
			words += 1;
		}
		if words == 0 {
			return Err(ParseError::EmptyCommand);
		}
		sink.add_stage();
		Ok(())
	}

	fn parse_pipeline<S: Sink>(&mut self, sink: &mut S) -> ParseResult<()> {
		self.skip_whitespaces();
		if self.peek().is_none() {
			return Ok(());
		}
		loop {
			self.parse_command(sink)?;
			match self.peek() {
				Some(b'|') => { self.i += 1; },
				Some(b'&') => {
					self.i += 1;
					sink.set_background();
					self.skip_whitespaces();
					if let Some(c) = self.peek() {
						return Err(ParseError::TrailingAfterBackground(c as char));
					}
					break;
				},
				_ => { break; },
			}
		}
		Ok(())
	}
}

fn apply_redirect<S: Sink>(sink: &mut S, typ: Redirect, target: &str) {
	match typ {
		Redirect::Input => sink.set_redirection(RedirectKind::Input, target),
		Redirect::Output => sink.set_redirection(RedirectKind::Output, target),
		Redirect::Append => sink.set_redirection(RedirectKind::Append, target),
		Redirect::Error => sink.set_redirection(RedirectKind::Error, target),
		Redirect::ErrorAppend => sink.set_redirection(RedirectKind::ErrorAppend, target),
		Redirect::Both => {
			sink.set_redirection(RedirectKind::Output, target);
			sink.set_redirection(RedirectKind::Error, target);
		},
		Redirect::BothAppend => {
			sink.set_redirection(RedirectKind::Output, target);
			sink.set_append_mode();
			sink.set_redirection(RedirectKind::ErrorAppend, target);
		},
	}
}

/// Parses one input line into calls on `sink`. Calls made before an error
/// are not undone; the caller discards the half-built pipeline.
pub fn parse<S: Sink>(line: &[u8], sink: &mut S) -> ParseResult<()> {
	let mut parser = Parser { line: line, i: 0 };
	parser.parse_pipeline(sink)
}
