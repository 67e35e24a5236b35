use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use crate::error::ParseError;
use crate::types::*;

type ParseResult<T> = Result<T, ParseError>;

pub const PIPE: &[u8] = b"|";

/// Whitespace tokenization on raw bytes; no quoting, globbing or expansion.
pub fn tokenize(line: &[u8]) -> Vec<&[u8]> {
	line.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty()).collect()
}

fn to_os(token: &[u8]) -> ParseResult<OsString> {
	if token.contains(&0) {
		return Err(ParseError::NulByte);
	}
	Ok(OsStr::from_bytes(token).to_os_string())
}

struct Parser<'a> {
	tokens: &'a [&'a [u8]],
	i: usize,
}

impl<'a> Parser<'a> {
	fn peek(&self) -> Option<&'a [u8]> {
		self.tokens.get(self.i).copied()
	}

	fn read_target(&mut self, typ: RedirectType) -> ParseResult<OsString> {
		match self.peek() {
			Some(t) if t != PIPE && RedirectType::from_token(t).is_none() => {
				self.i += 1;
				to_os(t)
			},
			_ => Err(ParseError::MissingRedirectTarget { op: typ.as_str() }),
		}
	}

	fn parse_stage(&mut self, index: usize) -> ParseResult<StageSpec> {
		let mut stage = StageSpec::new(vec![]);

		while let Some(token) = self.peek() {
			if token == PIPE {
				break;
			}
			self.i += 1;
			let typ = match RedirectType::from_token(token) {
				Some(typ) => typ,
				None => {
					stage.tokens.push(to_os(token)?);
					continue;
				},
			};
			let target = self.read_target(typ)?;
			let slot = match typ {
				RedirectType::Input => &mut stage.input,
				RedirectType::Output | RedirectType::Append => &mut stage.output,
			};
			if slot.is_some() {
				return Err(ParseError::DuplicateRedirect { op: typ.as_str() });
			}
			*slot = Some(Redirect { target: target, typ: typ });
		}

		if stage.tokens.is_empty() {
			return Err(ParseError::EmptyStage { index: index });
		}
		Ok(stage)
	}

	fn parse_pipeline(&mut self) -> ParseResult<Pipeline> {
		let mut stages: Vec<StageSpec> = vec![];

		loop {
			let stage = self.parse_stage(stages.len())?;
			stages.push(stage);
			match self.peek() {
				Some(_) => { self.i += 1; },
				None => { break; },
			}
		}

		let last = stages.len() - 1;
		for (i, stage) in stages.iter().enumerate() {
			if let Some(ref r) = stage.input {
				if i != 0 {
					return Err(ParseError::MisplacedRedirect { op: r.typ.as_str(), stage: i });
				}
			}
			if let Some(ref r) = stage.output {
				if i != last {
					return Err(ParseError::MisplacedRedirect { op: r.typ.as_str(), stage: i });
				}
			}
		}
		Ok(Pipeline { stages: stages })
	}
}

/// Stage Splitter: cuts the token list at every [`PIPE`] token.
///
/// A leading, trailing or doubled delimiter (`||` included) yields
/// [`ParseError::EmptyStage`] carrying the index of the stage that would have
/// been empty. A bar embedded in a larger token (`a|b`) is an ordinary argument.
pub fn split<T: AsRef<[u8]>>(tokens: &[T]) -> ParseResult<Pipeline> {
	// A token made only of bars is a run of adjacent delimiters.
	let mut expanded: Vec<&[u8]> = Vec::with_capacity(tokens.len());
	for token in tokens {
		let token = token.as_ref();
		if !token.is_empty() && token.iter().all(|&b| b == b'|') {
			expanded.extend(std::iter::repeat(PIPE).take(token.len()));
		} else {
			expanded.push(token);
		}
	}
	let mut parser = Parser { tokens: &expanded, i: 0 };
	parser.parse_pipeline()
}

pub fn parse<L: AsRef<[u8]> + ?Sized>(line: &L) -> ParseResult<Pipeline> {
	split(&tokenize(line.as_ref()))
}
