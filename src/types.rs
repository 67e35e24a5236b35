use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output, Append }

impl RedirectType {
	pub fn from_token(token: &[u8]) -> Option<RedirectType> {
		match token {
			b"<" => Some(RedirectType::Input),
			b">" => Some(RedirectType::Output),
			b">>" => Some(RedirectType::Append),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			RedirectType::Input => "<",
			RedirectType::Output => ">",
			RedirectType::Append => ">>",
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
	pub target: OsString,
	pub typ: RedirectType,
}

/// One external program invocation: `tokens[0]` is the program, the rest its arguments.
///
/// Tokens are raw bytes from the input line and reach `execvp` unchanged.
///
/// Never empty and never contains the pipe delimiter; [`crate::parser::split`] is the
/// only constructor outside of tests.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StageSpec {
	pub tokens: Vec<OsString>,
	pub input: Option<Redirect>,
	pub output: Option<Redirect>,
}

impl StageSpec {
	pub fn new(tokens: Vec<OsString>) -> StageSpec {
		StageSpec { tokens: tokens, input: None, output: None }
	}

	/// Program name for messages and logs.
	pub fn program(&self) -> Cow<str> {
		self.tokens[0].to_string_lossy()
	}
}

impl fmt::Display for StageSpec {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, token) in self.tokens.iter().enumerate() {
			if i != 0 {
				f.write_str(" ")?;
			}
			write!(f, "{}", token.to_string_lossy())?;
		}
		for r in self.input.iter().chain(self.output.iter()) {
			write!(f, " {} {}", r.typ.as_str(), r.target.to_string_lossy())?;
		}
		Ok(())
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
	pub stages: Vec<StageSpec>,
}

impl Pipeline {
	pub fn len(&self) -> usize {
		self.stages.len()
	}
}

impl fmt::Display for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, stage) in self.stages.iter().enumerate() {
			if i != 0 {
				f.write_str(" | ")?;
			}
			write!(f, "{}", stage)?;
		}
		Ok(())
	}
}
