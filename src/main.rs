mod config;
mod error;
mod eval;
mod host;
mod job;
mod parser;
mod pipe;
mod spawn;
mod types;
#[cfg(test)]
mod testing;

use std::io;
use std::io::{BufRead, IsTerminal, Write};
use std::process;

use log::debug;

use error::ExecError;
use host::Posix;

const QUIT_WORDS: &[&[u8]] = &[b"exit", b"quit"];

/// Next line without its terminator, or `None` at end of input.
///
/// The line stays raw bytes; arguments need not be valid UTF-8.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<Vec<u8>>> {
	let mut line: Vec<u8> = vec![];
	if input.read_until(b'\n', &mut line)? == 0 {
		return Ok(None);
	}
	while let Some(b'\n') | Some(b'\r') = line.last() {
		line.pop();
	}
	Ok(Some(line))
}

fn is_quit(tokens: &[&[u8]]) -> bool {
	tokens.len() == 1 && QUIT_WORDS.contains(&tokens[0])
}

fn main() {
	let options: config::Options = argh::from_env();
	config::init_logger(options.verbose);

	let interactive = io::stdin().is_terminal();
	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		if interactive {
			let _ = stdout.write_all(options.prompt.as_bytes());
			let _ = stdout.flush();
		}
		let line = match read_line(&mut stdin_locked) {
			Ok(Some(line)) => line,
			Ok(None) => break,
			Err(e) => {
				eprintln!("pipesh: fatal error while reading input: {}", e);
				process::exit(1);
			},
		};
		let tokens = parser::tokenize(&line);
		if tokens.is_empty() {
			continue;
		}
		if is_quit(&tokens) {
			break;
		}
		match eval::eval(&Posix, &line) {
			Ok(result) => {
				if !result.success() {
					debug!("pipeline ended with status {}", result.status());
				}
				if options.status {
					eprintln!("{}", result);
				}
			},
			Err(e) => {
				eprintln!("pipesh: {}", e);
				if let (true, ExecError::Spawn { reaped, .. }) = (options.status, &e) {
					let codes: Vec<String> = reaped.iter().map(|s| s.to_string()).collect();
					eprintln!("reaped before abandoning: [{}]", codes.join(", "));
				}
			},
		}
	}
	if interactive {
		println!();
	}
}
