use std::io::Write;

use argh::FromArgs;
use log::LevelFilter;

#[derive(FromArgs, Debug)]
/// Read lines from standard input and run each as a `|`-separated pipeline.
pub struct Options {
	/// prompt written before each line when stdin is a terminal
	#[argh(option, default = "String::from(\"$ \")")]
	pub prompt: String,

	/// print every stage's exit status to stderr after each pipeline
	#[argh(switch)]
	pub status: bool,

	/// log more; give twice for debug output
	#[argh(switch, short = 'v')]
	pub verbose: u8,
}

fn level(verbose: u8) -> LevelFilter {
	match verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		_ => LevelFilter::Debug,
	}
}

/// Install the stderr logger. `RUST_LOG`, when set, wins over `-v`.
pub fn init_logger(verbose: u8) {
	let mut builder = env_logger::Builder::new();
	builder.filter_level(level(verbose));
	builder.parse_env(env_logger::Env::default());
	builder.format(|buf, record| {
		writeln!(buf, "[{}] {}", record.level(), record.args())
	});
	let _ = builder.try_init();
}
