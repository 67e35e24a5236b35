use log::{debug, warn};

use crate::error::ExecError;
use crate::host::Host;
use crate::job::{ExecutionResult, Job};
use crate::parser;
use crate::pipe::ConnectionSet;
use crate::spawn;
use crate::types::{Pipeline, StageSpec};

/// Single-Command Runner: one child, no connections.
pub fn run_single<H: Host>(host: &H, stage: &StageSpec) -> Result<ExecutionResult, ExecError> {
	let child = spawn::spawn(host, 0, stage, &[]).map_err(|e| ExecError::Spawn {
		stage: 0,
		program: stage.program().to_string(),
		source: e,
		reaped: vec![],
	})?;
	Ok(ExecutionResult { statuses: vec![child.reap(host)] })
}

/// Pipeline Coordinator.
///
/// Opens every connection up front, spawns the stages in order, closes the
/// parent's copies of all connection ends and only then reaps, so that each
/// reader sees end-of-stream once its producer exits. If a stage cannot be
/// spawned the rest are not attempted: the connections are closed and the
/// stages already running are reaped before the error is returned.
pub fn run<H: Host>(host: &H, pipeline: &Pipeline) -> Result<ExecutionResult, ExecError> {
	let n = pipeline.len();
	if n == 1 {
		return run_single(host, &pipeline.stages[0]);
	}

	let mut connections = ConnectionSet::open(host, n - 1).map_err(ExecError::Connections)?;
	let mut job = Job::new(n);
	for (i, stage) in pipeline.stages.iter().enumerate() {
		match spawn::spawn(host, i, stage, connections.as_slice()) {
			Ok(child) => job.push(child),
			Err(e) => {
				warn!("stage {} ({}) failed to spawn, abandoning pipeline: {}", i, stage.program(), e);
				connections.close_all();
				return Err(ExecError::Spawn {
					stage: i,
					program: stage.program().to_string(),
					source: e,
					reaped: job.reap_all(host),
				});
			},
		}
	}
	connections.close_all();

	debug!("reaping {} stages", job.len());
	Ok(ExecutionResult { statuses: job.reap_all(host) })
}

/// Split and run one line. The bytes of each argument reach the program unchanged.
pub fn eval<H: Host, L: AsRef<[u8]> + ?Sized>(host: &H, line: &L) -> Result<ExecutionResult, ExecError> {
	let pipeline = parser::parse(line)?;
	run(host, &pipeline)
}
