use std::fmt;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::host::Host;

/// How one stage ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StageStatus {
	Exited(i32),
	Signaled(Signal),
	/// Waiting for the child failed; its real status is unknown.
	Lost(Errno),
}

impl StageStatus {
	/// Shell-style numeric status: the exit code, or 128 plus the signal number.
	pub fn code(self) -> i32 {
		match self {
			StageStatus::Exited(code) => code,
			StageStatus::Signaled(sig) => 128 + sig as i32,
			StageStatus::Lost(_) => 1,
		}
	}
}

impl fmt::Display for StageStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			StageStatus::Exited(code) => write!(f, "{}", code),
			StageStatus::Signaled(sig) => write!(f, "{}", sig),
			StageStatus::Lost(errno) => write!(f, "lost ({})", errno),
		}
	}
}

trait WaitStatusExt {
	fn stage_status(self) -> Option<StageStatus>;
}

impl WaitStatusExt for WaitStatus {
	fn stage_status(self) -> Option<StageStatus> {
		match self {
			WaitStatus::Exited(_, code) => Some(StageStatus::Exited(code)),
			WaitStatus::Signaled(_, sig, _) => Some(StageStatus::Signaled(sig)),
			_ => None,
		}
	}
}

/// A spawned stage, valid until reaped.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ChildHandle {
	pub pid: Pid,
	pub stage: usize,
	pub program: String,
}

impl ChildHandle {
	/// Wait until the child terminates. Failures are recorded, not returned.
	pub fn reap<H: Host>(&self, host: &H) -> StageStatus {
		loop {
			match host.reap(self.pid) {
				Ok(ws) => if let Some(status) = ws.stage_status() {
					debug!("stage {} ({}) pid {} ended: {}", self.stage, self.program, self.pid, status);
					return status;
				},
				Err(e) => {
					warn!("reaping stage {} ({}) pid {}: {}", self.stage, self.program, self.pid, e);
					return StageStatus::Lost(e.errno());
				},
			}
		}
	}
}

/// The children of one pipeline, in stage order.
#[derive(Debug)]
pub struct Job {
	children: Vec<ChildHandle>,
}

impl Job {
	pub fn new(size_hint: usize) -> Job {
		Job { children: Vec::with_capacity(size_hint) }
	}

	pub fn push(&mut self, child: ChildHandle) {
		self.children.push(child);
	}

	pub fn len(&self) -> usize {
		self.children.len()
	}

	/// Reap every child in stage order, even after a failed wait.
	pub fn reap_all<H: Host>(self, host: &H) -> Vec<StageStatus> {
		self.children.iter().map(|child| child.reap(host)).collect()
	}
}

/// Outcome of a pipeline that ran to completion.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExecutionResult {
	pub statuses: Vec<StageStatus>,
}

impl ExecutionResult {
	/// The last stage's status, which is the pipeline's status.
	pub fn status(&self) -> i32 {
		self.statuses.last().map_or(0, |s| s.code())
	}

	pub fn success(&self) -> bool {
		self.status() == 0
	}
}

impl fmt::Display for ExecutionResult {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let codes: Vec<String> = self.statuses.iter().map(|s| s.to_string()).collect();
		write!(f, "[{}] -> {}", codes.join(", "), self.status())
	}
}
