use std::fmt;

use nix::errno::Errno;
use thiserror::Error;

use crate::job::StageStatus;

/// Malformed line; nothing has been spawned when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty stage at position {index}")]
	EmptyStage { index: usize },
	#[error("missing target after '{op}'")]
	MissingRedirectTarget { op: &'static str },
	#[error("'{op}' is not allowed on stage {stage}")]
	MisplacedRedirect { op: &'static str, stage: usize },
	#[error("more than one '{op}' redirect on a stage")]
	DuplicateRedirect { op: &'static str },
	#[error("argument contains a nul byte")]
	NulByte,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Resource { Connection, Process }

impl fmt::Display for Resource {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Resource::Connection => f.write_str("connection"),
			Resource::Process => f.write_str("process"),
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum OsError {
	#[error("cannot allocate {resource}: {}", .errno.desc())]
	ResourceExhausted { resource: Resource, errno: Errno },
	#[error("{op} failed: {}", .errno.desc())]
	Sys { op: &'static str, errno: Errno },
}

impl OsError {
	pub fn sys(op: &'static str) -> impl FnOnce(Errno) -> OsError {
		move |errno| OsError::Sys { op: op, errno: errno }
	}

	pub fn exhausted(resource: Resource) -> impl FnOnce(Errno) -> OsError {
		move |errno| OsError::ResourceExhausted { resource: resource, errno: errno }
	}

	pub fn errno(&self) -> Errno {
		match *self {
			OsError::ResourceExhausted { errno, .. } => errno,
			OsError::Sys { errno, .. } => errno,
		}
	}
}

/// Everything that can stop one line from running to completion.
///
/// `Spawn` still carries the statuses of the children that were started and
/// reaped before the pipeline was abandoned.
#[derive(Debug, Error)]
pub enum ExecError {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error("cannot open connections: {0}")]
	Connections(#[source] OsError),
	#[error("cannot spawn stage {stage} ({program}): {source}")]
	Spawn {
		stage: usize,
		program: String,
		#[source]
		source: OsError,
		reaped: Vec<StageStatus>,
	},
}
