use std::os::unix::io::{IntoRawFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::{OsError, Resource};
use crate::spawn::{self, Image, Wiring};

/// The POSIX primitives the engine sequences.
///
/// The engine never calls `pipe`, `close`, `fork` or `waitpid` directly; going
/// through this trait lets tests count every descriptor a pipeline touches.
pub trait Host {
	/// Create one connection, returning `(read_end, write_end)`.
	fn pipe(&self) -> Result<(RawFd, RawFd), OsError>;

	fn close(&self, fd: RawFd) -> Result<(), OsError>;

	/// Start a child that applies `wiring` and replaces itself with `image`.
	///
	/// Returns in the parent only; the child either execs or exits.
	fn launch(&self, image: &Image, wiring: &Wiring) -> Result<Pid, OsError>;

	/// Block until `pid` changes state.
	fn reap(&self, pid: Pid) -> Result<WaitStatus, OsError>;
}

/// The real operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct Posix;

impl Host for Posix {
	fn pipe(&self) -> Result<(RawFd, RawFd), OsError> {
		let (r, w) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(OsError::exhausted(Resource::Connection))?;
		Ok((r.into_raw_fd(), w.into_raw_fd()))
	}

	fn close(&self, fd: RawFd) -> Result<(), OsError> {
		unistd::close(fd).map_err(OsError::sys("close"))
	}

	fn launch(&self, image: &Image, wiring: &Wiring) -> Result<Pid, OsError> {
		// Everything the child touches is built before the fork.
		match unsafe { unistd::fork() }.map_err(OsError::exhausted(Resource::Process))? {
			ForkResult::Parent { child } => Ok(child),
			ForkResult::Child => spawn::exec_child(image, wiring),
		}
	}

	fn reap(&self, pid: Pid) -> Result<WaitStatus, OsError> {
		loop {
			match wait::waitpid(pid, None) {
				Err(Errno::EINTR) => continue,
				r => return r.map_err(OsError::sys("waitpid")),
			}
		}
	}
}
