//! In-memory [`Host`] that records every primitive a pipeline execution uses.
//!
//! Descriptors and pids are fake. A launched child is modelled as inheriting a
//! copy of every descriptor the parent holds open at launch time, so tests can
//! check that each child closes all of them.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::error::{OsError, Resource};
use crate::host::Host;
use crate::spawn::{Image, Wiring};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Event {
	Pipe(RawFd, RawFd),
	Close(RawFd),
	Launch(Pid),
	Reap(Pid),
}

#[derive(Debug, Clone)]
pub struct Launched {
	pub pid: Pid,
	pub program: String,
	pub wiring: Wiring,
	pub inherited: Vec<RawFd>,
}

#[derive(Debug, Default)]
struct Inner {
	next_fd: RawFd,
	next_pid: i32,
	open: BTreeSet<RawFd>,
	created: Vec<RawFd>,
	events: Vec<Event>,
	launched: Vec<Launched>,
	programs: HashMap<Pid, String>,
	pipes: usize,
	launches: usize,
	reaps: usize,
	fail_pipe_at: Option<usize>,
	fail_launch_at: Option<usize>,
	fail_reap_at: Option<usize>,
}

#[derive(Debug)]
pub struct RecordingHost {
	inner: RefCell<Inner>,
}

/// Exit code a fake child reports, keyed on its program name.
fn exit_code(program: &str) -> i32 {
	match program {
		"false" => 1,
		p if p.starts_with("missing") => 127,
		_ => 0,
	}
}

impl RecordingHost {
	pub fn new() -> RecordingHost {
		RecordingHost { inner: RefCell::new(Inner { next_fd: 100, next_pid: 1000, ..Inner::default() }) }
	}

	/// The `n`th pipe (counting from 0) fails with `EMFILE`.
	pub fn fail_pipe_at(self, n: usize) -> RecordingHost {
		self.inner.borrow_mut().fail_pipe_at = Some(n);
		self
	}

	/// The `n`th launch fails with `EAGAIN`.
	pub fn fail_launch_at(self, n: usize) -> RecordingHost {
		self.inner.borrow_mut().fail_launch_at = Some(n);
		self
	}

	/// The `n`th reap fails with `ECHILD`.
	pub fn fail_reap_at(self, n: usize) -> RecordingHost {
		self.inner.borrow_mut().fail_reap_at = Some(n);
		self
	}

	/// Register a child without going through `launch`.
	pub fn fake_child(&self, program: &str) -> Pid {
		let mut inner = self.inner.borrow_mut();
		inner.next_pid += 1;
		let pid = Pid::from_raw(inner.next_pid);
		inner.programs.insert(pid, program.to_string());
		pid
	}

	pub fn pipes(&self) -> usize {
		self.inner.borrow().pipes
	}

	pub fn created(&self) -> Vec<RawFd> {
		self.inner.borrow().created.clone()
	}

	pub fn events(&self) -> Vec<Event> {
		self.inner.borrow().events.clone()
	}

	pub fn launched(&self) -> Vec<Launched> {
		self.inner.borrow().launched.clone()
	}

	pub fn reaped(&self) -> Vec<Pid> {
		self.events().into_iter().filter_map(|e| match e {
			Event::Reap(pid) => Some(pid),
			_ => None,
		}).collect()
	}

	pub fn assert_parent_closed_all_once(&self) {
		let inner = self.inner.borrow();
		assert!(inner.open.is_empty(), "still open in parent: {:?}", inner.open);
		for &fd in &inner.created {
			let n = inner.events.iter().filter(|&&e| e == Event::Close(fd)).count();
			assert_eq!(n, 1, "fd {} closed {} times in parent", fd, n);
		}
	}

	pub fn assert_children_closed_inherited(&self) {
		for child in &self.inner.borrow().launched {
			let mut closed = child.wiring.close.clone();
			closed.sort();
			let before = closed.len();
			closed.dedup();
			assert_eq!(before, closed.len(), "child {} closes an end twice", child.pid);
			assert_eq!(closed, child.inherited, "child {} leaves ends open", child.pid);
		}
	}
}

impl Host for RecordingHost {
	fn pipe(&self) -> Result<(RawFd, RawFd), OsError> {
		let mut inner = self.inner.borrow_mut();
		if inner.fail_pipe_at == Some(inner.pipes) {
			return Err(OsError::ResourceExhausted { resource: Resource::Connection, errno: Errno::EMFILE });
		}
		inner.pipes += 1;
		let (r, w) = (inner.next_fd, inner.next_fd + 1);
		inner.next_fd += 2;
		inner.open.insert(r);
		inner.open.insert(w);
		inner.created.extend_from_slice(&[r, w]);
		inner.events.push(Event::Pipe(r, w));
		Ok((r, w))
	}

	fn close(&self, fd: RawFd) -> Result<(), OsError> {
		let mut inner = self.inner.borrow_mut();
		inner.events.push(Event::Close(fd));
		if inner.open.remove(&fd) {
			Ok(())
		} else {
			Err(OsError::Sys { op: "close", errno: Errno::EBADF })
		}
	}

	fn launch(&self, image: &Image, wiring: &Wiring) -> Result<Pid, OsError> {
		let mut inner = self.inner.borrow_mut();
		let n = inner.launches;
		inner.launches += 1;
		if inner.fail_launch_at == Some(n) {
			return Err(OsError::ResourceExhausted { resource: Resource::Process, errno: Errno::EAGAIN });
		}
		inner.next_pid += 1;
		let pid = Pid::from_raw(inner.next_pid);
		let program = image.program().to_string_lossy().into_owned();
		let inherited = inner.open.iter().cloned().collect();
		inner.programs.insert(pid, program.clone());
		inner.launched.push(Launched { pid: pid, program: program, wiring: wiring.clone(), inherited: inherited });
		inner.events.push(Event::Launch(pid));
		Ok(pid)
	}

	fn reap(&self, pid: Pid) -> Result<WaitStatus, OsError> {
		let mut inner = self.inner.borrow_mut();
		let n = inner.reaps;
		inner.reaps += 1;
		inner.events.push(Event::Reap(pid));
		if inner.fail_reap_at == Some(n) {
			return Err(OsError::Sys { op: "waitpid", errno: Errno::ECHILD });
		}
		match inner.programs.remove(&pid) {
			Some(program) => Ok(WaitStatus::Exited(pid, exit_code(&program))),
			None => Err(OsError::Sys { op: "waitpid", errno: Errno::ECHILD }),
		}
	}
}
