use std::ffi::{CStr, CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::ptr;

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::error::OsError;
use crate::host::Host;
use crate::job::ChildHandle;
use crate::pipe::Connection;
use crate::types::{Redirect, RedirectType, StageSpec};

/// Argument vector in the form `execvp` wants it.
///
/// The null-terminated pointer array is built here, in the parent, so the
/// child does not allocate between fork and exec.
#[derive(Debug)]
pub struct Image {
	argv: Vec<CString>,
	ptrs: Vec<*const libc::c_char>,
}

impl Image {
	pub fn new(stage: &StageSpec) -> Result<Image, NulError> {
		let argv: Result<Vec<CString>, NulError> = stage.tokens.iter().map(|t| CString::new(t.as_bytes())).collect();
		let argv = argv?;
		let mut ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
		ptrs.push(ptr::null());
		Ok(Image { argv: argv, ptrs: ptrs })
	}

	pub fn program(&self) -> &CStr {
		&self.argv[0]
	}
}

/// Where one of the child's standard streams comes from or goes to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum End {
	Inherit,
	Fd(RawFd),
	File { path: CString, flags: OFlag },
}

impl End {
	fn file(redirect: &Redirect) -> Result<End, NulError> {
		let flags = match redirect.typ {
			RedirectType::Input => OFlag::O_RDONLY,
			RedirectType::Output => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
			RedirectType::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
		};
		Ok(End::File { path: CString::new(redirect.target.as_bytes())?, flags: flags })
	}
}

/// What a child does to its descriptors before exec.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Wiring {
	pub stdin: End,
	pub stdout: End,
	/// Every connection end the child inherits, used or not.
	pub close: Vec<RawFd>,
}

/// Wiring for stage `index` of a pipeline joined by `connections`.
///
/// | stage        | stdin                      | stdout                  |
/// |--------------|----------------------------|-------------------------|
/// | sole         | inherited                  | inherited               |
/// | first        | inherited                  | `connections[0].write`  |
/// | middle       | `connections[i - 1].read`  | `connections[i].write`  |
/// | last         | `connections[i - 1].read`  | inherited               |
///
/// A `<` redirect on the first stage or a `>`/`>>` on the last replaces the
/// inherited stream.
pub fn wiring(index: usize, stage: &StageSpec, connections: &[Connection]) -> Result<Wiring, NulError> {
	let last = connections.len();
	debug_assert!(index <= last);

	let stdin = if index > 0 {
		End::Fd(connections[index - 1].read)
	} else if let Some(ref r) = stage.input {
		End::file(r)?
	} else {
		End::Inherit
	};
	let stdout = if index < last {
		End::Fd(connections[index].write)
	} else if let Some(ref r) = stage.output {
		End::file(r)?
	} else {
		End::Inherit
	};
	let close = connections.iter().flat_map(|c| vec![c.read, c.write]).collect();
	Ok(Wiring { stdin: stdin, stdout: stdout, close: close })
}

/// Stage Spawner: launch stage `index` and return without waiting for it.
pub fn spawn<H: Host>(host: &H, index: usize, stage: &StageSpec, connections: &[Connection]) -> Result<ChildHandle, OsError> {
	if index > connections.len() {
		return Err(OsError::Sys { op: "wiring", errno: Errno::EINVAL });
	}
	let invalid = |_| OsError::Sys { op: "argv", errno: Errno::EINVAL };
	let image = Image::new(stage).map_err(invalid)?;
	let wiring = wiring(index, stage, connections).map_err(invalid)?;
	let pid = host.launch(&image, &wiring)?;
	debug!("stage {} ({}) spawned as pid {}", index, stage.program(), pid);
	Ok(ChildHandle { pid: pid, stage: index, program: stage.program().to_string() })
}

const PREFIX: &[u8] = b"pipesh: ";

/// Write to stderr without allocating or locking; safe between fork and exec.
fn report(parts: &[&[u8]]) {
	for part in parts {
		unsafe {
			libc::write(libc::STDERR_FILENO, part.as_ptr() as *const libc::c_void, part.len());
		}
	}
}

fn attach(end: &End, target: RawFd) -> Result<(), (Errno, &[u8])> {
	match *end {
		End::Inherit => Ok(()),
		End::Fd(fd) => {
			if fd != target {
				unistd::dup2(fd, target).map_err(|e| (e, &b"dup2"[..]))?;
			}
			Ok(())
		},
		End::File { ref path, flags } => {
			let fd = fcntl::open(path.as_c_str(), flags, Mode::from_bits_truncate(0o644))
				.map_err(|e| (e, path.to_bytes()))?;
			unistd::dup2(fd, target).map_err(|e| (e, path.to_bytes()))?;
			let _ = unistd::close(fd);
			Ok(())
		},
	}
}

fn do_exec_child(image: &Image, wiring: &Wiring) -> Errno {
	unsafe {
		let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
	}
	for &(end, target) in &[(&wiring.stdin, libc::STDIN_FILENO), (&wiring.stdout, libc::STDOUT_FILENO)] {
		if let Err((errno, what)) = attach(end, target) {
			report(&[PREFIX, what, b": ", errno.desc().as_bytes(), b"\n"]);
			unsafe { libc::_exit(1) }
		}
	}
	for &fd in &wiring.close {
		// An end that already sits on its target descriptor is in use.
		if (fd == libc::STDIN_FILENO && wiring.stdin == End::Fd(fd))
			|| (fd == libc::STDOUT_FILENO && wiring.stdout == End::Fd(fd)) {
			continue;
		}
		let _ = unistd::close(fd);
	}
	unsafe {
		libc::execvp(image.program().as_ptr(), image.ptrs.as_ptr());
	}
	Errno::last()
}

/// Child side of a launch: redirect, drop every connection end, exec.
///
/// Never returns; a failed exec ends the child with 127 (not found) or 126.
pub fn exec_child(image: &Image, wiring: &Wiring) -> ! {
	let errno = do_exec_child(image, wiring);
	let program = image.program().to_bytes();
	let status = if errno == Errno::ENOENT {
		report(&[PREFIX, program, b": command not found\n"]);
		127
	} else {
		report(&[PREFIX, program, b": ", errno.desc().as_bytes(), b"\n"]);
		126
	};
	unsafe { libc::_exit(status) }
}
