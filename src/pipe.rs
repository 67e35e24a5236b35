use std::os::unix::io::RawFd;

use log::{debug, warn};

use crate::error::OsError;
use crate::host::Host;

/// One unidirectional channel between stage `i` and stage `i + 1`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Connection {
	pub read: RawFd,
	pub write: RawFd,
}

/// The N-1 connections of one pipeline execution.
///
/// Both ends of every connection are closed exactly once: by [`close_all`]
/// after the last stage is spawned, or by `Drop` on any early exit.
///
/// [`close_all`]: ConnectionSet::close_all
pub struct ConnectionSet<'h, H: Host> {
	host: &'h H,
	connections: Vec<Connection>,
	closed: bool,
}

impl<'h, H: Host> ConnectionSet<'h, H> {
	/// Allocate `count` connections in index order, before anything is spawned.
	///
	/// If one allocation fails, the ones already made are closed before the
	/// error is returned.
	pub fn open(host: &'h H, count: usize) -> Result<ConnectionSet<'h, H>, OsError> {
		let mut set = ConnectionSet { host: host, connections: Vec::with_capacity(count), closed: false };
		for _ in 0 .. count {
			let (read, write) = host.pipe()?;
			set.connections.push(Connection { read: read, write: write });
		}
		debug!("opened {} connections: {:?}", count, set.connections);
		Ok(set)
	}

	pub fn as_slice(&self) -> &[Connection] {
		if self.closed { &[] } else { &self.connections }
	}

	/// Close the parent's copy of every end. Later calls are no-ops.
	pub fn close_all(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		for c in &self.connections {
			for &fd in &[c.read, c.write] {
				if let Err(e) = self.host.close(fd) {
					warn!("closing connection end {}: {}", fd, e);
				}
			}
		}
		debug!("closed {} connections", self.connections.len());
	}
}

impl<'h, H: Host> Drop for ConnectionSet<'h, H> {
	fn drop(&mut self) {
		self.close_all();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::RecordingHost;

	#[test]
	fn opens_in_order_and_closes_once() {
		let host = RecordingHost::new();
		{
			let mut set = ConnectionSet::open(&host, 3).unwrap();
			assert_eq!(set.as_slice().len(), 3);
			assert_eq!(host.pipes(), 3);
			let ends: Vec<RawFd> = set.as_slice().iter().flat_map(|c| vec![c.read, c.write]).collect();
			assert_eq!(ends, host.created());
			set.close_all();
			set.close_all();
			assert!(set.as_slice().is_empty());
		}
		host.assert_parent_closed_all_once();
	}

	#[test]
	fn drop_closes_when_not_closed_explicitly() {
		let host = RecordingHost::new();
		drop(ConnectionSet::open(&host, 2).unwrap());
		host.assert_parent_closed_all_once();
	}

	#[test]
	fn failed_open_releases_partial_set() {
		let host = RecordingHost::new().fail_pipe_at(2);
		let err = ConnectionSet::open(&host, 4).err().unwrap();
		assert!(matches!(err, OsError::ResourceExhausted { .. }));
		assert_eq!(host.pipes(), 2);
		host.assert_parent_closed_all_once();
	}

	#[test]
	fn zero_connections() {
		let host = RecordingHost::new();
		let set = ConnectionSet::open(&host, 0).unwrap();
		assert!(set.as_slice().is_empty());
		drop(set);
		assert!(host.created().is_empty());
	}
}
