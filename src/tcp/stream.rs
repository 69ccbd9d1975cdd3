use std::mem::ManuallyDrop;
use std::os::fd::OwnedFd;

use crate::addr::SocketAddrV4;
use crate::error::{RecvError, SendError, SocketError};
use super::sys;

/// A connected TCP stream.
///
/// Represents an established connection, ready for send/recv.
/// Created by [`Stream::connect`] (client side) or handed out by the
/// [`Listener`](super::Listener) accept loop (server side).
///
/// The stream owns its descriptor exclusively. Dropping it shuts the
/// connection down in both directions and closes the handle; moving it
/// transfers that duty, and the compiler makes sure no one keeps using
/// the moved-from binding. A connection never has two owners.
pub struct Stream {
	fd: OwnedFd,
}

impl Stream {
	/// Connects to `ip:port`, where `ip` is a dotted-quad string.
	///
	/// Creates the socket and performs a blocking connect. Fails with
	/// the offending text in the error when `ip` does not parse, and
	/// with the target address when socket creation or the connect
	/// syscall fails.
	pub fn connect(ip: &str, port: u16) -> Result<Self, SocketError> {
		Self::connect_addr(SocketAddrV4::parse(ip, port)?)
	}

	/// Connects to an already-parsed address.
	pub fn connect_addr(addr: SocketAddrV4) -> Result<Self, SocketError> {
		use std::os::fd::AsRawFd;
		let fd = sys::socket_stream()?;
		sys::connect(fd.as_raw_fd(), addr)?;
		tracing::trace!(%addr, "connected");
		Ok(Self { fd })
	}

	/// Wraps an accepted peer descriptor, taking ownership.
	///
	/// Internal use only - called by the Listener when handing off an
	/// accepted connection.
	pub(crate) fn from_fd(fd: OwnedFd) -> Self {
		Self { fd }
	}

	/// Returns the raw file descriptor.
	#[inline]
	pub fn as_raw_fd(&self) -> libc::c_int {
		use std::os::fd::AsRawFd;
		self.fd.as_raw_fd()
	}

	/// Sends one buffer of bytes.
	///
	/// Performs a single `send(2)`: the write may be short, and this
	/// method never loops; callers that need the whole buffer delivered
	/// retry with the remainder. Accepts anything byte-shaped
	/// (`&[u8]`, `Vec<u8>`, `&str`, `String`).
	pub fn send(&self, data: impl AsRef<[u8]>) -> Result<usize, SendError> {
		sys::send(self.as_raw_fd(), data.as_ref())
	}

	/// Receives into `buf`.
	///
	/// Performs a single `recv(2)`, blocking until data is available.
	/// `Ok(0)` means the peer has closed its write side; that is
	/// end-of-stream, not an error.
	pub fn recv(&self, buf: &mut [u8]) -> Result<usize, RecvError> {
		sys::recv(self.as_raw_fd(), buf)
	}

	/// Disables further sends and/or receives without closing the fd.
	pub fn shutdown(&self, how: Shutdown) -> Result<(), SocketError> {
		let how = match how {
			Shutdown::Read => libc::SHUT_RD,
			Shutdown::Write => libc::SHUT_WR,
			Shutdown::ReadWrite => libc::SHUT_RDWR,
		};
		sys::shutdown(self.as_raw_fd(), how)
	}

	/// Returns the remote address of this connection.
	pub fn peer_addr(&self) -> Result<SocketAddrV4, SocketError> {
		sys::peer_addr(self.as_raw_fd())
	}

	/// Returns the local address of this connection.
	pub fn local_addr(&self) -> Result<SocketAddrV4, SocketError> {
		sys::local_addr(self.as_raw_fd())
	}
}

/// Direction selector for [`Stream::shutdown`].
pub enum Shutdown {
	Read,   // SHUT_RD
	Write,  // SHUT_WR
	ReadWrite,   // SHUT_RDWR
}

impl Drop for Stream {
	fn drop(&mut self) {
		// Both directions go down before OwnedFd closes the handle.
		// Failure is unreportable here; the close still happens.
		let _ = sys::shutdown(self.as_raw_fd(), libc::SHUT_RDWR);
	}
}

impl std::os::fd::AsRawFd for Stream {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl std::os::fd::AsFd for Stream {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl std::os::fd::FromRawFd for Stream {
	unsafe fn from_raw_fd(fd: std::os::fd::RawFd) -> Self {
		unsafe { Self::from_fd(OwnedFd::from_raw_fd(fd)) }
	}
}

impl std::os::fd::IntoRawFd for Stream {
	fn into_raw_fd(self) -> std::os::fd::RawFd {
		// Hand the descriptor out as-is: the shutdown in Drop must not
		// run, so the fd is lifted out from under it.
		let this = ManuallyDrop::new(self);
		let fd = unsafe { std::ptr::read(&this.fd) };
		fd.into_raw_fd()
	}
}

impl std::io::Read for Stream {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		Stream::recv(self, buf).map_err(Into::into)
	}
}

impl std::io::Write for Stream {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		Stream::send(self, buf).map_err(Into::into)
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())  // TCP doesn't buffer at this level
	}
}
