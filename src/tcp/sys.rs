//! Thin wrappers over the C socket calls.
//!
//! Every syscall the crate makes lives here. errno is read immediately
//! after each failing call, before any other OS interaction can
//! overwrite it.

use std::os::fd::{FromRawFd, OwnedFd};

use crate::addr::SocketAddrV4;
use crate::error::{RecvError, SendError, SocketError, errno};

/// Allocates a TCP/IPv4 socket.
///
/// The socket is created with `SOCK_CLOEXEC` (close on exec).
pub(crate) fn socket_stream() -> Result<OwnedFd, SocketError> {
	let fd = unsafe {
		libc::socket(
			libc::AF_INET,
			libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
			libc::IPPROTO_TCP,
		)
	};
	if fd == -1 {
		return Err(SocketError::Create { errno: errno() });
	}
	Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn bind(fd: libc::c_int, addr: SocketAddrV4) -> Result<(), SocketError> {
	let raw = addr.to_raw(); // sockaddr_in lives on THIS stack frame
	let result = unsafe {
		libc::bind(
			fd,
			&raw as *const _ as *const libc::sockaddr,
			std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
		)
	};
	if result == -1 {
		return Err(SocketError::Bind {
			errno: errno(),
			addr: addr.to_string(),
		});
	}
	Ok(())
}

pub(crate) fn connect(fd: libc::c_int, addr: SocketAddrV4) -> Result<(), SocketError> {
	let raw = addr.to_raw();
	let result = unsafe {
		libc::connect(
			fd,
			&raw as *const _ as *const libc::sockaddr,
			std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
		)
	};
	if result == -1 {
		return Err(SocketError::Connect {
			errno: errno(),
			addr: addr.to_string(),
		});
	}
	Ok(())
}

/// Marks the socket as passively listening.
pub(crate) fn listen(fd: libc::c_int, backlog: i32) -> Result<(), SocketError> {
	let result = unsafe { libc::listen(fd, backlog) };
	if result == -1 {
		return Err(SocketError::Listen { errno: errno(), backlog });
	}
	Ok(())
}

/// Blocks until an inbound connection arrives, returns the peer fd.
///
/// The peer descriptor is created with `SOCK_CLOEXEC`.
pub(crate) fn accept(fd: libc::c_int) -> Result<OwnedFd, SocketError> {
	let peer = unsafe {
		libc::accept4(
			fd,
			std::ptr::null_mut(), // peer address not needed here
			std::ptr::null_mut(),
			libc::SOCK_CLOEXEC,
		)
	};
	if peer == -1 {
		return Err(SocketError::Accept { errno: errno() });
	}
	Ok(unsafe { OwnedFd::from_raw_fd(peer) })
}

/// One non-retrying send. Short writes are the caller's problem.
///
/// `MSG_NOSIGNAL` keeps a dead peer from raising SIGPIPE; the
/// failure comes back through errno like every other one.
pub(crate) fn send(fd: libc::c_int, buf: &[u8]) -> Result<usize, SendError> {
	let n = unsafe {
		libc::send(
			fd,
			buf.as_ptr() as *const libc::c_void,
			buf.len(),
			libc::MSG_NOSIGNAL,
		)
	};
	if n == -1 {
		return Err(SendError::from_errno(errno()));
	}
	Ok(n as usize)
}

/// One non-retrying receive. Zero means the peer closed its write side.
pub(crate) fn recv(fd: libc::c_int, buf: &mut [u8]) -> Result<usize, RecvError> {
	let n = unsafe {
		libc::recv(
			fd,
			buf.as_mut_ptr() as *mut libc::c_void,
			buf.len(),
			0,
		)
	};
	if n == -1 {
		return Err(RecvError::from_errno(errno()));
	}
	Ok(n as usize)
}

/// Disables further transfers in the given direction(s).
pub(crate) fn shutdown(fd: libc::c_int, how: libc::c_int) -> Result<(), SocketError> {
	let result = unsafe { libc::shutdown(fd, how) };
	if result == -1 {
		return Err(SocketError::SetOption { errno: errno(), option: "shutdown" });
	}
	Ok(())
}

/// Sets SO_REUSEADDR on a socket.
///
/// Allows binding to an address that's in TIME_WAIT state.
/// Essential for server restarts.
pub(crate) fn set_reuse_addr(fd: libc::c_int, enable: bool) -> Result<(), SocketError> {
	let val: libc::c_int = if enable { 1 } else { 0 };
	let result = unsafe {
		libc::setsockopt(
			fd,
			libc::SOL_SOCKET,
			libc::SO_REUSEADDR,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		return Err(SocketError::SetOption { errno: errno(), option: "SO_REUSEADDR" });
	}
	Ok(())
}

/// Returns the address this socket is bound to.
pub(crate) fn local_addr(fd: libc::c_int) -> Result<SocketAddrV4, SocketError> {
	let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

	let result = unsafe {
		libc::getsockname(fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len)
	};
	if result == -1 {
		return Err(SocketError::Sockname { errno: errno(), call: "getsockname" });
	}
	Ok(SocketAddrV4::from_raw(&raw))
}

/// Returns the address of the connected peer.
pub(crate) fn peer_addr(fd: libc::c_int) -> Result<SocketAddrV4, SocketError> {
	let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

	let result = unsafe {
		libc::getpeername(fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len)
	};
	if result == -1 {
		return Err(SocketError::Sockname { errno: errno(), call: "getpeername" });
	}
	Ok(SocketAddrV4::from_raw(&raw))
}
