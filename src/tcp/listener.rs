use std::convert::Infallible;
use std::mem::ManuallyDrop;
use std::os::fd::OwnedFd;

use crate::addr::SocketAddrV4;
use crate::error::SocketError;
use super::stream::Stream;
use super::sys;

/// Backlog used by [`Listener::listen`].
///
/// 128 is plenty for small services; high-traffic servers should pick
/// their own via [`Listener::listen_with`].
pub const DEFAULT_BACKLOG: i32 = 128;

/// What the accept loop does when `accept()` fails.
///
/// The historical contract treats every accept failure as fatal; this
/// makes that policy explicit instead of silent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcceptPolicy {
    /// Any accept failure ends the loop and is returned to the caller.
    #[default]
    FailFast,
    /// Transient failures (interrupted syscall, peer aborted during
    /// handshake, descriptor or buffer exhaustion) are logged and the loop
    /// keeps accepting. Anything else still ends the loop.
    ResumeTransient,
}

impl AcceptPolicy {
    fn is_transient(self, errno: i32) -> bool {
        match self {
            AcceptPolicy::FailFast => false,
            AcceptPolicy::ResumeTransient => matches!(
                errno,
                libc::EINTR
                    | libc::ECONNABORTED
                    | libc::EMFILE
                    | libc::ENFILE
                    | libc::ENOBUFS
                    | libc::ENOMEM
            ),
        }
    }
}

/// A TCP listener bound to a local IPv4 address.
///
/// Owns the listening descriptor exclusively; dropping the listener
/// shuts it down and closes it. Never copyable; a bound listening
/// resource has one owner.
pub struct Listener {
    fd: OwnedFd,
}

impl Listener {
    /// Binds to `ip:port`, where `ip` is a dotted-quad string.
    ///
    /// Fails with the offending text in the error when `ip` does not
    /// parse, and with the full address when socket creation or bind
    /// fails. `SO_REUSEADDR` is set before binding so a restarted
    /// server can reclaim a port still in TIME_WAIT.
    pub fn bind(ip: &str, port: u16) -> Result<Self, SocketError> {
        Self::bind_addr(SocketAddrV4::parse(ip, port)?)
    }

    /// Binds to an already-parsed address.
    pub fn bind_addr(addr: SocketAddrV4) -> Result<Self, SocketError> {
        use std::os::fd::AsRawFd;
        let fd = sys::socket_stream()?;
        sys::set_reuse_addr(fd.as_raw_fd(), true)?;
        sys::bind(fd.as_raw_fd(), addr)?;
        Ok(Self { fd })
    }

    /// Returns the raw file descriptor.
    #[inline]
    pub fn as_raw_fd(&self) -> libc::c_int {
        use std::os::fd::AsRawFd;
        self.fd.as_raw_fd()
    }

    /// Marks the socket as passively listening without entering the
    /// accept loop.
    ///
    /// Servers that drive their own accept cycle call this once, then
    /// [`accept`](Self::accept) repeatedly. [`listen`](Self::listen)
    /// and [`listen_with`](Self::listen_with) do both.
    pub fn start_listening(&self, backlog: i32) -> Result<(), SocketError> {
        sys::listen(self.as_raw_fd(), backlog)?;
        tracing::debug!(backlog, "listening");
        Ok(())
    }

    /// Accepts one incoming connection **using blocking semantics**.
    ///
    /// # Guarantees
    ///
    /// When this returns `Ok(Stream)`:
    ///
    /// - The TCP handshake has completed
    /// - The returned stream owns its descriptor and is ready for
    ///   send/recv
    ///
    /// # Failure Modes
    ///
    /// Returns the raw accept failure. Whether a given failure is
    /// fatal is the caller's decision: the loop in
    /// [`listen_with`](Self::listen_with) applies an [`AcceptPolicy`];
    /// manual callers apply their own.
    ///
    /// The socket must already be listening
    /// (see [`start_listening`](Self::start_listening)).
    pub fn accept(&self) -> Result<Stream, SocketError> {
        let fd = sys::accept(self.as_raw_fd())?;
        tracing::trace!("accepted connection");
        Ok(Stream::from_fd(fd))
    }

    /// Serves the blocking accept loop with the default backlog and
    /// the fail-fast accept policy.
    ///
    /// See [`listen_with`](Self::listen_with) for the loop contract.
    pub fn listen<F>(&self, callback: F) -> Result<Infallible, SocketError>
    where
        F: FnMut(Stream),
    {
        self.listen_with(DEFAULT_BACKLOG, AcceptPolicy::FailFast, callback)
    }

    /// Marks the socket listening, then accepts forever.
    ///
    /// For every inbound connection the new stream is passed to
    /// `callback`, synchronously, before the next accept, strictly
    /// one connection at a time, on the calling thread.
    ///
    /// The callback receives the [`Stream`] by value. Handling ends
    /// when the callback drops it; a callback that wants concurrent
    /// handling instead moves each stream to its own worker (thread,
    /// pool, channel) and returns immediately; the loop itself stays
    /// sequential either way.
    ///
    /// # Termination
    ///
    /// Never returns `Ok`: under normal operation the loop runs until
    /// the process exits. It returns `Err` only when an accept failure
    /// is classified fatal by `policy`.
    pub fn listen_with<F>(
        &self,
        backlog: i32,
        policy: AcceptPolicy,
        mut callback: F,
    ) -> Result<Infallible, SocketError>
    where
        F: FnMut(Stream),
    {
        self.start_listening(backlog)?;

        loop {
            match self.accept() {
                Ok(stream) => callback(stream),
                Err(SocketError::Accept { errno }) if policy.is_transient(errno) => {
                    tracing::warn!(errno, "transient accept failure, resuming");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Returns the locally bound address.
    ///
    /// Binding port 0 lets the OS pick a free port; this is how you
    /// learn which one it picked.
    pub fn local_addr(&self) -> Result<SocketAddrV4, SocketError> {
        sys::local_addr(self.as_raw_fd())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // shutdown on a listening socket normally reports ENOTCONN;
        // the close that follows is what actually frees the port
        let _ = sys::shutdown(self.as_raw_fd(), libc::SHUT_RDWR);
    }
}

impl std::os::fd::AsRawFd for Listener {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::os::fd::AsFd for Listener {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::os::fd::FromRawFd for Listener {
    unsafe fn from_raw_fd(fd: std::os::fd::RawFd) -> Self {
        unsafe {
            Self {
                fd: OwnedFd::from_raw_fd(fd),
            }
        }
    }
}

impl std::os::fd::IntoRawFd for Listener {
    fn into_raw_fd(self) -> std::os::fd::RawFd {
        // Same escape hatch as Stream: lift the fd out so the Drop
        // shutdown does not run.
        let this = ManuallyDrop::new(self);
        let fd = unsafe { std::ptr::read(&this.fd) };
        fd.into_raw_fd()
    }
}
