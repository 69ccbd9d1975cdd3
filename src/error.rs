/// Socket construction errors.
///
/// These are the fatal failures: the Stream or Listener never comes
/// into existence. Per-call send/recv failures use [`SendError`] and
/// [`RecvError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket() failed: {}", errno_to_str(*.errno))]
    Create { errno: i32 },

    #[error("cannot parse ip {text:?}")]
    InvalidAddress { text: String },

    #[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("accept() failed: {}", errno_to_str(*.errno))]
    Accept { errno: i32 },

    #[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
    SetOption { errno: i32, option: &'static str },

    #[error("{call}() failed: {}", errno_to_str(*.errno))]
    Sockname { errno: i32, call: &'static str },
}

/// Outcome kinds for a failed send.
///
/// Closed enumeration: one variant per recoverable condition the
/// caller may want to act on, `Unknown` for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("operation would block")]
    WouldBlock,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("message too large for transport")]
    MessageTooLarge,

    #[error("socket not connected")]
    NotConnected,

    #[error("send() failed: {}", errno_to_str(*.errno))]
    Unknown { errno: i32 },
}

/// Outcome kinds for a failed receive.
///
/// A receive of zero bytes is NOT represented here; the peer closing
/// its write side is end-of-stream, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    #[error("operation would block")]
    WouldBlock,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("no buffer space available")]
    NotEnoughMemory,

    #[error("recv() failed: {}", errno_to_str(*.errno))]
    Unknown { errno: i32 },
}

impl SendError {
    /// Classifies the errno left behind by a failed send().
    ///
    /// Must run immediately after the failing syscall, before anything
    /// else can overwrite errno. EAGAIN and EWOULDBLOCK are distinct
    /// conditions on some platforms, so both are tested.
    pub(crate) fn from_errno(errno: i32) -> Self {
        if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
            SendError::WouldBlock
        } else if errno == libc::ECONNRESET {
            SendError::ConnectionReset
        } else if errno == libc::EMSGSIZE {
            SendError::MessageTooLarge
        } else if errno == libc::ENOTCONN {
            SendError::NotConnected
        } else {
            SendError::Unknown { errno }
        }
    }
}

impl RecvError {
    /// Classifies the errno left behind by a failed recv().
    pub(crate) fn from_errno(errno: i32) -> Self {
        if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
            RecvError::WouldBlock
        } else if errno == libc::ECONNRESET {
            RecvError::ConnectionReset
        } else if errno == libc::ETIMEDOUT {
            RecvError::ConnectionTimeout
        } else if errno == libc::ENOMEM || errno == libc::ENOBUFS {
            RecvError::NotEnoughMemory
        } else {
            RecvError::Unknown { errno }
        }
    }
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
    match errno {
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECONNABORTED => "connection aborted".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EMFILE => "too many open files".into(),
        libc::EMSGSIZE => "message too long".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOMEM => "out of memory".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN | libc::EWOULDBLOCK => std::io::ErrorKind::WouldBlock,
        libc::ECONNABORTED => std::io::ErrorKind::ConnectionAborted,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOMEM => std::io::ErrorKind::OutOfMemory,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<SocketError> for std::io::Error {
    fn from(err: SocketError) -> Self {
        let errno = match &err {
            SocketError::Create { errno } => *errno,
            SocketError::InvalidAddress { .. } => libc::EINVAL,
            SocketError::Bind { errno, .. } => *errno,
            SocketError::Connect { errno, .. } => *errno,
            SocketError::Listen { errno, .. } => *errno,
            SocketError::Accept { errno } => *errno,
            SocketError::SetOption { errno, .. } => *errno,
            SocketError::Sockname { errno, .. } => *errno,
        };
        std::io::Error::new(errno_to_kind(errno), err)
    }
}

impl From<SendError> for std::io::Error {
    fn from(err: SendError) -> Self {
        let kind = match &err {
            SendError::WouldBlock => std::io::ErrorKind::WouldBlock,
            SendError::ConnectionReset => std::io::ErrorKind::ConnectionReset,
            SendError::MessageTooLarge => std::io::ErrorKind::InvalidInput,
            SendError::NotConnected => std::io::ErrorKind::NotConnected,
            SendError::Unknown { errno } => errno_to_kind(*errno),
        };
        std::io::Error::new(kind, err)
    }
}

impl From<RecvError> for std::io::Error {
    fn from(err: RecvError) -> Self {
        let kind = match &err {
            RecvError::WouldBlock => std::io::ErrorKind::WouldBlock,
            RecvError::ConnectionReset => std::io::ErrorKind::ConnectionReset,
            RecvError::ConnectionTimeout => std::io::ErrorKind::TimedOut,
            RecvError::NotEnoughMemory => std::io::ErrorKind::OutOfMemory,
            RecvError::Unknown { errno } => errno_to_kind(*errno),
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_errno_classification() {
        assert_eq!(RecvError::from_errno(libc::EAGAIN), RecvError::WouldBlock);
        assert_eq!(RecvError::from_errno(libc::EWOULDBLOCK), RecvError::WouldBlock);
        assert_eq!(RecvError::from_errno(libc::ECONNRESET), RecvError::ConnectionReset);
        assert_eq!(RecvError::from_errno(libc::ETIMEDOUT), RecvError::ConnectionTimeout);
        assert_eq!(RecvError::from_errno(libc::ENOMEM), RecvError::NotEnoughMemory);
        assert_eq!(RecvError::from_errno(libc::ENOBUFS), RecvError::NotEnoughMemory);
        // send-only conditions fall through to Unknown on the recv side
        assert_eq!(
            RecvError::from_errno(libc::EMSGSIZE),
            RecvError::Unknown { errno: libc::EMSGSIZE }
        );
        assert_eq!(
            RecvError::from_errno(libc::EBADF),
            RecvError::Unknown { errno: libc::EBADF }
        );
    }

    #[test]
    fn send_errno_classification() {
        assert_eq!(SendError::from_errno(libc::EAGAIN), SendError::WouldBlock);
        assert_eq!(SendError::from_errno(libc::EWOULDBLOCK), SendError::WouldBlock);
        assert_eq!(SendError::from_errno(libc::ECONNRESET), SendError::ConnectionReset);
        assert_eq!(SendError::from_errno(libc::EMSGSIZE), SendError::MessageTooLarge);
        assert_eq!(SendError::from_errno(libc::ENOTCONN), SendError::NotConnected);
        // recv-only conditions fall through to Unknown on the send side
        assert_eq!(
            SendError::from_errno(libc::ETIMEDOUT),
            SendError::Unknown { errno: libc::ETIMEDOUT }
        );
        assert_eq!(
            SendError::from_errno(libc::EPIPE),
            SendError::Unknown { errno: libc::EPIPE }
        );
    }

    #[test]
    fn io_error_kinds_survive_conversion() {
        let err: std::io::Error = RecvError::ConnectionTimeout.into();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

        let err: std::io::Error = SendError::NotConnected.into();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);

        let err: std::io::Error = SendError::Unknown { errno: libc::EPIPE }.into();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn invalid_address_keeps_offending_text() {
        let err = SocketError::InvalidAddress { text: "999.999.999.999".into() };
        assert!(err.to_string().contains("999.999.999.999"));
    }
}
