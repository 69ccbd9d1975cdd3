//! Minimal blocking TCP/IPv4 sockets: connect, bind/listen/accept,
//! send, recv. Resource cleanup rides on ownership: dropping a
//! [`Stream`] or [`Listener`] shuts the socket down and closes it.
//!
//! Linux only (for now?).

pub mod tcp;
mod addr;
mod error;

pub use self::addr::SocketAddrV4;
pub use self::error::{RecvError, SendError, SocketError, errno};
pub use self::tcp::{AcceptPolicy, DEFAULT_BACKLOG, Listener, Shutdown, Stream};
