//! Blocking TCP primitives: [`Stream`] and [`Listener`].
//!
//! Everything here blocks the calling thread: connect, accept, send
//! and recv all wait on the kernel. There is no non-blocking mode and
//! no internal concurrency; callers that want parallel connection
//! handling move each accepted [`Stream`] to a worker of their own.

mod listener;
mod stream;
mod sys;

pub use self::listener::{AcceptPolicy, DEFAULT_BACKLOG, Listener};
pub use self::stream::{Shutdown, Stream};
