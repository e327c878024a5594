//! portaged — the Portage proxy daemon.
//!
//! Transport bootstrap and plumbing around the engines: TCP server,
//! packet codec, per-connection I/O tasks, command dispatch, service
//! registration, and the ack-expiry sweeper.

pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod source;
pub mod sweeper;
