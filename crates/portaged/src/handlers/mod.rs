//! Handlers for the inbound command set.

mod ack;
mod heartbeat;
mod pull;
mod unregister;

pub use ack::AckHandler;
pub use heartbeat::HeartbeatHandler;
pub use pull::PullHandler;
pub use unregister::UnregisterHandler;
