//! portage-core — wire format, record model, and configuration.
//! All other Portage crates depend on this one.

pub mod config;
pub mod record;
pub mod wire;

pub use record::{PullStatus, Record, RecordHeader};
pub use wire::{Command, Packet, WireError};
