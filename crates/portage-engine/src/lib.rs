//! portage-engine — the message exchange engine.
//!
//! Two engines share one design problem: moving variable-rate record
//! streams through bounded queues into framed wire packets while keeping
//! at-least-once delivery under transient connection failure. The push
//! engine actively forwards records over the live connection set; the
//! pull engine assembles batches on demand and suspends empty requests
//! until data arrives.

pub mod balance;
pub mod connection;
pub mod error;
pub mod flow;
pub mod hold;
pub mod id;
pub mod ledger;
pub mod pull;
pub mod push;
pub mod queue;
pub mod retry;

pub use balance::{LoadBalance, RoundRobinLoadBalance};
pub use connection::{Connection, ConnectionRegistry};
pub use error::{ConnectionError, EngineError};
pub use flow::{ControlResult, FlowController, TokenBucketFlowController};
pub use hold::HoldService;
pub use id::IdGenerator;
pub use ledger::InFlightLedger;
pub use pull::{PullEngine, PullReply, PullRequest};
pub use push::PushEngine;
pub use queue::BoundedQueue;
pub use retry::RetryPolicy;
