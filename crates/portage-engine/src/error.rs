//! Engine error taxonomy.
//!
//! State errors surface to callers; everything else is recovered inside
//! the engines by re-queueing — no packet is dropped on the push path.

/// Errors surfaced by the engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not running")]
    NotRunning,
    #[error("engine already started")]
    AlreadyStarted,
    #[error("no usable connection after {attempts} attempts")]
    ConnectionUnavailable { attempts: u32 },
    #[error("queue closed during shutdown")]
    QueueClosed,
}

/// Errors reported by a [`Connection`](crate::Connection) send.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection is inactive")]
    Inactive,
    #[error("connection closed")]
    Closed,
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
