use thiserror::Error;

/// Outcome of a single send that the rest of the system must be able to tell
/// apart. A coded rejection or a missed ack is local to that one send; a
/// closed connection additionally means the reconnect loop is about to take
/// over.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("server rejected the message with code {0}")]
    Rejected(u8),

    #[error("no ack within the configured timeout")]
    AckTimeout,
}
