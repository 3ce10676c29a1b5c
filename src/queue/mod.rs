mod fifo;
mod recency;

pub use fifo::FifoQueue;
pub use recency::{RecencyEntry, RecencyQueue};

/// Result of a blocking take: an item, or the queue's one-shot interrupt
/// sentinel telling the consumer to wind down.
#[derive(Debug, Eq, PartialEq)]
pub enum Taken<T> {
    Value(T),
    Interrupted,
}
