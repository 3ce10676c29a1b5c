pub mod ack;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod queue;
pub mod sources;
pub mod supervisor;
