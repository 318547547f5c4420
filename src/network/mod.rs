//! TCP reception server: wire protocol, per-connection handling, accept loop.

pub mod connection;
pub mod protocol;
pub mod server;

pub use protocol::{ChunkAction, SeekTo};
pub use server::Server;
