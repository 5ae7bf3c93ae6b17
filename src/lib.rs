//! Library root for rs-torrent-client.
//!
//! Re-exports the bencode codec, metainfo loader, tracker client, peer
//! protocol, piece scheduler, progress reporter, and the engine that ties
//! them together, for use by the `rstc` binary and other libraries.
pub mod bencode;
pub mod engine;
pub mod peer;
pub mod progress;
pub mod scheduler;
pub mod torrent;
pub mod tracker;

pub use engine::{Engine, EngineConfig, EngineError};
