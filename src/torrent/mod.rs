//! Torrent metainfo parsing and error handling logic.
//!
//! This module provides types and error handling for working with `.torrent`
//! files: decoding the bencoded dictionary, computing the info-hash, and
//! deriving the piece table and file layout.
use thiserror::Error;

pub mod metainfo;

pub use metainfo::{FileEntry, InfoDict, Metainfo};

/// Corresponds to spec's `MalformedMetainfo` error kind: fatal, surfaced to
/// the caller, since a torrent that cannot be parsed cannot be downloaded.
#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid torrent file format: {0}")]
    InvalidFormat(String),

    #[error("missing or invalid field: {0}")]
    MissingField(String),

    #[error("invalid pieces hash length")]
    InvalidPiecesHashLength,
}

/// Result type for torrent operations derived from `std::result`.
pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
