//! Per-connection peer protocol: handshake, wire framing, bitfield, and the
//! session state machine that drives pipelined block requests.
use thiserror::Error;

pub mod addr;
pub mod bitfield;
pub mod handshake;
pub mod message;
pub mod session;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::Message;
pub use session::Session;

/// Corresponds to spec's `PeerHandshakeError`: the peer is dropped and any
/// piece it held gets re-queued via the collector's failure path.
#[derive(Debug, Error)]
pub enum PeerHandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("invalid protocol identifier length: {0}")]
    InvalidProtocolLength(u8),

    #[error("info-hash mismatch")]
    InfoHashMismatch,

    #[error("expected BITFIELD as first message, got {0:?}")]
    ExpectedBitfield(Option<message::MessageId>),
}

/// Corresponds to spec's `PeerProtocolError`: a hard session failure once
/// the peer has already passed the handshake.
#[derive(Debug, Error)]
pub enum PeerProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("piece payload shorter than 8 bytes")]
    ShortPiecePayload,

    #[error("piece index {got} does not match requested piece {expected}")]
    WrongPieceIndex { got: u32, expected: u32 },

    #[error("block begin {begin} is out of bounds for buffer of length {len}")]
    BeginOutOfBounds { begin: u32, len: usize },

    #[error("block begin {begin} + length {data_len} exceeds buffer length {len}")]
    BlockOverrunsBuffer {
        begin: u32,
        data_len: usize,
        len: usize,
    },

    #[error("expected PIECE message, got {0:?}")]
    ExpectedPiece(message::MessageId),
}
