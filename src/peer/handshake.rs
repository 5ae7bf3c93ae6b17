//! This module implements the BitTorrent peer handshake protocol.
//!
//! The handshake is the first message exchanged between two peers. It
//! verifies that both peers are participating in the same torrent (via
//! `info_hash`) and establishes basic protocol compatibility.
use super::bitfield::Bitfield;
use super::message::{Message, MessageId};
use super::PeerHandshakeError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::instrument;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// A BitTorrent handshake message: protocol identifier, reserved
/// extension bytes, info hash, and peer id. 68 bytes on the wire for the
/// canonical `pstr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serializes to the fixed 68-byte handshake format:
    /// `pstrlen(1) · pstr(19) · reserved(8) · info_hash(20) · peer_id(20)`.
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Reads and validates a handshake response of `1 + pstrlen + 48` bytes.
    /// `pstrlen == 0` is a hard failure.
    #[instrument(level = "trace", skip(reader))]
    async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, PeerHandshakeError> {
        let mut length_buf = [0u8; 1];
        reader.read_exact(&mut length_buf).await?;
        let pstrlen = length_buf[0];
        if pstrlen == 0 {
            return Err(PeerHandshakeError::InvalidProtocolLength(0));
        }

        let mut rest = vec![0u8; pstrlen as usize + 48];
        reader.read_exact(&mut rest).await?;

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&rest[pstrlen as usize + 8..pstrlen as usize + 28]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&rest[pstrlen as usize + 28..pstrlen as usize + 48]);

        Ok(Self { info_hash, peer_id })
    }

    async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), PeerHandshakeError> {
        writer.write_all(&self.serialize()).await?;
        Ok(())
    }

    /// Dials `addr` over TCP (with a connect timeout), exchanges handshakes,
    /// requires the peer's info-hash to match ours, and reads the mandatory
    /// first post-handshake `BITFIELD`. The handshake exchange and the
    /// bitfield read share one `handshake_timeout` budget rather than each
    /// getting their own, so the whole `Handshaked → Ready` transition stays
    /// within the spec's "~3 s" handshake budget. Returns the connected
    /// stream, the peer's reported id, and its advertised bitfield.
    #[instrument(level = "debug", skip(info_hash, peer_id))]
    pub async fn perform(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<(TcpStream, [u8; 20], Bitfield), PeerHandshakeError> {
        let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerHandshakeError::ConnectTimeout)??;

        let ours = Handshake::new(info_hash, peer_id);
        let (peer_id, bitfield) = timeout(handshake_timeout, async {
            ours.write(&mut stream).await?;
            let result = Handshake::read(&mut stream).await?;
            if result.info_hash != info_hash {
                return Err(PeerHandshakeError::InfoHashMismatch);
            }

            let first = Message::read(&mut stream)
                .await
                .map_err(|_| PeerHandshakeError::ExpectedBitfield(None))?;
            let bitfield = match first {
                Some(msg) if msg.id == MessageId::Bitfield => Bitfield::new(msg.payload),
                other => return Err(PeerHandshakeError::ExpectedBitfield(other.map(|m| m.id))),
            };

            Ok((result.peer_id, bitfield))
        })
        .await
        .map_err(|_| PeerHandshakeError::HandshakeTimeout)??;

        Ok((stream, peer_id, bitfield))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn serializes_to_68_bytes_with_canonical_pstr() {
        let h = Handshake::new([1u8; 20], [2u8; 20]);
        let bytes = h.serialize();
        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], PROTOCOL.as_slice());
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..48], &[1u8; 20]);
        assert_eq!(&bytes[48..68], &[2u8; 20]);
    }

    #[tokio::test]
    async fn round_trips_through_read() {
        let h = Handshake::new([7u8; 20], [8u8; 20]);
        let mut cursor = Cursor::new(h.serialize().to_vec());
        let read = Handshake::read(&mut cursor).await.unwrap();
        assert_eq!(read.info_hash, [7u8; 20]);
        assert_eq!(read.peer_id, [8u8; 20]);
    }

    #[tokio::test]
    async fn rejects_zero_pstrlen() {
        let mut cursor = Cursor::new(vec![0u8]);
        assert!(matches!(
            Handshake::read(&mut cursor).await,
            Err(PeerHandshakeError::InvalidProtocolLength(0))
        ));
    }
}
