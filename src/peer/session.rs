//! Per-peer session state machine: handshake → bitfield →
//! interested/unchoke → pipelined block requests → piece reassembly.
use super::{Bitfield, Handshake, Message, PeerHandshakeError, PeerProtocolError};
use crate::peer::message::MessageId;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

/// Block size used for every `REQUEST`, except the trimmed final block of a
/// piece.
pub const BLOCK_SIZE: u32 = 16384;

/// Not caller-configurable: the spec's `EngineConfig` only exposes a
/// handshake budget and a piece deadline, so the TCP connect step keeps its
/// own fixed timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A live, handshaked connection to one peer. Owns the socket and the
/// peer's advertised bitfield; never shared across sessions.
pub struct Session {
    stream: TcpStream,
    peer_id: [u8; 20],
    bitfield: Bitfield,
    peer_choking: bool,
}

impl Session {
    /// Dials `addr`, performs the handshake, and requires the very next
    /// message to be `BITFIELD`. Any other first message is a hard
    /// handshake failure. The handshake exchange and the bitfield read share
    /// one `handshake_timeout` budget (see `Handshake::perform`), matching
    /// the spec's "~3 s" handshake budget rather than stacking a fresh
    /// timeout per I/O.
    #[instrument(level = "debug", skip(info_hash, our_peer_id))]
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        handshake_timeout: Duration,
    ) -> Result<Self, PeerHandshakeError> {
        let (stream, peer_id, bitfield) = Handshake::perform(
            addr,
            info_hash,
            our_peer_id,
            CONNECT_TIMEOUT,
            handshake_timeout,
        )
        .await?;

        Ok(Self {
            stream,
            peer_id,
            bitfield,
            peer_choking: true,
        })
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Whether the peer's advertised bitfield covers `index`. Grows as
    /// `HAVE` messages arrive during the session's lifetime.
    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has(index)
    }

    /// Sends the one-time UNCHOKE + INTERESTED pair that opens the request
    /// loop, per the `Ready` state transition.
    pub async fn announce_interest(&mut self) -> Result<(), PeerProtocolError> {
        Message::write(Some(&Message::unchoke()), &mut self.stream).await?;
        Message::write(Some(&Message::interested()), &mut self.stream).await?;
        Ok(())
    }

    /// Downloads one piece under the caller-supplied deadline. The deadline
    /// firing is a session failure (`Timeout`), not a piece failure — the
    /// caller is responsible for re-queuing the piece.
    #[instrument(level = "trace", skip(self, pipeline_size), fields(index))]
    pub async fn download_piece(
        &mut self,
        index: u32,
        piece_len: u32,
        pipeline_size: &AtomicU32,
        piece_deadline: Duration,
    ) -> Result<Vec<u8>, PeerProtocolError> {
        timeout(
            piece_deadline,
            self.download_piece_inner(index, piece_len, pipeline_size),
        )
        .await
        .map_err(|_| PeerProtocolError::Timeout)?
    }

    async fn download_piece_inner(
        &mut self,
        index: u32,
        piece_len: u32,
        pipeline_size: &AtomicU32,
    ) -> Result<Vec<u8>, PeerProtocolError> {
        let mut buf = vec![0u8; piece_len as usize];
        let mut requested: u32 = 0;
        let mut downloaded: u32 = 0;
        let mut backlog: u32 = 0;

        while downloaded < piece_len {
            while !self.peer_choking
                && backlog < pipeline_size.load(Ordering::Relaxed)
                && requested < piece_len
            {
                let block_size = BLOCK_SIZE.min(piece_len - requested);
                let request = Message::request(index, requested, block_size);
                Message::write(Some(&request), &mut self.stream).await?;
                requested += block_size;
                backlog += 1;
            }

            let message = match Message::read(&mut self.stream).await? {
                Some(m) => m,
                None => continue, // keep-alive
            };

            match message.id {
                MessageId::Choke => self.peer_choking = true,
                MessageId::Unchoke => self.peer_choking = false,
                MessageId::Have => {
                    if let Some(have_index) = message.parse_have() {
                        self.bitfield.set(have_index as usize);
                    }
                }
                MessageId::Piece => {
                    let (_, begin, data) = message.parse_piece(index, buf.len())?;
                    buf[begin as usize..begin as usize + data.len()].copy_from_slice(data);
                    downloaded += data.len() as u32;
                    backlog = backlog.saturating_sub(1);
                }
                other => trace!(?other, "ignoring unexpected message during piece download"),
            }
        }

        Ok(buf)
    }

    /// Announces a completed, verified piece to this peer.
    pub async fn send_have(&mut self, index: u32) -> Result<(), PeerProtocolError> {
        Message::write(Some(&Message::have(index)), &mut self.stream).await?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(peer_id = ?hex::encode(self.peer_id), "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_canonical_16kib() {
        assert_eq!(BLOCK_SIZE, 16384);
    }
}
