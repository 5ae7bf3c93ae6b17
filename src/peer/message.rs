//! Length-prefixed peer message stream: `length (u32 BE) · id (u8) ·
//! payload`. A `length == 0` frame is a keep-alive and carries no id.
use super::PeerProtocolError;
use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    Unknown(u8),
}

impl From<u8> for MessageId {
    fn from(id: u8) -> Self {
        match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => MessageId::Unknown(other),
        }
    }
}

impl From<MessageId> for u8 {
    fn from(id: MessageId) -> u8 {
        match id {
            MessageId::Choke => 0,
            MessageId::Unchoke => 1,
            MessageId::Interested => 2,
            MessageId::NotInterested => 3,
            MessageId::Have => 4,
            MessageId::Bitfield => 5,
            MessageId::Request => 6,
            MessageId::Piece => 7,
            MessageId::Cancel => 8,
            MessageId::Unknown(other) => other,
        }
    }
}

/// A parsed post-handshake message, or `None` for a keep-alive
/// (`length == 0`) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn choke() -> Self {
        Self {
            id: MessageId::Choke,
            payload: Vec::new(),
        }
    }

    pub fn unchoke() -> Self {
        Self {
            id: MessageId::Unchoke,
            payload: Vec::new(),
        }
    }

    pub fn interested() -> Self {
        Self {
            id: MessageId::Interested,
            payload: Vec::new(),
        }
    }

    pub fn have(index: u32) -> Self {
        let mut payload = vec![0u8; 4];
        BigEndian::write_u32(&mut payload, index);
        Self {
            id: MessageId::Have,
            payload,
        }
    }

    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = vec![0u8; 12];
        BigEndian::write_u32(&mut payload[0..4], index);
        BigEndian::write_u32(&mut payload[4..8], begin);
        BigEndian::write_u32(&mut payload[8..12], length);
        Self {
            id: MessageId::Request,
            payload,
        }
    }

    /// Serializes to `length_prefix (u32 BE) · id · payload`.
    pub fn serialize(&self) -> Vec<u8> {
        let length = (self.payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + length as usize);
        buf.extend_from_slice(&length.to_be_bytes());
        buf.push(self.id.into());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// The 4-byte keep-alive frame: `length_prefix = 0`.
    pub fn keep_alive_bytes() -> [u8; 4] {
        [0, 0, 0, 0]
    }

    /// Reads one frame from the stream. Returns `Ok(None)` for a keep-alive.
    pub async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<Option<Message>, PeerProtocolError> {
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf);

        if length == 0 {
            return Ok(None);
        }

        let mut body = vec![0u8; length as usize];
        reader.read_exact(&mut body).await?;

        Ok(Some(Message {
            id: MessageId::from(body[0]),
            payload: body[1..].to_vec(),
        }))
    }

    /// Writes this message, or `None` for a keep-alive, to the stream.
    pub async fn write<W: AsyncWrite + Unpin>(
        message: Option<&Message>,
        writer: &mut W,
    ) -> Result<(), PeerProtocolError> {
        match message {
            Some(m) => writer.write_all(&m.serialize()).await?,
            None => writer.write_all(&Message::keep_alive_bytes()).await?,
        }
        Ok(())
    }

    /// Parses a `REQUEST`/`HAVE`-style 3-field-or-1-field u32 payload;
    /// returns the raw `(index, begin, length)` triple for a `REQUEST`.
    pub fn parse_request(&self) -> Option<(u32, u32, u32)> {
        if self.payload.len() < 12 {
            return None;
        }
        Some((
            BigEndian::read_u32(&self.payload[0..4]),
            BigEndian::read_u32(&self.payload[4..8]),
            BigEndian::read_u32(&self.payload[8..12]),
        ))
    }

    pub fn parse_have(&self) -> Option<u32> {
        if self.payload.len() < 4 {
            return None;
        }
        Some(BigEndian::read_u32(&self.payload[0..4]))
    }

    /// Validates and decomposes a `PIECE` message: `(index, begin, data)`.
    /// Rejects payloads shorter than 8 bytes, per spec.
    pub fn parse_piece(
        &self,
        expected_index: u32,
        buf_len: usize,
    ) -> Result<(u32, u32, &[u8]), PeerProtocolError> {
        if self.id != MessageId::Piece {
            return Err(PeerProtocolError::ExpectedPiece(self.id));
        }
        if self.payload.len() < 8 {
            return Err(PeerProtocolError::ShortPiecePayload);
        }
        let index = BigEndian::read_u32(&self.payload[0..4]);
        let begin = BigEndian::read_u32(&self.payload[4..8]);
        let data = &self.payload[8..];

        if index != expected_index {
            return Err(PeerProtocolError::WrongPieceIndex {
                got: index,
                expected: expected_index,
            });
        }
        if begin as usize >= buf_len {
            return Err(PeerProtocolError::BeginOutOfBounds {
                begin,
                len: buf_len,
            });
        }
        if begin as usize + data.len() > buf_len {
            return Err(PeerProtocolError::BlockOverrunsBuffer {
                begin,
                data_len: data.len(),
                len: buf_len,
            });
        }
        Ok((index, begin, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_request_message() {
        let msg = Message::request(3, 16384, 16384);
        let bytes = msg.serialize();
        let mut cursor = Cursor::new(bytes);
        let read = Message::read(&mut cursor).await.unwrap().unwrap();
        assert_eq!(read.parse_request(), Some((3, 16384, 16384)));
    }

    #[tokio::test]
    async fn keep_alive_reads_as_none() {
        let mut cursor = Cursor::new(Message::keep_alive_bytes().to_vec());
        assert!(Message::read(&mut cursor).await.unwrap().is_none());
    }

    #[test]
    fn parse_piece_rejects_short_payload() {
        let msg = Message {
            id: MessageId::Piece,
            payload: vec![0; 4],
        };
        assert!(matches!(
            msg.parse_piece(0, 100),
            Err(PeerProtocolError::ShortPiecePayload)
        ));
    }

    #[test]
    fn parse_piece_rejects_wrong_index() {
        let mut payload = vec![0u8; 12];
        BigEndian::write_u32(&mut payload[0..4], 5);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };
        assert!(matches!(
            msg.parse_piece(0, 100),
            Err(PeerProtocolError::WrongPieceIndex {
                got: 5,
                expected: 0
            })
        ));
    }

    #[test]
    fn parse_piece_rejects_begin_out_of_bounds() {
        let mut payload = vec![0u8; 12];
        BigEndian::write_u32(&mut payload[4..8], 200);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };
        assert!(matches!(
            msg.parse_piece(0, 100),
            Err(PeerProtocolError::BeginOutOfBounds {
                begin: 200,
                len: 100
            })
        ));
    }

    #[test]
    fn parse_piece_rejects_block_overrunning_buffer() {
        let mut payload = vec![0u8; 8 + 20];
        BigEndian::write_u32(&mut payload[4..8], 90);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };
        assert!(matches!(
            msg.parse_piece(0, 100),
            Err(PeerProtocolError::BlockOverrunsBuffer { .. })
        ));
    }
}
