//! Compact peer address codec: 4-byte IPv4 + 2-byte big-endian port, as used
//! by both HTTP and UDP tracker replies.
use std::net::{Ipv4Addr, SocketAddrV4};

/// Decodes a compact peer list: `6*N` bytes, 4 bytes IPv4 + 2 bytes port
/// (big-endian) per peer. Trailing bytes that don't form a full 6-byte
/// entry are ignored.
pub fn decode_compact_peers(bytes: &[u8]) -> Vec<SocketAddrV4> {
    bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect()
}

/// Encodes a peer list back into compact form. Used for round-trip tests
/// and by anything that needs to re-serialize a peer set.
pub fn encode_compact_peers(peers: &[SocketAddrV4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(peers.len() * 6);
    for peer in peers {
        out.extend_from_slice(&peer.ip().octets());
        out.extend_from_slice(&peer.port().to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_compact_peers() {
        let peers = vec![
            SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6881),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 51413),
        ];
        let encoded = encode_compact_peers(&peers);
        assert_eq!(encoded.len(), 12);
        assert_eq!(decode_compact_peers(&encoded), peers);
    }

    #[test]
    fn decodes_empty() {
        assert!(decode_compact_peers(&[]).is_empty());
    }

    #[test]
    fn ignores_trailing_partial_entry() {
        let mut bytes = encode_compact_peers(&[SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 80)]);
        bytes.push(0xFF);
        assert_eq!(decode_compact_peers(&bytes).len(), 1);
    }
}
