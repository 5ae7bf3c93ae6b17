//! UDP tracker announce per BEP 15: a connect handshake followed by an
//! announce request, both fixed-layout binary packets.
use super::{TrackerError, TrackerResult};
use byteorder::{BigEndian, ByteOrder};
use rand::Rng;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const PROTOCOL_ID: u64 = 0x41727101980;
const CONNECT_ACTION: u32 = 0;
const ANNOUNCE_ACTION: u32 = 1;
/// Large enough for `20 + 6*N` with N well beyond any realistic swarm reply.
const RECV_BUF_LEN: usize = 2048;

/// Performs the BEP 15 connect+announce exchange and returns the compact
/// peer list from the announce reply. A single fixed-size read is used;
/// peers beyond `RECV_BUF_LEN`'s capacity are knowingly discarded.
/// `tracker_timeout` is one shared deadline for the whole connect+announce
/// pair, not a fresh timeout per I/O, per spec's "~2-3 s total" per announce.
pub async fn announce(
    addr: &str,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    port: u16,
    left: i64,
    tracker_timeout: Duration,
) -> TrackerResult<Vec<SocketAddrV4>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(addr).await?;

    timeout(tracker_timeout, async {
        let connection_id = connect(&socket).await?;
        announce_request(&socket, connection_id, info_hash, peer_id, port, left).await
    })
    .await
    .map_err(|_| TrackerError::Timeout)?
}

async fn connect(socket: &UdpSocket) -> TrackerResult<u64> {
    let transaction_id: u32 = rand::rng().random();

    let mut request = [0u8; 16];
    BigEndian::write_u64(&mut request[0..8], PROTOCOL_ID);
    BigEndian::write_u32(&mut request[8..12], CONNECT_ACTION);
    BigEndian::write_u32(&mut request[12..16], transaction_id);

    socket.send(&request).await?;

    let mut response = [0u8; 16];
    let len = socket.recv(&mut response).await?;
    if len < 16 {
        return Err(TrackerError::MalformedReply(
            "connect reply shorter than 16 bytes".into(),
        ));
    }

    let action = BigEndian::read_u32(&response[0..4]);
    let got_transaction_id = BigEndian::read_u32(&response[4..8]);
    if action != CONNECT_ACTION || got_transaction_id != transaction_id {
        return Err(TrackerError::MalformedReply(
            "connect reply action/transaction_id mismatch".into(),
        ));
    }

    Ok(BigEndian::read_u64(&response[8..16]))
}

async fn announce_request(
    socket: &UdpSocket,
    connection_id: u64,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    port: u16,
    left: i64,
) -> TrackerResult<Vec<SocketAddrV4>> {
    let transaction_id: u32 = rand::rng().random();
    let key: u32 = rand::rng().random();

    let mut request = [0u8; 98];
    BigEndian::write_u64(&mut request[0..8], connection_id);
    BigEndian::write_u32(&mut request[8..12], ANNOUNCE_ACTION);
    BigEndian::write_u32(&mut request[12..16], transaction_id);
    request[16..36].copy_from_slice(&info_hash);
    request[36..56].copy_from_slice(&peer_id);
    BigEndian::write_u64(&mut request[56..64], 0); // downloaded
    BigEndian::write_u64(&mut request[64..72], left as u64);
    BigEndian::write_u64(&mut request[72..80], 0); // uploaded
    BigEndian::write_u32(&mut request[80..84], 0); // event
    BigEndian::write_u32(&mut request[84..88], 0); // ip
    BigEndian::write_u32(&mut request[88..92], key);
    BigEndian::write_i32(&mut request[92..96], -1); // num_want
    BigEndian::write_u16(&mut request[96..98], port);

    socket.send(&request).await?;

    let mut response = [0u8; RECV_BUF_LEN];
    let len = socket.recv(&mut response).await?;
    if len < 20 {
        return Err(TrackerError::MalformedReply(
            "announce reply shorter than 20 bytes".into(),
        ));
    }

    let action = BigEndian::read_u32(&response[0..4]);
    let got_transaction_id = BigEndian::read_u32(&response[4..8]);
    if action != ANNOUNCE_ACTION || got_transaction_id != transaction_id {
        return Err(TrackerError::MalformedReply(
            "announce reply action/transaction_id mismatch".into(),
        ));
    }

    Ok(crate::peer::addr::decode_compact_peers(&response[20..len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn connect_and_announce_against_mock_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mock = tokio::spawn(async move {
            let mut buf = [0u8; 98];
            let (len, client_addr) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 16);
            let transaction_id = BigEndian::read_u32(&buf[12..16]);

            let mut connect_reply = [0u8; 16];
            BigEndian::write_u32(&mut connect_reply[0..4], CONNECT_ACTION);
            BigEndian::write_u32(&mut connect_reply[4..8], transaction_id);
            BigEndian::write_u64(&mut connect_reply[8..16], 0xdead_beef);
            server.send_to(&connect_reply, client_addr).await.unwrap();

            let (len, client_addr) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 98);
            let transaction_id = BigEndian::read_u32(&buf[12..16]);

            let peer_bytes = crate::peer::addr::encode_compact_peers(&[
                SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
                SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 6882),
                SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 3), 6883),
            ]);
            let mut announce_reply = vec![0u8; 20 + peer_bytes.len()];
            BigEndian::write_u32(&mut announce_reply[0..4], ANNOUNCE_ACTION);
            BigEndian::write_u32(&mut announce_reply[4..8], transaction_id);
            announce_reply[20..].copy_from_slice(&peer_bytes);
            server.send_to(&announce_reply, client_addr).await.unwrap();
        });

        let peers = announce(
            &server_addr.to_string(),
            [1u8; 20],
            [2u8; 20],
            6881,
            1000,
            Duration::from_secs(3),
        )
        .await
        .unwrap();

        mock.await.unwrap();
        assert_eq!(peers.len(), 3);
    }
}
