//! HTTP tracker announce: a bencoded GET reply carrying a compact or
//! non-compact peer list.
use super::{url_encode, TrackerError, TrackerResult};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TrackerResponse {
    #[serde(default)]
    #[allow(dead_code)]
    interval: i64,
    #[serde(default)]
    peers: Peers,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Peers {
    Compact(serde_bytes::ByteBuf),
    NonCompact(Vec<PeerDict>),
}

impl Default for Peers {
    fn default() -> Self {
        Peers::Compact(serde_bytes::ByteBuf::new())
    }
}

#[derive(Debug, Deserialize)]
struct PeerDict {
    ip: String,
    port: u16,
}

/// Sends `GET <url>?info_hash=...&compact=1` and parses the bencoded reply.
/// `timeout` bounds the whole request (connect + send + response), per
/// spec's "~2-3 s total" per announce.
pub async fn announce(
    url: &str,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    port: u16,
    left: i64,
    timeout: Duration,
) -> TrackerResult<Vec<SocketAddrV4>> {
    let mut parsed = url::Url::parse(url)?;
    let params = [
        ("info_hash", url_encode(&info_hash)),
        ("peer_id", url_encode(&peer_id)),
        ("port", port.to_string()),
        ("uploaded", "0".to_string()),
        ("downloaded", "0".to_string()),
        ("left", left.to_string()),
        ("compact", "1".to_string()),
    ];
    parsed.query_pairs_mut().extend_pairs(&params).finish();

    tracing::debug!(url = %parsed, "announcing to HTTP tracker");
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(parsed).send().await?;
    let body = response.bytes().await?;
    parse_announce_response(&body)
}

fn parse_announce_response(bytes: &[u8]) -> TrackerResult<Vec<SocketAddrV4>> {
    let response: TrackerResponse = serde_bencode::from_bytes(bytes)
        .map_err(|e| TrackerError::MalformedReply(e.to_string()))?;

    let peers = match response.peers {
        Peers::Compact(bytes) => crate::peer::addr::decode_compact_peers(&bytes),
        Peers::NonCompact(dicts) => dicts
            .into_iter()
            .filter_map(|dict| {
                dict.ip
                    .parse::<Ipv4Addr>()
                    .ok()
                    .map(|ip| SocketAddrV4::new(ip, dict.port))
            })
            .collect(),
    };

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bstr(s: &[u8]) -> Vec<u8> {
        let mut out = format!("{}:", s.len()).into_bytes();
        out.extend_from_slice(s);
        out
    }

    #[test]
    fn parses_compact_peer_reply() {
        let peer_bytes = crate::peer::addr::encode_compact_peers(&[SocketAddrV4::new(
            Ipv4Addr::new(1, 2, 3, 4),
            6881,
        )]);
        let mut body = b"d8:intervali1800e5:peers".to_vec();
        body.extend(bstr(&peer_bytes));
        body.push(b'e');

        let peers = parse_announce_response(&body).unwrap();
        assert_eq!(
            peers,
            vec![SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 6881)]
        );
    }

    #[test]
    fn parses_non_compact_peer_reply() {
        let body = b"d8:intervali1800e5:peersld2:ip9:127.0.0.14:porti6881eeee";
        let peers = parse_announce_response(body).unwrap();
        assert_eq!(
            peers,
            vec![SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6881)]
        );
    }
}
