//! Tracker client logic for the BitTorrent protocol.
//!
//! This module implements communication with BitTorrent trackers, including:
//! - HTTP announce (bencoded compact/non-compact replies)
//! - UDP announce (BEP 15 connect+announce)
//! - Peer ID generation and URL encoding helpers
//! - Fan-out across every announce URL onto one peer stream
use crate::bencode::BencodeError;
use crate::torrent::Metainfo;
use rand::Rng;
use std::net::SocketAddrV4;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

pub mod http;
pub mod udp;

/// Corresponds to spec's `TrackerError`: always logged and dropped by the
/// fan-out, never surfaced, since a single good tracker suffices.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid tracker URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("malformed tracker reply: {0}")]
    MalformedReply(String),

    #[error("request timed out")]
    Timeout,

    #[error("unsupported announce scheme: {0}")]
    UnsupportedScheme(String),
}

type TrackerResult<T> = Result<T, TrackerError>;

/// Generates a unique peer ID: the `-RT0001-` client prefix followed by 11
/// random bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

/// URL-encodes a byte slice per RFC 3986, leaving the unreserved set
/// (`a-zA-Z0-9-._~`) untouched and percent-encoding everything else.
pub(crate) fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Every announce URL to try: the first URL of each `announce_list` tier,
/// falling back to the single `announce` field if the list is empty.
fn announce_urls(metainfo: &Metainfo) -> Vec<String> {
    if !metainfo.announce_list.is_empty() {
        metainfo
            .announce_list
            .iter()
            .filter_map(|tier| tier.first().cloned())
            .collect()
    } else if !metainfo.announce.is_empty() {
        vec![metainfo.announce.clone()]
    } else {
        Vec::new()
    }
}

/// Concurrently contacts every announce URL (HTTP and UDP) and multiplexes
/// every returned peer endpoint onto one stream. The stream closes once
/// every attempt has completed; per-tracker errors are logged at `warn` and
/// otherwise dropped, since a single good tracker suffices. `tracker_timeout`
/// is the total budget (connect + request/response) given to each announce,
/// per spec's "~2-3 s total".
pub fn announce_all(
    metainfo: &Metainfo,
    peer_id: [u8; 20],
    port: u16,
    tracker_timeout: Duration,
) -> mpsc::Receiver<SocketAddrV4> {
    let (tx, rx) = mpsc::channel(256);
    let info_hash = metainfo.info_hash;
    let left = metainfo.total_length();

    for url in announce_urls(metainfo) {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = announce_one(&url, info_hash, peer_id, port, left, tracker_timeout).await;
            match result {
                Ok(peers) => {
                    for peer in peers {
                        if tx.send(peer).await.is_err() {
                            break;
                        }
                    }
                }
                Err(err) => warn!(%url, error = %err, "tracker announce failed"),
            }
        });
    }

    rx
}

async fn announce_one(
    url: &str,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    port: u16,
    left: i64,
    tracker_timeout: Duration,
) -> TrackerResult<Vec<SocketAddrV4>> {
    if let Some(rest) = url.strip_prefix("udp://") {
        let addr = rest.split('/').next().unwrap_or(rest);
        udp::announce(addr, info_hash, peer_id, port, left, tracker_timeout).await
    } else if url.starts_with("http://") || url.starts_with("https://") {
        http::announce(url, info_hash, peer_id, port, left, tracker_timeout).await
    } else {
        Err(TrackerError::UnsupportedScheme(url.to_string()))
    }
}
