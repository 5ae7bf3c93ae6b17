//! Piece scheduler: a shared work queue, per-peer session workers, and a
//! single collector that verifies and writes completed pieces.
pub mod pipeline;
pub mod writer;

use crate::peer::session::Session;
use crate::peer::PeerProtocolError;
use crate::torrent::Metainfo;
use pipeline::PipelineMeter;
use sha1::{Digest, Sha1};
use std::collections::{HashSet, VecDeque};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, instrument, warn};
use writer::Writer;

/// One piece awaiting download: its index, byte length, and expected
/// SHA-1 hash.
#[derive(Debug, Clone)]
pub struct PieceWork {
    pub index: u32,
    pub length: u32,
    pub hash: [u8; 20],
}

/// What a session worker reports back to the collector.
enum SessionOutcome {
    Piece { index: u32, bytes: Vec<u8> },
    PeerFailed { addr: SocketAddrV4 },
}

/// Per-dial identity and timing budgets, grouped so `run`/`session_worker`
/// take one value instead of four loose parameters.
#[derive(Clone, Copy)]
struct SessionParams {
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    handshake_timeout: Duration,
    piece_deadline: Duration,
}

/// A bounded MPMC queue: sessions both pop work and re-push failed pieces.
/// Closing is the global "stop downloading" signal.
struct WorkQueue {
    queue: Mutex<VecDeque<PieceWork>>,
    notify: Notify,
    closed: AtomicBool,
}

impl WorkQueue {
    fn new(items: VecDeque<PieceWork>) -> Self {
        Self {
            queue: Mutex::new(items),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Blocks until a piece is available or the queue is closed and empty.
    async fn pop(&self) -> Option<PieceWork> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(item) = queue.pop_front() {
                    return Some(item);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    async fn push(&self, item: PieceWork) {
        self.queue.lock().await.push_back(item);
        self.notify.notify_waiters();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Runs the whole scheduler to completion: dispatches a session per new
/// peer endpoint, drives every session against the shared work queue, and
/// collects, verifies, and writes pieces until `done_pieces == piece_count`.
#[instrument(level = "info", skip_all)]
#[allow(clippy::too_many_arguments)]
pub async fn run(
    metainfo: Arc<Metainfo>,
    mut peer_stream: mpsc::Receiver<SocketAddrV4>,
    info_hash: [u8; 20],
    our_peer_id: [u8; 20],
    mut writer: Writer,
    progress: Arc<crate::progress::Progress>,
    initial_pipeline_size: u32,
    handshake_timeout: Duration,
    piece_deadline: Duration,
) -> std::io::Result<()> {
    let session_params = SessionParams {
        info_hash,
        our_peer_id,
        handshake_timeout,
        piece_deadline,
    };
    let piece_count = metainfo.num_pieces();
    let mut initial = VecDeque::with_capacity(piece_count);
    for index in 0..piece_count {
        initial.push_back(PieceWork {
            index: index as u32,
            length: metainfo.piece_size(index) as u32,
            hash: metainfo.piece_hashes[index],
        });
    }

    let work_queue = Arc::new(WorkQueue::new(initial));
    let active_peers: Arc<Mutex<HashSet<SocketAddrV4>>> = Arc::new(Mutex::new(HashSet::new()));
    let pipeline_size = Arc::new(AtomicU32::new(initial_pipeline_size));
    let (results_tx, mut results_rx) = mpsc::channel::<SessionOutcome>(256);

    let dispatch_active_peers = active_peers.clone();
    let dispatch_queue = work_queue.clone();
    let dispatch_pipeline = pipeline_size.clone();
    tokio::spawn(async move {
        while let Some(addr) = peer_stream.recv().await {
            let mut peers = dispatch_active_peers.lock().await;
            if !peers.insert(addr) {
                continue; // already dispatched
            }
            drop(peers);

            let queue = dispatch_queue.clone();
            let results_tx = results_tx.clone();
            let pipeline_size = dispatch_pipeline.clone();
            tokio::spawn(session_worker(
                addr,
                session_params,
                queue,
                results_tx,
                pipeline_size,
            ));
        }
    });

    let mut done_pieces = 0usize;
    let mut meter = PipelineMeter::new();
    let mut window_start = Instant::now();
    let mut pieces_since_window = 0u64;

    while done_pieces < piece_count {
        let Some(outcome) = results_rx.recv().await else {
            break;
        };
        match outcome {
            SessionOutcome::PeerFailed { addr } => {
                active_peers.lock().await.remove(&addr);
            }
            SessionOutcome::Piece { index, bytes } => {
                writer.write_piece(index, &bytes).await?;
                done_pieces += 1;
                pieces_since_window += 1;
                progress.record_piece(bytes.len() as u64);
                debug!(done_pieces, piece_count, "piece written");

                let elapsed = window_start.elapsed();
                if elapsed >= Duration::from_secs(1) {
                    let new_size =
                        meter.update(pieces_since_window, metainfo.info.piece_length, elapsed);
                    pipeline_size.store(new_size, Ordering::Relaxed);
                    pieces_since_window = 0;
                    window_start = Instant::now();
                }
            }
        }
    }

    work_queue.close();
    Ok(())
}

#[instrument(level = "debug", skip(params, queue, results, pipeline_size))]
async fn session_worker(
    addr: SocketAddrV4,
    params: SessionParams,
    queue: Arc<WorkQueue>,
    results: mpsc::Sender<SessionOutcome>,
    pipeline_size: Arc<AtomicU32>,
) {
    let mut session = match Session::connect(
        SocketAddr::V4(addr),
        params.info_hash,
        params.our_peer_id,
        params.handshake_timeout,
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            warn!(%addr, error = %err, "handshake failed");
            let _ = results.send(SessionOutcome::PeerFailed { addr }).await;
            return;
        }
    };

    if let Err(err) = session.announce_interest().await {
        warn!(%addr, error = %err, "failed to announce interest");
        let _ = results.send(SessionOutcome::PeerFailed { addr }).await;
        return;
    }

    loop {
        let Some(work) = queue.pop().await else {
            return; // queue closed: download complete
        };

        if !session.has_piece(work.index as usize) {
            queue.push(work).await;
            continue;
        }

        match download_and_verify(&mut session, &work, &pipeline_size, params.piece_deadline).await
        {
            Ok(bytes) => {
                // The payload is already SHA-1-verified at this point: deliver it
                // before treating a HAVE-write failure as a peer retirement, so a
                // dropped HAVE doesn't throw away a known-good piece and force a
                // redundant re-download.
                let index = work.index;
                if results
                    .send(SessionOutcome::Piece { index, bytes })
                    .await
                    .is_err()
                {
                    return;
                }
                if let Err(err) = session.send_have(index).await {
                    warn!(%addr, error = %err, "failed to send HAVE");
                    let _ = results.send(SessionOutcome::PeerFailed { addr }).await;
                    return;
                }
            }
            Err(VerifyOutcome::HashMismatch) => {
                queue.push(work).await;
            }
            Err(VerifyOutcome::SessionFailed(err)) => {
                warn!(%addr, error = %err, "session failed mid-piece");
                queue.push(work).await;
                let _ = results.send(SessionOutcome::PeerFailed { addr }).await;
                return;
            }
        }
    }
}

enum VerifyOutcome {
    HashMismatch,
    SessionFailed(PeerProtocolError),
}

async fn download_and_verify(
    session: &mut Session,
    work: &PieceWork,
    pipeline_size: &AtomicU32,
    piece_deadline: Duration,
) -> Result<Vec<u8>, VerifyOutcome> {
    let bytes = session
        .download_piece(work.index, work.length, pipeline_size, piece_deadline)
        .await
        .map_err(VerifyOutcome::SessionFailed)?;

    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let digest: [u8; 20] = hasher.finalize().into();
    if digest != work.hash {
        return Err(VerifyOutcome::HashMismatch);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn work_queue_round_trips_a_piece() {
        let mut initial = VecDeque::new();
        initial.push_back(PieceWork {
            index: 0,
            length: 16384,
            hash: [0u8; 20],
        });
        let queue = WorkQueue::new(initial);
        let work = queue.pop().await.unwrap();
        assert_eq!(work.index, 0);
        queue.push(work).await;
        assert_eq!(queue.pop().await.unwrap().index, 0);
    }

    #[tokio::test]
    async fn work_queue_pop_returns_none_after_close() {
        let queue = WorkQueue::new(VecDeque::new());
        queue.close();
        assert!(queue.pop().await.is_none());
    }
}
