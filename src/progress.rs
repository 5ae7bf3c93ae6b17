//! Download progress: plain atomic counters updated by the collector and
//! read by anything reporting status (the CLI's progress line, tests).
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub done_pieces: u64,
    pub total_pieces: u64,
    pub bytes_downloaded: u64,
    pub bytes_per_second: f64,
    pub bytes_remaining: u64,
}

pub struct Progress {
    total_pieces: u64,
    total_bytes: u64,
    done_pieces: AtomicU64,
    bytes_downloaded: AtomicU64,
    started_at: Instant,
}

impl Progress {
    pub fn new(total_pieces: u64, total_bytes: u64) -> Self {
        Self {
            total_pieces,
            total_bytes,
            done_pieces: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_piece(&self, bytes: u64) {
        self.done_pieces.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        let done_pieces = self.done_pieces.load(Ordering::Relaxed);
        let bytes_downloaded = self.bytes_downloaded.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        Snapshot {
            done_pieces,
            total_pieces: self.total_pieces,
            bytes_downloaded,
            bytes_per_second: bytes_downloaded as f64 / elapsed,
            bytes_remaining: self.total_bytes.saturating_sub(bytes_downloaded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pieces_and_bytes() {
        let progress = Progress::new(4, 65536);
        progress.record_piece(16384);
        progress.record_piece(16384);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.done_pieces, 2);
        assert_eq!(snapshot.bytes_downloaded, 32768);
        assert_eq!(snapshot.bytes_remaining, 32768);
    }
}
