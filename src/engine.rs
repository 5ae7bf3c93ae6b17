//! Ties the subsystems together: loads a metainfo descriptor, discovers
//! peers, and drives the scheduler to a complete, verified download.
use crate::progress::Progress;
use crate::scheduler::{self, writer::Writer};
use crate::torrent::{Metainfo, TorrentError};
use crate::tracker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Tunables collected into one struct rather than hard-coded constants, so
/// the `rstc` binary can expose them as CLI flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub listen_port: u16,
    pub piece_deadline: Duration,
    pub tracker_timeout: Duration,
    pub handshake_timeout: Duration,
    pub initial_pipeline_size: u32,
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_port: 6881,
            piece_deadline: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            initial_pipeline_size: scheduler::pipeline::INITIAL_PIPELINE_SIZE,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metainfo error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded torrent ready to download.
pub struct Engine {
    metainfo: Arc<Metainfo>,
    config: EngineConfig,
    peer_id: [u8; 20],
}

impl Engine {
    /// Loads the metainfo descriptor at `path` and prepares an engine bound
    /// to it.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let metainfo = Arc::new(Metainfo::from_path(path)?);
        let peer_id = tracker::generate_peer_id();
        Ok(Self {
            metainfo,
            config,
            peer_id,
        })
    }

    pub fn metainfo(&self) -> &Metainfo {
        &self.metainfo
    }

    /// Runs the full discover-peers → download-and-verify-every-piece →
    /// write-to-disk pipeline to completion.
    pub async fn download(&self) -> Result<Arc<Progress>, EngineError> {
        let progress = Arc::new(Progress::new(
            self.metainfo.num_pieces() as u64,
            self.metainfo.total_length() as u64,
        ));

        let writer = Writer::create(&self.metainfo, &self.config.output_dir).await?;
        let peer_stream = tracker::announce_all(
            &self.metainfo,
            self.peer_id,
            self.config.listen_port,
            self.config.tracker_timeout,
        );

        scheduler::run(
            self.metainfo.clone(),
            peer_stream,
            self.metainfo.info_hash,
            self.peer_id,
            writer,
            progress.clone(),
            self.config.initial_pipeline_size,
            self.config.handshake_timeout,
            self.config.piece_deadline,
        )
        .await?;

        Ok(progress)
    }
}
