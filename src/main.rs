use clap::{Parser, Subcommand};
use rs_torrent_client::engine::EngineConfig;
use rs_torrent_client::Engine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rstc", version, about = "A BitTorrent download engine core")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Downloads the payload described by a `.torrent` file.
    Download {
        /// Path to the `.torrent` file.
        torrent: PathBuf,

        /// Directory to write the downloaded payload into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Local TCP port advertised to trackers and peers.
        #[arg(short, long, default_value_t = 6881)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Download {
            torrent,
            output,
            port,
        } => {
            let config = EngineConfig {
                listen_port: port,
                output_dir: output,
                ..EngineConfig::default()
            };

            let engine = Engine::open(&torrent, config)?;
            tracing::info!(
                pieces = engine.metainfo().num_pieces(),
                total_bytes = engine.metainfo().total_length(),
                "starting download"
            );

            let progress = engine.download().await?;
            let snapshot = progress.snapshot();
            tracing::info!(
                done_pieces = snapshot.done_pieces,
                total_pieces = snapshot.total_pieces,
                "download complete"
            );
        }
    }

    Ok(())
}
