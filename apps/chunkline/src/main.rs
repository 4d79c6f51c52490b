//! chunkline CLI
//!
//! Upload files to a chunkline server, resuming interrupted uploads, and
//! inspect upload status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunkline::upload::{fingerprint, IndicatifCallback, NoOpCallback, ProgressCallback};
use chunkline::{
    ChunkSource, ClientConfig, FileStatus, Fingerprint, HttpBackend, StatusPoller, Uploader,
};

#[derive(Parser)]
#[command(author, version, about = "Resumable chunked uploads", long_about = None)]
struct Cli {
    /// Server API base URL (overrides CHUNKLINE_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content fingerprint of a file
    Hash { path: PathBuf },
    /// Upload a file, resuming if the server already holds part of it
    Upload {
        path: PathBuf,
        /// Segment size in bytes
        #[arg(long)]
        segment_size: Option<u64>,
        /// Maximum chunk sends in flight (0 = all at once)
        #[arg(long)]
        parallel: Option<usize>,
        /// Return after the last chunk is acknowledged
        #[arg(long)]
        no_wait: bool,
        /// Do not draw a progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Show status and resume cursor for a fingerprint
    Status { hash: String },
    /// Follow status updates until the upload completes or fails
    Watch {
        hash: String,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print the retrieval URL of a completed upload
    Url { hash: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }

    match cli.command {
        Commands::Hash { path } => {
            let fp = fingerprint(&ChunkSource::from_path(&path)).await?;
            println!("{}  {}", fp, path.display());
        }
        Commands::Upload {
            path,
            segment_size,
            parallel,
            no_wait,
            quiet,
        } => {
            if let Some(segment_size) = segment_size {
                config.segment_size = segment_size;
            }
            if let Some(parallel) = parallel {
                config.parallel = parallel;
            }

            let mut options = config.upload_options();
            options.wait_for_completion = !no_wait;

            let backend = HttpBackend::new(&config.server_url, config.timeout)?;
            let uploader = Uploader::new(Arc::new(backend), options);

            let progress: Box<dyn ProgressCallback> = if quiet {
                Box::new(NoOpCallback)
            } else {
                Box::new(IndicatifCallback::new())
            };

            let source = ChunkSource::from_path(&path);
            let outcome = uploader
                .upload_file(&source, progress.as_ref())
                .await
                .with_context(|| format!("Upload of {} failed", path.display()))?;

            println!("fingerprint: {}", outcome.fingerprint);
            println!("status:      {}", outcome.final_status);
            println!(
                "chunks:      {} sent, {} total, resumed at {}",
                outcome.chunks_sent, outcome.total_chunks, outcome.resumed_from
            );
            if let Some(url) = outcome.public_url {
                println!("url:         {}", url);
            }
        }
        Commands::Status { hash } => {
            let uploader = Uploader::from_config(&config)?;
            let state = uploader.get_resume_state(&parse_hash(&hash)?).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Watch { hash, interval_ms } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or(config.poll_interval);
            let backend = HttpBackend::new(&config.server_url, config.timeout)?;
            watch(StatusPoller::new(Arc::new(backend), interval), parse_hash(&hash)?).await?;
        }
        Commands::Url { hash } => {
            let uploader = Uploader::from_config(&config)?;
            println!("{}", uploader.public_url(&parse_hash(&hash)?).await?);
        }
    }

    Ok(())
}

fn parse_hash(hash: &str) -> anyhow::Result<Fingerprint> {
    Ok(hash.parse()?)
}

/// Print every status update until a terminal state or Ctrl+C
async fn watch(poller: StatusPoller, fp: Fingerprint) -> anyhow::Result<()> {
    let mut updates = poller.subscribe();
    let handle = poller.spawn(fp);
    // The background task holds the last sender; its end closes the channel
    drop(poller);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(state) => {
                    println!(
                        "{} status={} current_index={}/{}",
                        state.hash, state.status, state.current_index, state.chunk_nums
                    );
                    if state.status.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} status updates", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
        }
    }

    match handle.join().await? {
        Some(state) if state.status != FileStatus::Complete => {
            anyhow::bail!("upload ended in state {}", state.status)
        }
        _ => Ok(()),
    }
}
