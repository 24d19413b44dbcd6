//! Amber live indexer daemon (amberd)
//!
//! Follows block finalization from a consensus seed node, downloads block
//! execution records from an object-store bucket, reconstructs the ledger
//! trie block by block, and serves historical register reads over gRPC.
//!
//! ```text
//!  seed node ──finalized headers──► follower adapter ──► consensus tracker ─┐
//!                                        │                                  │
//!                                        └──► cloud streamer ──► execution  │
//!                                                  ▲             tracker    │
//!                             object-store bucket ─┘                │       │
//!                                                                   ▼       ▼
//!                                                             indexer FSM (mapper)
//!                                                                   │
//!                                                            index database
//!                                                                   │
//!                                                              gRPC API
//! ```

mod follow;
mod metrics;

use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use amber_cloud::{GcsBucket, Streamer};
use amber_index::{Reader, Writer, WriterConfig};
use amber_ledger::{Forest, MemStore as PayloadStore};
use amber_mapper::{
    CheckpointLoader, Config, Fsm, IndexLoader, State, Transitions, TrieLoader,
};
use amber_rpc::{ApiServer, ApiServerConfig};
use amber_storage::{KeyValue, RocksStore};
use amber_tracker::{ConsensusTracker, ExecutionTracker, ProtocolDb};
use amber_types::BlockId;

use follow::FollowerConfig;

const SUCCESS: i32 = 0;
const FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "amberd")]
#[command(about = "Amber live execution-state indexer")]
#[command(version)]
struct Flags {
    /// Bind address for serving the Amber API
    #[arg(short = 'a', long, default_value = "127.0.0.1:5005")]
    address: String,

    /// Path to directory with bootstrap information for the spork
    #[arg(short = 'b', long, default_value = "bootstrap")]
    bootstrap: String,

    /// Object-store bucket with block execution records
    #[arg(short = 'u', long)]
    bucket: String,

    /// Path to root checkpoint file for the execution state trie
    /// (required when the index is empty)
    #[arg(short = 'c', long)]
    checkpoint: Option<String>,

    /// Path to database directory for protocol data
    #[arg(short = 'd', long, default_value = "data")]
    data: String,

    /// Path to database directory for the state index
    #[arg(short = 'i', long, default_value = "index")]
    index: String,

    /// Log output level
    #[arg(short = 'l', long, default_value = "info")]
    level: String,

    /// Address on which to expose metrics (no metrics when left empty)
    #[arg(short = 'm', long, default_value = "")]
    metrics: String,

    /// Skip indexing of execution state ledger registers
    #[arg(short = 's', long)]
    skip: bool,

    /// Interval for flushing index batches, in milliseconds (0 disables)
    #[arg(long = "flush-interval", default_value_t = 1000)]
    flush_interval: u64,

    /// Host address of seed node to follow consensus
    #[arg(long = "seed-address")]
    seed_address: String,

    /// Hex-encoded public network key of the seed node
    #[arg(long = "seed-key")]
    seed_key: String,
}

/// Spork root information from the bootstrap directory.
#[derive(Debug, Deserialize)]
struct SporkRoot {
    root_height: u64,
    root_block_id: String,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let flags = Flags::parse();

    // Logger initialization; a bad level is a configuration error.
    let filter = match EnvFilter::try_new(&flags.level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level {}: {}", flags.level, e);
            return FAILURE;
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "could not build runtime");
            return FAILURE;
        }
    };
    runtime.block_on(run_daemon(flags))
}

async fn run_daemon(flags: Flags) -> i32 {
    // As a first step, open the index and protocol databases. The protocol
    // database is fed by the consensus follower and read by the trackers;
    // the index database is written by the mapper and read by the API.
    let index_db = match RocksStore::open(&flags.index) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %flags.index, error = %e, "could not open index database");
            return FAILURE;
        }
    };
    let protocol_store = match RocksStore::open(&flags.data) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %flags.data, error = %e, "could not open protocol database");
            return FAILURE;
        }
    };

    let reader = Reader::new(Arc::clone(&index_db));
    let first = match reader.first() {
        Ok(first) => first,
        Err(e) => {
            tracing::error!(error = %e, "could not probe index for first height");
            return FAILURE;
        }
    };
    let empty = first.is_none();
    if empty && flags.checkpoint.is_none() {
        tracing::error!(
            "index database is empty, provide a root checkpoint (-c, --checkpoint) to bootstrap"
        );
        return FAILURE;
    }

    // The writer commits batches on an interval so fresh data becomes
    // readable even while blocks are small.
    let writer = Writer::new(
        Arc::clone(&index_db),
        WriterConfig {
            flush_threshold: 500,
            flush_interval: Duration::from_millis(flags.flush_interval),
        },
    );

    // Validate the seed node coordinates up front.
    let Some((seed_host, seed_port)) = flags.seed_address.rsplit_once(':') else {
        tracing::error!(address = %flags.seed_address, "seed address is not host:port");
        return FAILURE;
    };
    if seed_host.is_empty() || seed_port.parse::<u16>().is_err() {
        tracing::error!(address = %flags.seed_address, "could not parse seed node address");
        return FAILURE;
    }
    let network_key = match hex::decode(&flags.seed_key) {
        Ok(key) if !key.is_empty() => key,
        _ => {
            tracing::error!(key = %flags.seed_key, "could not parse seed node network key");
            return FAILURE;
        }
    };
    let api_addr: SocketAddr = match flags.address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(address = %flags.address, error = %e, "could not parse API address");
            return FAILURE;
        }
    };
    let metrics_addr: Option<SocketAddr> = if flags.metrics.is_empty() {
        None
    } else {
        match flags.metrics.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::error!(address = %flags.metrics, error = %e, "could not parse metrics address");
                return FAILURE;
            }
        }
    };

    // Spork root information seeds the protocol database on first start.
    let protocol = ProtocolDb::new(Arc::clone(&protocol_store));
    let root = match read_spork_root(FsPath::new(&flags.bootstrap)) {
        Ok(root) => root,
        Err(e) => {
            tracing::error!(path = %flags.bootstrap, error = %e, "could not read spork bootstrap");
            return FAILURE;
        }
    };
    match protocol.root_height() {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = protocol.set_root_height(root.root_height) {
                tracing::error!(error = %e, "could not record spork root height");
                return FAILURE;
            }
            tracing::info!(
                height = root.root_height,
                block = %root.root_block_id,
                "recorded spork root"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "could not read spork root height");
            return FAILURE;
        }
    }

    // Blocks finalized before this start but not yet indexed need their
    // records downloaded again.
    let catchup = match catchup_blocks(&protocol, &reader) {
        Ok(catchup) => catchup,
        Err(e) => {
            tracing::error!(error = %e, "could not determine catch-up blocks");
            return FAILURE;
        }
    };
    if !catchup.is_empty() {
        tracing::info!(blocks = catchup.len(), "catching up on unindexed finalized blocks");
    }

    // Channel plumbing between follower, trackers and streamer.
    let (consensus_tx, consensus_rx) = mpsc::channel::<BlockId>(256);
    let (download_tx, download_rx) = mpsc::channel::<BlockId>(256);
    let (record_tx, record_rx) = mpsc::channel(64);

    // Payload store and initial-trie loader. An empty index bootstraps
    // from the checkpoint; otherwise the index replays, optionally seeded
    // by the checkpoint to skip history it already covers.
    let payloads = PayloadStore::new();
    let loader: Box<dyn TrieLoader> = if empty {
        let path = flags.checkpoint.as_deref().expect("checked above");
        Box::new(CheckpointLoader::new(path, payloads.clone()))
    } else if let Some(path) = &flags.checkpoint {
        let mut loader = IndexLoader::new(reader.clone(), payloads.clone())
            .with_initializer(CheckpointLoader::new(path, payloads.clone()));
        if let Some(first) = first {
            loader = loader.with_exclude_at_or_below(first);
        }
        Box::new(loader)
    } else {
        Box::new(IndexLoader::new(reader.clone(), payloads.clone()))
    };

    let consensus = ConsensusTracker::new(protocol.clone(), consensus_rx);
    let execution = ExecutionTracker::new(record_rx);

    let transitions = Transitions::new(
        reader.clone(),
        writer,
        consensus,
        execution,
        loader,
        Config {
            skip_registers: flags.skip,
        },
    );
    let (fsm, stop) = Fsm::new(State::new(Forest::new()), transitions);

    // Launch the long-lived components.
    let streamer = Streamer::new(Arc::new(GcsBucket::new(flags.bucket.clone())));
    let streamer_task = tokio::spawn(streamer.run(catchup, download_rx, record_tx));

    let follower_task = tokio::spawn(follow::run(
        FollowerConfig {
            endpoint: format!("http://{}", flags.seed_address),
            network_key,
        },
        protocol.clone(),
        consensus_tx,
        download_tx,
    ));

    let mut fsm_task = tokio::spawn(fsm.run());

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let api = ApiServer::new(
        ApiServerConfig {
            addr: api_addr,
            ..Default::default()
        },
        reader.clone(),
    );
    let mut api_task = tokio::spawn(api.serve_with_shutdown(async {
        let _ = api_shutdown_rx.await;
    }));

    let metrics_tasks = if let Some(addr) = metrics_addr {
        let registry = Arc::new(metrics::Metrics::new());
        let server = tokio::spawn(metrics::serve(addr, Arc::clone(&registry)));
        let poller_reader = reader.clone();
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                if let Ok(Some(height)) = poller_reader.last() {
                    registry.indexed_height.set(height as i64);
                }
                if let Ok(Some(height)) = poller_reader.first() {
                    registry.first_height.set(height as i64);
                }
            }
        });
        Some((server, poller))
    } else {
        None
    };

    // Wait for a signal or for a core component to finish.
    let mut exit = SUCCESS;
    let mut fsm_done = false;
    let mut api_done = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("amber indexer stopping");
        }
        result = &mut fsm_task => {
            fsm_done = true;
            exit = match result {
                Ok(Ok(())) => {
                    tracing::info!("amber indexer done");
                    SUCCESS
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "indexer aborted");
                    FAILURE
                }
                Err(e) => {
                    tracing::error!(error = %e, "indexer task failed");
                    FAILURE
                }
            };
        }
        result = &mut api_task => {
            api_done = true;
            exit = match result {
                Ok(Ok(())) => SUCCESS,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "API server failed");
                    FAILURE
                }
                Err(e) => {
                    tracing::error!(error = %e, "API server task failed");
                    FAILURE
                }
            };
        }
    }

    // Shut down in reverse order of registration: first stop serving the
    // API, then stop feeding the indexer, then the indexer itself, and the
    // metrics last so the final heights stay observable.
    if !api_done {
        let _ = api_shutdown_tx.send(());
        if tokio::time::timeout(Duration::from_secs(5), &mut api_task)
            .await
            .is_err()
        {
            tracing::warn!("API server did not stop in time, aborting it");
            api_task.abort();
        }
    }

    follower_task.abort();
    streamer_task.abort();

    stop.stop();
    if !fsm_done {
        match tokio::time::timeout(Duration::from_secs(30), &mut fsm_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "indexer aborted during shutdown");
                exit = FAILURE;
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "indexer task failed during shutdown");
                exit = FAILURE;
            }
            Err(_) => {
                tracing::error!("indexer did not stop in time");
                exit = FAILURE;
            }
        }
    }

    if let Some((server, poller)) = metrics_tasks {
        poller.abort();
        server.abort();
    }

    exit
}

/// Load the spork root description from the bootstrap directory.
fn read_spork_root(dir: &FsPath) -> Result<SporkRoot, Box<dyn std::error::Error>> {
    let path = dir.join("root.json");
    let bytes = std::fs::read(&path)?;
    let root: SporkRoot = serde_json::from_slice(&bytes)?;
    // The id is informational, but a malformed one points at a bad
    // bootstrap directory.
    amber_types::BlockId::from_hex(&root.root_block_id)
        .map_err(|e| format!("root block id: {e}"))?;
    Ok(root)
}

/// Block ids finalized in the protocol state but above the indexed height.
fn catchup_blocks<S: KeyValue>(
    protocol: &ProtocolDb<S>,
    reader: &Reader<S>,
) -> Result<Vec<BlockId>, Box<dyn std::error::Error>> {
    let Some(head) = protocol.head()? else {
        return Ok(Vec::new());
    };
    let from = match reader.last()? {
        Some(last) => last + 1,
        None => match protocol.root_height()? {
            Some(root) => root + 1,
            None => return Ok(Vec::new()),
        },
    };

    let mut blocks = Vec::new();
    for height in from..=head {
        if let Some(block_id) = protocol.block_id(height)? {
            blocks.push(block_id);
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spork_root_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"root_height": 100, "root_block_id": "{}"}}"#,
                "ab".repeat(32)
            ),
        )
        .unwrap();

        let root = read_spork_root(dir.path()).unwrap();
        assert_eq!(root.root_height, 100);

        std::fs::write(&path, r#"{"root_height": 1, "root_block_id": "xyz"}"#).unwrap();
        assert!(read_spork_root(dir.path()).is_err());
    }

    #[test]
    fn catchup_covers_finalized_but_unindexed_heights() {
        use amber_storage::MemStore;
        use amber_types::{BlockHeader, Commitment};

        let store = Arc::new(MemStore::new());
        let protocol = ProtocolDb::new(Arc::clone(&store));
        let reader = Reader::new(Arc::clone(&store));

        protocol.set_root_height(10).unwrap();
        for height in 11..=13 {
            protocol
                .put_header(&BlockHeader {
                    height,
                    block_id: BlockId::new([height as u8; 32]),
                    parent_id: BlockId::new([height as u8 - 1; 32]),
                    state_commitment: Commitment::new([0; 32]),
                    seals: vec![],
                })
                .unwrap();
        }

        // Nothing indexed yet: everything above the root is pending.
        let blocks = catchup_blocks(&protocol, &reader).unwrap();
        assert_eq!(
            blocks,
            vec![
                BlockId::new([11; 32]),
                BlockId::new([12; 32]),
                BlockId::new([13; 32]),
            ]
        );
    }
}
