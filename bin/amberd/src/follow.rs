//! Consensus follower adapter.
//!
//! The external consensus follower is a seed node serving a gRPC stream
//! of finalized block headers. This adapter consumes the stream, persists
//! each header to the protocol database, and fans the block id out to the
//! consensus tracker and the download streamer over channels. The stream
//! reconnects forever; the daemon aborts the task at shutdown.

use std::time::Duration;

use amber_rpc::conversion::finalized_to_header;
use amber_rpc::proto::follower_client::FollowerClient;
use amber_rpc::proto::StreamFinalizedRequest;
use amber_storage::KeyValue;
use amber_tracker::{ProtocolDb, TrackerError};
use amber_types::BlockId;
use tokio::sync::mpsc;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum FollowError {
    #[error("could not connect to seed node: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("finalization stream error: {0}")]
    Stream(#[from] tonic::Status),

    #[error("malformed finalized block: {0}")]
    Decode(#[from] amber_rpc::ApiError),

    #[error("protocol state error: {0}")]
    Protocol(#[from] TrackerError),
}

/// Follower connection parameters, validated at startup.
pub struct FollowerConfig {
    /// `http://host:port` of the seed node.
    pub endpoint: String,
    /// Public network key identifying this subscriber.
    pub network_key: Vec<u8>,
}

/// Follow finalization until aborted.
pub async fn run<S: KeyValue>(
    config: FollowerConfig,
    db: ProtocolDb<S>,
    consensus: mpsc::Sender<BlockId>,
    downloads: mpsc::Sender<BlockId>,
) {
    loop {
        match stream_once(&config, &db, &consensus, &downloads).await {
            Ok(()) => {
                // Receivers only close at shutdown.
                tracing::info!("finalization receivers closed, follower exiting");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "finalization stream interrupted, reconnecting");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn stream_once<S: KeyValue>(
    config: &FollowerConfig,
    db: &ProtocolDb<S>,
    consensus: &mpsc::Sender<BlockId>,
    downloads: &mpsc::Sender<BlockId>,
) -> Result<(), FollowError> {
    let from_height = match db.head()? {
        Some(head) => head + 1,
        None => db.root_height()?.map(|root| root + 1).unwrap_or(0),
    };

    let mut client = FollowerClient::connect(config.endpoint.clone()).await?;
    let mut stream = client
        .stream_finalized(StreamFinalizedRequest {
            from_height,
            network_key: config.network_key.clone(),
        })
        .await?
        .into_inner();
    tracing::info!(endpoint = %config.endpoint, from_height, "following consensus finalization");

    while let Some(block) = stream.message().await? {
        let header = finalized_to_header(&block)?;
        db.put_header(&header)?;
        tracing::debug!(height = header.height, block = %header.block_id, "finalized block");

        if consensus.send(header.block_id).await.is_err()
            || downloads.send(header.block_id).await.is_err()
        {
            return Ok(());
        }
    }

    Err(FollowError::Stream(tonic::Status::unavailable(
        "seed node closed the finalization stream",
    )))
}
