//! gRPC server startup and lifecycle.

use std::net::SocketAddr;

use amber_index::Reader;
use amber_storage::KeyValue;
use tonic::transport::Server;

use crate::proto::api_server::ApiServer as ApiServiceServer;
use crate::service::ApiService;

/// Configuration for the gRPC server.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the gRPC server to.
    pub addr: SocketAddr,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5005)),
            max_message_size: 16 * 1024 * 1024, // bulk register responses
        }
    }
}

/// The gRPC server for the Amber API.
pub struct ApiServer<S> {
    config: ApiServerConfig,
    reader: Reader<S>,
}

impl<S: KeyValue> ApiServer<S> {
    pub fn new(config: ApiServerConfig, reader: Reader<S>) -> Self {
        Self { config, reader }
    }

    /// Serve until the shutdown future resolves.
    pub async fn serve_with_shutdown<F>(
        self,
        signal: F,
    ) -> Result<(), tonic::transport::Error>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let addr = self.config.addr;
        let service = ApiServiceServer::new(ApiService::new(self.reader))
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size);

        tracing::info!(%addr, "starting gRPC API server");
        Server::builder()
            .add_service(service)
            .serve_with_shutdown(addr, signal)
            .await
    }

    /// Serve until the process ends.
    pub async fn serve(self) -> Result<(), tonic::transport::Error> {
        self.serve_with_shutdown(std::future::pending()).await
    }
}
