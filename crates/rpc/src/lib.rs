//! gRPC surface of the Amber indexer.
//!
//! The [`Api`](proto::api_server::Api) service serves historical register
//! reads straight off the index database; it never touches the tries the
//! mapper owns. The `Follower` service definition in the same package is
//! the wire contract of the external consensus follower, consumed by the
//! daemon as a client.

pub mod conversion;
pub mod error;
pub mod server;
pub mod service;

// Generated protobuf types.
pub mod proto {
    include!("generated/amber.v1.rs");
}

pub use error::ApiError;
pub use server::{ApiServer, ApiServerConfig};
pub use service::ApiService;
