//! Api service implementation over the index reader.

use std::pin::Pin;
use std::sync::Arc;

use amber_index::Reader;
use amber_storage::KeyValue;
use futures::Stream;
use tonic::{Request, Response, Status};

use crate::conversion::{
    identity, payload_to_proto, proto_to_paths, seal_to_proto,
};
use crate::error::{ApiError, ApiResult};
use crate::proto::{self, api_server::Api};

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Serves the Api service from a [`Reader`].
///
/// Reads only committed index state; the mapper's in-flight tries are
/// never visible here.
pub struct ApiService<S> {
    reader: Arc<Reader<S>>,
}

impl<S: KeyValue> ApiService<S> {
    pub fn new(reader: Reader<S>) -> Self {
        Self {
            reader: Arc::new(reader),
        }
    }

    /// The identity trio for an indexed height.
    fn identity_at(&self, height: u64) -> ApiResult<proto::BlockIdentity> {
        let commitment = self
            .reader
            .commit(height)?
            .ok_or_else(|| ApiError::NotFound(format!("height {height} is not indexed")))?;
        // The root height has a commitment but, bootstrapped from a
        // checkpoint, possibly no header; fall back to a zero block id.
        let block_id = self.reader.block_id(height)?.unwrap_or_default();
        Ok(identity(height, &block_id, &commitment))
    }

    fn last_height(&self) -> ApiResult<u64> {
        self.reader
            .last()?
            .ok_or_else(|| ApiError::Unavailable("index is empty".to_string()))
    }

    fn bounded_height(&self, height: u64) -> ApiResult<u64> {
        let last = self.last_height()?;
        let first = self
            .reader
            .first()?
            .ok_or_else(|| ApiError::Unavailable("index is empty".to_string()))?;
        if height < first || height > last {
            return Err(ApiError::NotFound(format!(
                "height {height} outside indexed range [{first}, {last}]"
            )));
        }
        Ok(height)
    }
}

#[tonic::async_trait]
impl<S: KeyValue> Api for ApiService<S> {
    async fn get_first(
        &self,
        _request: Request<proto::GetFirstRequest>,
    ) -> Result<Response<proto::GetFirstResponse>, Status> {
        let height = self
            .reader
            .first()
            .map_err(ApiError::from)
            .and_then(|first| {
                first.ok_or_else(|| ApiError::Unavailable("index is empty".to_string()))
            })?;
        let identity = self.identity_at(height)?;
        Ok(Response::new(proto::GetFirstResponse {
            identity: Some(identity),
        }))
    }

    async fn get_last(
        &self,
        _request: Request<proto::GetLastRequest>,
    ) -> Result<Response<proto::GetLastResponse>, Status> {
        let height = self.last_height()?;
        let identity = self.identity_at(height)?;
        Ok(Response::new(proto::GetLastResponse {
            identity: Some(identity),
        }))
    }

    async fn get_header(
        &self,
        request: Request<proto::GetHeaderRequest>,
    ) -> Result<Response<proto::GetHeaderResponse>, Status> {
        let height = request.into_inner().height;
        let header = self
            .reader
            .header(height)
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::NotFound(format!("no header at height {height}")))?;
        let identity = identity(height, &header.block_id, &header.state_commitment);
        Ok(Response::new(proto::GetHeaderResponse {
            identity: Some(identity),
            parent_id: header.parent_id.to_vec(),
            seals: header.seals.iter().map(seal_to_proto).collect(),
        }))
    }

    async fn get_commit(
        &self,
        request: Request<proto::GetCommitRequest>,
    ) -> Result<Response<proto::GetCommitResponse>, Status> {
        let height = request.into_inner().height;
        let identity = self.identity_at(height)?;
        Ok(Response::new(proto::GetCommitResponse {
            identity: Some(identity),
        }))
    }

    async fn get_values(
        &self,
        request: Request<proto::GetValuesRequest>,
    ) -> Result<Response<proto::GetValuesResponse>, Status> {
        let request = request.into_inner();
        let height = self.bounded_height(request.height)?;
        let paths = proto_to_paths(&request.paths)?;
        let identity = self.identity_at(height)?;

        let mut values = Vec::with_capacity(paths.len());
        for path in &paths {
            let payload = self
                .reader
                .payload(height, path)
                .map_err(ApiError::from)?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("no value at path {path} height {height}"))
                })?;
            values.push(payload_to_proto(&payload));
        }

        Ok(Response::new(proto::GetValuesResponse {
            identity: Some(identity),
            values,
        }))
    }

    async fn get_register_values(
        &self,
        request: Request<proto::GetRegisterValuesRequest>,
    ) -> Result<Response<proto::GetRegisterValuesResponse>, Status> {
        let request = request.into_inner();
        // Latest-at-or-below semantics: heights above the index clamp to
        // the last indexed height.
        let height = request.height.min(self.last_height()?);
        let paths = proto_to_paths(&request.paths)?;
        let identity = self.identity_at(height)?;

        let mut values = Vec::new();
        for path in &paths {
            if let Some(payload) = self.reader.payload(height, path).map_err(ApiError::from)? {
                values.push(proto::RegisterValue {
                    path: path.to_vec(),
                    payload: Some(payload_to_proto(&payload)),
                });
            }
        }

        Ok(Response::new(proto::GetRegisterValuesResponse {
            identity: Some(identity),
            values,
        }))
    }

    type ListRegistersStream = ResponseStream<proto::RegisterValue>;

    async fn list_registers(
        &self,
        request: Request<proto::ListRegistersRequest>,
    ) -> Result<Response<Self::ListRegistersStream>, Status> {
        let height = self.bounded_height(request.into_inner().height)?;
        // Materialized in one pass; the scan already has to visit every
        // register to pick each path's latest write.
        let registers = self
            .reader
            .registers_at(height, None)
            .map_err(ApiError::from)?;
        tracing::debug!(height, registers = registers.len(), "streaming register scan");

        let stream = tokio_stream::iter(registers.into_iter().map(|register| {
            Ok::<_, Status>(proto::RegisterValue {
                path: register.path.to_vec(),
                payload: Some(payload_to_proto(&register.payload)),
            })
        }));
        Ok(Response::new(Box::pin(stream)))
    }
}

// Keep the service constructible from shared readers too.
impl<S: KeyValue> From<Arc<Reader<S>>> for ApiService<S> {
    fn from(reader: Arc<Reader<S>>) -> Self {
        Self { reader }
    }
}
