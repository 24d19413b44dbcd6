//! Api service behavior over a populated in-memory index.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tonic::{Code, Request};

use amber_index::{Reader, Writer, WriterConfig};
use amber_rpc::proto::api_server::Api;
use amber_rpc::{proto, ApiService};
use amber_storage::MemStore;
use amber_types::{BlockHeader, BlockId, Commitment, Path, Payload, RegisterUpdate};

fn header(height: u64) -> BlockHeader {
    BlockHeader {
        height,
        block_id: BlockId::new([height as u8; 32]),
        parent_id: BlockId::new([height.wrapping_sub(1) as u8; 32]),
        state_commitment: Commitment::new([0xc0 | height as u8; 32]),
        seals: vec![],
    }
}

/// Index heights 10..=12 with one register evolving at 10 and 12.
fn populated_service() -> ApiService<MemStore> {
    let store = Arc::new(MemStore::new());
    let reader = Reader::new(Arc::clone(&store));
    let writer = Writer::new(
        Arc::clone(&store),
        WriterConfig {
            flush_threshold: 1,
            flush_interval: Duration::ZERO,
        },
    );

    writer.first(10).unwrap();
    for height in 10..=12 {
        let h = header(height);
        writer.header(height, &h).unwrap();
        writer.commit(height, &h.state_commitment).unwrap();
    }
    writer
        .payloads(
            10,
            &[RegisterUpdate::new(
                Path::new([1; 32]),
                Payload::new(0, vec![1]),
            )],
        )
        .unwrap();
    writer
        .payloads(
            12,
            &[
                RegisterUpdate::new(Path::new([1; 32]), Payload::new(0, vec![2])),
                RegisterUpdate::new(Path::new([2; 32]), Payload::new(0, vec![9])),
            ],
        )
        .unwrap();
    writer.last(12).unwrap();
    writer.flush().unwrap();

    ApiService::new(reader)
}

#[tokio::test]
async fn get_first_and_last_carry_the_identity_trio() {
    let service = populated_service();

    let first = service
        .get_first(Request::new(proto::GetFirstRequest {}))
        .await
        .unwrap()
        .into_inner()
        .identity
        .unwrap();
    assert_eq!(first.height, 10);
    assert_eq!(first.block_id, vec![10u8; 32]);
    assert_eq!(first.commitment, header(10).state_commitment.to_vec());

    let last = service
        .get_last(Request::new(proto::GetLastRequest {}))
        .await
        .unwrap()
        .into_inner()
        .identity
        .unwrap();
    assert_eq!(last.height, 12);
}

#[tokio::test]
async fn get_header_returns_parent_and_not_found() {
    let service = populated_service();

    let response = service
        .get_header(Request::new(proto::GetHeaderRequest { height: 11 }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.parent_id, vec![10u8; 32]);
    assert_eq!(response.identity.unwrap().height, 11);

    let status = service
        .get_header(Request::new(proto::GetHeaderRequest { height: 99 }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn get_values_requires_every_path() {
    let service = populated_service();

    let response = service
        .get_values(Request::new(proto::GetValuesRequest {
            height: 11,
            paths: vec![vec![1u8; 32]],
        }))
        .await
        .unwrap()
        .into_inner();
    // As of height 11 the register still has its height-10 value.
    assert_eq!(response.values.len(), 1);
    assert_eq!(response.values[0].value, vec![1]);

    // Unknown register: the whole call fails.
    let status = service
        .get_values(Request::new(proto::GetValuesRequest {
            height: 11,
            paths: vec![vec![1u8; 32], vec![7u8; 32]],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    // Heights outside the indexed range are rejected.
    let status = service
        .get_values(Request::new(proto::GetValuesRequest {
            height: 9,
            paths: vec![vec![1u8; 32]],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    // Malformed paths are invalid arguments.
    let status = service
        .get_values(Request::new(proto::GetValuesRequest {
            height: 11,
            paths: vec![vec![1u8; 5]],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn get_register_values_omits_missing_and_clamps() {
    let service = populated_service();

    let response = service
        .get_register_values(Request::new(proto::GetRegisterValuesRequest {
            height: 1000, // clamps to last
            paths: vec![vec![1u8; 32], vec![7u8; 32]],
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.identity.unwrap().height, 12);
    assert_eq!(response.values.len(), 1);
    assert_eq!(response.values[0].path, vec![1u8; 32]);
    assert_eq!(
        response.values[0].payload.as_ref().unwrap().value,
        vec![2]
    );
}

#[tokio::test]
async fn list_registers_streams_the_full_scan() {
    let service = populated_service();

    let mut stream = service
        .list_registers(Request::new(proto::ListRegistersRequest { height: 12 }))
        .await
        .unwrap()
        .into_inner();

    let mut entries = Vec::new();
    while let Some(item) = stream.next().await {
        entries.push(item.unwrap());
    }
    assert_eq!(entries.len(), 2);
    // Latest value per register as of the requested height.
    let by_path: std::collections::HashMap<_, _> = entries
        .into_iter()
        .map(|e| (e.path.clone(), e.payload.unwrap().value))
        .collect();
    assert_eq!(by_path[&vec![1u8; 32]], vec![2]);
    assert_eq!(by_path[&vec![2u8; 32]], vec![9]);
}
