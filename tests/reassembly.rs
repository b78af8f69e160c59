//! Integration tests for fragment routing, carving, and ordering.

use std::{sync::Arc, time::SystemTime};

use bytes::Bytes;
use proptest::prelude::*;
use rstest::rstest;
use tapwire::{BufferedEntry, ConversionPhase, CoreConfig, ElementId};
use tapwire_testing::{DelimitedParser, StampRole, TestPipeline, endpoints, pipeline, split_payload};

const REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\r\n";

fn http_pipeline(config: &CoreConfig) -> TestPipeline {
    pipeline(
        vec![Arc::new(
            DelimitedParser::new("http", b"\r\n\r\n".to_vec()).stamping(StampRole::Request {
                expects_reply: true,
            }),
        )],
        config,
    )
}

#[rstest]
#[case(&[1])]
#[case(&[3])]
#[case(&[7])]
#[case(&[1, 4, 5, 11])]
#[case(&[])]
#[tokio::test]
async fn arbitrary_split_points_carve_exactly_one_message(#[case] cuts: &[usize]) {
    tapwire_testing::init_tracing();
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10001, 80);

    let mut carved = Vec::new();
    for fragment in split_payload(REQUEST, cuts) {
        carved.extend(
            stack
                .demux
                .buffer(BufferedEntry::new(connection, fragment))
                .await,
        );
    }

    assert_eq!(carved.len(), 1, "exactly one message regardless of splits");
    let element = carved[0].read().await;
    assert_eq!(element.raw().as_ref(), REQUEST);
    assert_eq!(element.phase(), ConversionPhase::Completed);
    assert_eq!(element.endpoints(), Some(connection));
    assert_eq!(stack.history.len(), 1);
}

#[tokio::test]
async fn pipelined_messages_in_one_delivery_all_carve() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10002, 80);
    let mut delivery = Vec::new();
    delivery.extend_from_slice(REQUEST);
    delivery.extend_from_slice(b"POST /x HTTP/1.1\r\n\r\n");

    let carved = stack
        .demux
        .buffer(BufferedEntry::new(connection, delivery.clone()))
        .await;

    assert_eq!(carved.len(), 2);
    // each element keeps only its own bytes as provenance
    assert_eq!(carved[0].read().await.raw().as_ref(), REQUEST);
    assert_eq!(
        carved[1].read().await.raw().as_ref(),
        b"POST /x HTTP/1.1\r\n\r\n"
    );
    assert_eq!(stack.history.total_bytes(), delivery.len() as u64);
}

#[tokio::test]
async fn carved_messages_chain_and_order_by_sequence() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10003, 80);

    let first = stack
        .demux
        .buffer(BufferedEntry::new(connection, REQUEST))
        .await;
    let second = stack
        .demux
        .buffer(BufferedEntry::new(connection, REQUEST))
        .await;
    let (first, second) = (&first[0], &second[0]);

    let first_guard = first.read().await;
    let second_guard = second.read().await;
    assert!(
        first_guard.sequence().expect("admitted")
            < second_guard.sequence().expect("admitted"),
        "delivery order implies sequence order"
    );
    assert_eq!(second_guard.previous(), Some(first_guard.id()));
    assert!(first_guard.previous().is_none());
}

#[tokio::test]
async fn connections_are_isolated() {
    let stack = http_pipeline(&CoreConfig::default());
    let forward = endpoints(10004, 80);
    let reverse = forward.reversed();

    // incomplete bytes on each direction: neither may complete the other
    let carved_forward = stack
        .demux
        .buffer(BufferedEntry::new(forward, &REQUEST[..9]))
        .await;
    let carved_reverse = stack
        .demux
        .buffer(BufferedEntry::new(reverse, b"HTTP/1.1 200 OK" as &[u8]))
        .await;

    assert!(carved_forward.is_empty());
    assert!(carved_reverse.is_empty());
    assert_eq!(stack.demux.connection_count(), 2);
    assert_eq!(
        stack.demux.reassembler_for(forward).buffered_bytes().await,
        9
    );
    assert_eq!(
        stack.demux.reassembler_for(reverse).buffered_bytes().await,
        15
    );
}

#[tokio::test]
async fn incomplete_bytes_wait_without_polluting_history() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10005, 80);

    let carved = stack
        .demux
        .buffer(BufferedEntry::new(connection, &REQUEST[..5]))
        .await;
    assert!(carved.is_empty());
    assert!(
        stack.history.is_empty(),
        "deleted carve attempts leave no history entry"
    );

    let carved = stack
        .demux
        .buffer(BufferedEntry::new(connection, &REQUEST[5..]))
        .await;
    assert_eq!(carved.len(), 1);
}

#[tokio::test]
async fn duplicate_entry_identifiers_are_skipped() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10006, 80);
    let entry = BufferedEntry::new(connection, REQUEST).with_id("replayed-1");

    let first = stack.demux.buffer(entry.clone()).await;
    let second = stack.demux.buffer(entry).await;

    assert_eq!(first.len(), 1);
    assert!(second.is_empty(), "second admission rejected");
    assert_eq!(stack.history.len(), 1);
}

#[tokio::test]
async fn raw_chunks_publish_when_enabled() {
    let config = CoreConfig {
        publish_raw_chunks: true,
        ..CoreConfig::default()
    };
    let stack = http_pipeline(&config);
    let connection = endpoints(10007, 80);

    let carved = stack
        .demux
        .route(
            connection.sender,
            connection.receiver,
            Bytes::from_static(REQUEST),
            SystemTime::now(),
        )
        .await;

    assert_eq!(carved.len(), 1, "raw chunks are admitted, not returned");
    // raw chunk plus the carved message
    assert_eq!(stack.history.len(), 2);
    let snapshot = stack.history.snapshot();
    let raw = snapshot[0].read().await;
    assert!(raw.id().as_str().contains("#raw-"));
    assert_eq!(
        raw.facet_of(tapwire::FacetKind::ParsingIncomplete),
        Some(&tapwire::Facet::ParsingIncomplete)
    );
}

#[tokio::test]
async fn blank_identifiers_bypass_dedup() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10008, 80);

    for _ in 0..2 {
        let carved = stack
            .demux
            .buffer(BufferedEntry::new(connection, REQUEST))
            .await;
        assert_eq!(carved.len(), 1);
    }
    assert_eq!(stack.history.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    /// Reassembly round-trip: any fragmentation of a delimited message
    /// yields exactly one carved message with the original bytes.
    #[test]
    fn reassembly_round_trip(cuts in proptest::collection::vec(0..REQUEST.len(), 0..6)) {
        let mut cuts = cuts;
        cuts.sort_unstable();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let stack = http_pipeline(&CoreConfig::default());
            let connection = endpoints(10009, 80);
            let mut carved = Vec::new();
            for fragment in split_payload(REQUEST, &cuts) {
                carved.extend(
                    stack
                        .demux
                        .buffer(BufferedEntry::new(connection, fragment))
                        .await,
                );
            }
            assert_eq!(carved.len(), 1);
            assert_eq!(carved[0].read().await.raw().as_ref(), REQUEST);
        });
    }
}

#[tokio::test]
async fn carved_ids_are_derived_and_stable() {
    let stack = http_pipeline(&CoreConfig::default());
    let connection = endpoints(10010, 80);
    let carved = stack
        .demux
        .buffer(BufferedEntry::new(connection, REQUEST))
        .await;
    let id: ElementId = carved[0].read().await.id().clone();
    assert_eq!(id.as_str(), format!("{connection}#0"));
}
