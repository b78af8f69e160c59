//! Routes captured fragments to per-direction reassemblers.

use std::{net::SocketAddr, sync::Arc, time::SystemTime};

use bytes::Bytes;
use dashmap::DashMap;

use super::{entry::BufferedEntry, reassembler::ConnectionReassembler};
use crate::{
    config::CoreConfig,
    convert::ConversionExecutor,
    dedup::KnownMessageIdRegistry,
    element::EndpointPair,
    history::{MessageHistory, SharedElement},
    metrics,
};

/// Lazily creates and owns one [`ConnectionReassembler`] per directional
/// `(sender, receiver)` pair. Creation is idempotent under concurrent
/// first-use and no byte ever crosses between pairs.
pub struct MultiConnectionDemultiplexer {
    reassemblers: DashMap<EndpointPair, Arc<ConnectionReassembler>>,
    executor: Arc<ConversionExecutor>,
    history: Arc<MessageHistory>,
    dedup: Arc<KnownMessageIdRegistry>,
    publish_raw_chunks: bool,
}

impl MultiConnectionDemultiplexer {
    /// Create a demultiplexer over shared pipeline components.
    #[must_use]
    pub fn new(
        executor: Arc<ConversionExecutor>,
        history: Arc<MessageHistory>,
        dedup: Arc<KnownMessageIdRegistry>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            reassemblers: DashMap::new(),
            executor,
            history,
            dedup,
            publish_raw_chunks: config.publish_raw_chunks,
        }
    }

    /// The reassembler owning `connection`, created on first use.
    #[must_use]
    pub fn reassembler_for(&self, connection: EndpointPair) -> Arc<ConnectionReassembler> {
        self.reassemblers
            .entry(connection)
            .or_insert_with(|| {
                tracing::debug!(%connection, "creating reassembler");
                metrics::inc_reassemblers();
                Arc::new(ConnectionReassembler::new(
                    connection,
                    Arc::clone(&self.executor),
                    Arc::clone(&self.history),
                    Arc::clone(&self.dedup),
                    self.publish_raw_chunks,
                ))
            })
            .clone()
    }

    /// Route one captured fragment, returning any messages it completed.
    pub async fn route(
        &self,
        sender: SocketAddr,
        receiver: SocketAddr,
        bytes: impl Into<Bytes>,
        timestamp: SystemTime,
    ) -> Vec<SharedElement> {
        let connection = EndpointPair::new(sender, receiver);
        self.buffer(BufferedEntry::new(connection, bytes).with_timestamp(timestamp))
            .await
    }

    /// Route a pre-built admission record.
    pub async fn buffer(&self, entry: BufferedEntry) -> Vec<SharedElement> {
        self.reassembler_for(entry.connection)
            .buffer_new_part(entry)
            .await
    }

    /// Number of reassemblers created so far.
    #[must_use]
    pub fn connection_count(&self) -> usize { self.reassemblers.len() }
}
