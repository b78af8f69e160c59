//! Per-direction reassembler: buffers fragments and carves messages.
//!
//! One reassembler exists per directional connection. Its processing is
//! strictly serialised: a fragment is appended and all resulting carve
//! attempts finish before the next fragment for the same direction is
//! touched. Different directions proceed fully in parallel.
//!
//! Message framing is protocol-specific and decided by the registered
//! parser plugins: a conversion ending in the `deleted` terminal state is
//! read as "not enough bytes yet" and the loop stops until more bytes
//! arrive, while a completed conversion advances the buffer past the bytes
//! the parser reported as consumed.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::Mutex;

use super::entry::BufferedEntry;
use crate::{
    accumulator::ByteAccumulator,
    convert::{ConversionExecutor, ConversionStatus},
    dedup::KnownMessageIdRegistry,
    element::{ConversionPhase, ElementId, EndpointPair, Facet, MessageElement},
    history::{MessageHistory, SharedElement},
};

/// Metadata key the reassembler stamps with the capture time in
/// milliseconds since the Unix epoch.
pub const METADATA_CAPTURED_AT: &str = "captured-at-ms";

struct ReassemblyState {
    buffer: ByteAccumulator,
    previous: Option<ElementId>,
    carved: u64,
    raw_chunks: u64,
}

/// Serialised reassembly pipeline for one connection direction.
pub struct ConnectionReassembler {
    connection: EndpointPair,
    state: Mutex<ReassemblyState>,
    executor: Arc<ConversionExecutor>,
    history: Arc<MessageHistory>,
    dedup: Arc<KnownMessageIdRegistry>,
    publish_raw_chunks: bool,
}

impl ConnectionReassembler {
    /// Create a reassembler for one connection direction.
    #[must_use]
    pub fn new(
        connection: EndpointPair,
        executor: Arc<ConversionExecutor>,
        history: Arc<MessageHistory>,
        dedup: Arc<KnownMessageIdRegistry>,
        publish_raw_chunks: bool,
    ) -> Self {
        Self {
            connection,
            state: Mutex::new(ReassemblyState {
                buffer: ByteAccumulator::new(),
                previous: None,
                carved: 0,
                raw_chunks: 0,
            }),
            executor,
            history,
            dedup,
            publish_raw_chunks,
        }
    }

    /// The direction this reassembler owns.
    #[must_use]
    pub fn connection(&self) -> EndpointPair { self.connection }

    /// Bytes currently buffered and not yet carved into a message.
    pub async fn buffered_bytes(&self) -> usize { self.state.lock().await.buffer.len() }

    /// Buffer a fragment and carve as many complete messages as the bytes
    /// allow, returning them oldest-first.
    ///
    /// A non-blank entry identifier already known to the dedup registry
    /// makes this a no-op, which is what keeps replaying a persisted
    /// capture idempotent.
    pub async fn buffer_new_part(&self, entry: BufferedEntry) -> Vec<SharedElement> {
        if !self.dedup.try_admit(&entry.id) {
            tracing::debug!(id = %entry.id, "fragment already admitted; skipping");
            return Vec::new();
        }

        // one buffering/parsing attempt at a time per direction
        let mut state = self.state.lock().await;
        if let Some(previous) = entry.previous.clone() {
            state.previous = Some(previous);
        }
        state.buffer.append(entry.bytes.clone());

        if self.publish_raw_chunks {
            self.publish_raw_chunk(&mut state, &entry);
        }

        let mut carved = Vec::new();
        let mut echo_id = (!entry.id.is_blank()).then(|| entry.id.clone());
        while !state.buffer.is_empty() {
            let raw = state.buffer.coalesced();
            let (candidate_id, derived) = match echo_id.take() {
                Some(id) => (id, false),
                None => (self.derive_id(state.carved), true),
            };
            if derived && !self.dedup.try_admit(&candidate_id) {
                tracing::debug!(id = %candidate_id, "carve candidate already admitted");
                break;
            }

            let mut metadata = entry.metadata.clone();
            stamp_timestamp(&mut metadata, entry.timestamp);
            let mut element = MessageElement::new(candidate_id.clone(), raw.clone())
                .with_previous(state.previous.clone())
                .with_metadata(metadata);
            element.add_facet(Facet::Endpoints(self.connection));

            let shared = self.history.admit(element);
            let mut guard = shared.write().await;
            let outcome = self.executor.run(&mut guard).await;

            match outcome.status {
                ConversionStatus::Deleted => {
                    drop(guard);
                    // the parser wants more bytes; release the candidate so
                    // a later attempt can reuse the identifier
                    self.history.remove(&candidate_id);
                    self.dedup.remove(&candidate_id);
                    break;
                }
                ConversionStatus::Completed => {
                    let consumed = outcome.consumed.unwrap_or(raw.len()).min(raw.len());
                    if consumed == 0 {
                        drop(guard);
                        tracing::warn!(
                            connection = %self.connection,
                            "parser reported zero consumed bytes; stopping carve loop"
                        );
                        break;
                    }
                    if consumed < raw.len() {
                        // trailing bytes belong to the next message, not to
                        // this element's provenance
                        guard.retain_raw_prefix(consumed);
                        self.history.shrink_entry(&candidate_id, consumed as u64);
                    }
                    drop(guard);
                    state
                        .buffer
                        .truncate(consumed)
                        .expect("consumed bounded by buffer length");
                    state.previous = Some(candidate_id.clone());
                    state.carved += 1;
                    self.dedup.mark_converted(&candidate_id);
                    carved.push(shared);
                }
            }
        }
        carved
    }

    /// Admit the raw, not-yet-parsed chunk so callers that want immediate
    /// visibility see it without waiting for a carve.
    fn publish_raw_chunk(&self, state: &mut ReassemblyState, entry: &BufferedEntry) {
        let id = ElementId::new(format!("{}#raw-{}", self.connection, state.raw_chunks));
        state.raw_chunks += 1;
        let mut metadata = entry.metadata.clone();
        stamp_timestamp(&mut metadata, entry.timestamp);
        let mut element =
            MessageElement::new(id, entry.bytes.clone()).with_metadata(metadata);
        element.add_facet(Facet::Endpoints(self.connection));
        element.add_facet(Facet::ParsingIncomplete);
        element
            .advance_to(ConversionPhase::Completed)
            .expect("fresh raw chunk completes");
        drop(self.history.admit(element));
    }

    fn derive_id(&self, carved: u64) -> ElementId {
        ElementId::new(format!("{}#{}", self.connection, carved))
    }
}

fn stamp_timestamp(metadata: &mut HashMap<String, String>, timestamp: SystemTime) {
    let millis = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    metadata.insert(METADATA_CAPTURED_AT.to_owned(), millis.to_string());
}
