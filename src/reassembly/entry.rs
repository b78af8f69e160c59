//! Admission records delivered to a connection reassembler.

use std::{collections::HashMap, time::SystemTime};

use bytes::Bytes;

use crate::element::{ElementId, EndpointPair};

/// One fragment of captured traffic queued for reassembly.
///
/// Carries the raw bytes plus everything admission needs: the connection
/// direction, an identifier for deduplication (blank opts out), the causal
/// predecessor on the same direction, and arbitrary admission-time
/// metadata.
#[derive(Clone, Debug)]
pub struct BufferedEntry {
    /// Deduplication identifier. Blank identifiers bypass the registry.
    pub id: ElementId,
    /// Direction the bytes travelled.
    pub connection: EndpointPair,
    /// The captured bytes.
    pub bytes: Bytes,
    /// Identifier of the latest entry emitted on this direction before
    /// this one, when the caller tracks the chain itself (replay does).
    pub previous: Option<ElementId>,
    /// Capture timestamp.
    pub timestamp: SystemTime,
    /// Arbitrary admission-time metadata (hostnames, custom flags).
    pub metadata: HashMap<String, String>,
}

impl BufferedEntry {
    /// Entry with a blank identifier, the current time, and no metadata.
    #[must_use]
    pub fn new(connection: EndpointPair, bytes: impl Into<Bytes>) -> Self {
        Self {
            id: ElementId::new(""),
            connection,
            bytes: bytes.into(),
            previous: None,
            timestamp: SystemTime::now(),
            metadata: HashMap::new(),
        }
    }

    /// Set the deduplication identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ElementId>) -> Self {
        self.id = id.into();
        self
    }

    /// Declare the causal predecessor explicitly.
    #[must_use]
    pub fn with_previous(mut self, previous: ElementId) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Set the capture timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach one metadata key/value pair.
    #[must_use]
    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
