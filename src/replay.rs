//! Persisted capture records and idempotent replay.
//!
//! A capture session can be persisted as a sequence of [`CapturedRecord`]s
//! and fed back through the same pipeline later. Records carry the
//! identifier originally assigned at capture time, so the dedup registry
//! rejects the second and subsequent replays of the same record without
//! side effects.

use std::{
    net::{AddrParseError, SocketAddr},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bincode::{Decode, Encode, config, error::DecodeError, error::EncodeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    element::{ElementId, EndpointPair},
    history::SharedElement,
    reassembly::{BufferedEntry, MultiConnectionDemultiplexer},
};

/// Errors raised while decoding or feeding persisted records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// A record carried an unparseable socket address.
    #[error("invalid socket address in captured record: {0}")]
    Address(#[from] AddrParseError),
    /// The persisted byte stream was not a valid record sequence.
    #[error("failed to decode captured record: {0}")]
    Decode(#[from] DecodeError),
    /// Encoding a record for persistence failed.
    #[error("failed to encode captured record: {0}")]
    Encode(#[from] EncodeError),
}

/// One previously captured fragment: bytes plus admission metadata.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct CapturedRecord {
    /// Identifier assigned at capture time; drives replay deduplication.
    pub id: String,
    /// Sender socket address, in `ip:port` form.
    pub sender: String,
    /// Receiver socket address, in `ip:port` form.
    pub receiver: String,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp_millis: u64,
    /// Admission-time metadata pairs.
    pub metadata: Vec<(String, String)>,
    /// The captured bytes.
    pub bytes: Vec<u8>,
}

impl CapturedRecord {
    /// Serialise the record with bincode's standard configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Encode`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplayError> {
        Ok(bincode::encode_to_vec(self, config::standard())?)
    }

    /// Decode one record from the front of `bytes`, returning it and the
    /// number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Decode`] if the bytes are not a valid record.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), ReplayError> {
        Ok(bincode::decode_from_slice(bytes, config::standard())?)
    }

    fn to_entry(&self) -> Result<BufferedEntry, ReplayError> {
        let sender: SocketAddr = self.sender.parse()?;
        let receiver: SocketAddr = self.receiver.parse()?;
        let mut entry = BufferedEntry::new(EndpointPair::new(sender, receiver), self.bytes.clone())
            .with_id(ElementId::new(self.id.clone()))
            .with_timestamp(UNIX_EPOCH + Duration::from_millis(self.timestamp_millis));
        for (key, value) in &self.metadata {
            entry = entry.with_metadata_entry(key.clone(), value.clone());
        }
        Ok(entry)
    }
}

/// Builds a [`CapturedRecord`] from live admission data.
#[must_use]
pub fn record_fragment(
    id: &ElementId,
    connection: EndpointPair,
    bytes: &[u8],
    timestamp: SystemTime,
) -> CapturedRecord {
    CapturedRecord {
        id: id.as_str().to_owned(),
        sender: connection.sender.to_string(),
        receiver: connection.receiver.to_string(),
        timestamp_millis: u64::try_from(
            timestamp
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(u64::MAX),
        metadata: Vec::new(),
        bytes: bytes.to_vec(),
    }
}

/// Feeds persisted records back through the reassembly pipeline.
pub struct ReplayFeeder {
    demux: Arc<MultiConnectionDemultiplexer>,
}

impl ReplayFeeder {
    /// Create a feeder targeting `demux`.
    #[must_use]
    pub fn new(demux: Arc<MultiConnectionDemultiplexer>) -> Self { Self { demux } }

    /// Feed a batch of records, returning every message they carved.
    /// Records whose identifiers were already admitted are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Address`] when a record carries an
    /// unparseable socket address; earlier records stay admitted.
    pub async fn feed(
        &self,
        records: impl IntoIterator<Item = CapturedRecord>,
    ) -> Result<Vec<SharedElement>, ReplayError> {
        let mut carved = Vec::new();
        for record in records {
            let entry = record.to_entry()?;
            carved.extend(self.demux.buffer(entry).await);
        }
        Ok(carved)
    }

    /// Decode and feed a persisted byte stream of concatenated records.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Decode`] on a malformed stream or
    /// [`ReplayError::Address`] on a bad address; earlier records stay
    /// admitted.
    pub async fn feed_bytes(&self, mut bytes: &[u8]) -> Result<Vec<SharedElement>, ReplayError> {
        let mut carved = Vec::new();
        while !bytes.is_empty() {
            let (record, consumed) = CapturedRecord::from_bytes(bytes)?;
            bytes = &bytes[consumed..];
            carved.extend(self.demux.buffer(record.to_entry()?).await);
        }
        Ok(carved)
    }
}
