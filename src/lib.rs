#![doc(html_root_url = "https://docs.rs/tapwire/latest")]
//! Public API for the `tapwire` library.
//!
//! This crate provides the streaming reassembly and conversion core of an
//! intercepting network proxy: per-connection byte accumulation, pluggable
//! message carving, a phased conversion pipeline, request/response
//! pairing, and a bounded message history that preserves exact byte-level
//! provenance for every captured message.

pub mod accumulator;
pub mod config;
pub mod convert;
pub mod dedup;
pub mod element;
pub mod history;
pub mod metrics;
pub mod pairing;
pub mod reassembly;
pub mod replay;

pub use accumulator::{BoundsError, ByteAccumulator};
pub use config::{CapacityPolicy, CoreConfig};
pub use convert::{
    ConversionContext,
    ConversionExecutor,
    ConversionOutcome,
    ConversionStatus,
    ConverterPlugin,
    PluginError,
    PluginRegistry,
    PluginSpec,
    RegistryError,
};
pub use dedup::KnownMessageIdRegistry;
pub use element::{
    ConversionPhase,
    ElementId,
    EndpointPair,
    Facet,
    FacetKind,
    MessageElement,
    Note,
    NoteSeverity,
    PhaseError,
    SequenceNumber,
};
pub use history::{CompletionBoard, CompleteView, MessageHistory, SharedElement, WaitError};
pub use pairing::{ExchangeListener, ExchangePairingHandler, ResponseFuture, TransportError};
pub use reassembly::{BufferedEntry, ConnectionReassembler, MultiConnectionDemultiplexer};
pub use replay::{CapturedRecord, ReplayError, ReplayFeeder};
