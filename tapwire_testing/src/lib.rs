//! Utilities for exercising the `tapwire` pipeline in tests.
//!
//! Provides stub parser plugins, a one-call pipeline constructor, and
//! small fixtures (endpoint pairs, payload splitting) shared by the unit
//! and integration suites.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, Once},
};

use async_trait::async_trait;
use bytes::Bytes;
use tapwire::{
    ConversionContext,
    ConversionExecutor,
    ConversionPhase,
    ConverterPlugin,
    CoreConfig,
    EndpointPair,
    Facet,
    KnownMessageIdRegistry,
    MessageElement,
    MessageHistory,
    MultiConnectionDemultiplexer,
    PluginError,
    PluginRegistry,
    PluginSpec,
};

/// Install a compact tracing subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .try_init();
    });
}

/// Loopback endpoint pair for the given ports.
///
/// # Panics
///
/// Panics if the synthesised addresses fail to parse, which cannot happen
/// for valid ports.
#[must_use]
pub fn endpoints(sender_port: u16, receiver_port: u16) -> EndpointPair {
    let sender: SocketAddr = format!("127.0.0.1:{sender_port}")
        .parse()
        .expect("valid loopback address");
    let receiver: SocketAddr = format!("127.0.0.1:{receiver_port}")
        .parse()
        .expect("valid loopback address");
    EndpointPair::new(sender, receiver)
}

/// Split `payload` at the given cut points, returning the fragments.
///
/// # Panics
///
/// Panics when a cut point exceeds the payload length.
#[must_use]
pub fn split_payload(payload: &[u8], cuts: &[usize]) -> Vec<Bytes> {
    let mut fragments = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        assert!(cut >= start && cut <= payload.len(), "cut out of range");
        fragments.push(Bytes::copy_from_slice(&payload[start..cut]));
        start = cut;
    }
    fragments.push(Bytes::copy_from_slice(&payload[start..]));
    fragments
}

/// Which exchange-role facet a [`DelimitedParser`] stamps on carved
/// messages.
#[derive(Clone, Copy, Debug)]
pub enum StampRole {
    /// Stamp nothing.
    None,
    /// Stamp a request facet with the given reply expectation.
    Request {
        /// Whether pairing should await a reply.
        expects_reply: bool,
    },
    /// Stamp a response facet.
    Response,
}

/// Protocol parser carving messages terminated by a fixed delimiter.
///
/// Finds the first delimiter occurrence in the element's raw bytes and
/// reports everything up to and including it as consumed; with no
/// delimiter present it requests deletion, signalling "not enough bytes
/// yet" to the reassembler.
pub struct DelimitedParser {
    name: String,
    delimiter: Vec<u8>,
    stamp: StampRole,
}

impl DelimitedParser {
    /// Parser named `name` splitting on `delimiter`.
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            delimiter: delimiter.into(),
            stamp: StampRole::None,
        }
    }

    /// Stamp carved messages with the given role facet.
    #[must_use]
    pub fn stamping(mut self, stamp: StampRole) -> Self {
        self.stamp = stamp;
        self
    }
}

#[async_trait]
impl ConverterPlugin for DelimitedParser {
    fn spec(&self) -> PluginSpec {
        PluginSpec::new(self.name.clone(), ConversionPhase::ProtocolParsing)
    }

    async fn convert(
        &self,
        element: &mut MessageElement,
        ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        let raw = element.raw();
        let Some(position) = raw
            .windows(self.delimiter.len())
            .position(|window| window == self.delimiter.as_slice())
        else {
            ctx.request_deletion();
            return Ok(());
        };
        ctx.set_consumed(position + self.delimiter.len());
        match self.stamp {
            StampRole::None => {}
            StampRole::Request { expects_reply } => {
                element.add_facet(Facet::Request { expects_reply });
            }
            StampRole::Response => element.add_facet(Facet::Response),
        }
        Ok(())
    }
}

/// Plugin that appends its name to a shared log when invoked.
pub struct RecordingPlugin {
    spec: PluginSpec,
    log: Arc<Mutex<Vec<String>>>,
    oversized: bool,
}

impl RecordingPlugin {
    /// Recording plugin with the given declaration.
    #[must_use]
    pub fn new(spec: PluginSpec, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            spec,
            log,
            oversized: false,
        }
    }

    /// Opt in to oversized content.
    #[must_use]
    pub fn handling_oversized(mut self) -> Self {
        self.oversized = true;
        self
    }
}

#[async_trait]
impl ConverterPlugin for RecordingPlugin {
    fn spec(&self) -> PluginSpec { self.spec.clone() }

    fn handles_oversized(&self) -> bool { self.oversized }

    async fn convert(
        &self,
        _element: &mut MessageElement,
        _ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        self.log
            .lock()
            .expect("recording log lock")
            .push(self.spec.name.clone());
        Ok(())
    }
}

/// Plugin that always fails with a parse error.
pub struct FailingPlugin {
    spec: PluginSpec,
}

impl FailingPlugin {
    /// Failing plugin with the given declaration.
    #[must_use]
    pub fn new(spec: PluginSpec) -> Self { Self { spec } }
}

#[async_trait]
impl ConverterPlugin for FailingPlugin {
    fn spec(&self) -> PluginSpec { self.spec.clone() }

    async fn convert(
        &self,
        _element: &mut MessageElement,
        _ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        Err(PluginError::Parse("always fails".into()))
    }
}

/// Plugin that always panics.
pub struct PanickingPlugin {
    spec: PluginSpec,
}

impl PanickingPlugin {
    /// Panicking plugin with the given declaration.
    #[must_use]
    pub fn new(spec: PluginSpec) -> Self { Self { spec } }
}

#[async_trait]
impl ConverterPlugin for PanickingPlugin {
    fn spec(&self) -> PluginSpec { self.spec.clone() }

    async fn convert(
        &self,
        _element: &mut MessageElement,
        _ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        panic!("plugin blew up");
    }
}

/// Plugin that always requests deletion of the in-flight element.
pub struct DeletingPlugin {
    spec: PluginSpec,
}

impl DeletingPlugin {
    /// Deleting plugin with the given declaration.
    #[must_use]
    pub fn new(spec: PluginSpec) -> Self { Self { spec } }
}

#[async_trait]
impl ConverterPlugin for DeletingPlugin {
    fn spec(&self) -> PluginSpec { self.spec.clone() }

    async fn convert(
        &self,
        _element: &mut MessageElement,
        ctx: &mut ConversionContext,
    ) -> Result<(), PluginError> {
        ctx.request_deletion();
        Ok(())
    }
}

/// Fully wired pipeline for integration tests.
pub struct TestPipeline {
    /// Shared message history.
    pub history: Arc<MessageHistory>,
    /// Shared dedup registry.
    pub dedup: Arc<KnownMessageIdRegistry>,
    /// Executor over the resolved plugin catalog.
    pub executor: Arc<ConversionExecutor>,
    /// Demultiplexer routing fragments to reassemblers.
    pub demux: Arc<MultiConnectionDemultiplexer>,
}

/// Wire a complete pipeline from `plugins` and `config`.
///
/// # Panics
///
/// Panics when the plugin catalog fails to resolve; tests construct valid
/// catalogs.
#[must_use]
pub fn pipeline(plugins: Vec<Arc<dyn ConverterPlugin>>, config: &CoreConfig) -> TestPipeline {
    let registry = Arc::new(
        PluginRegistry::resolve(plugins, &config.parser_selector)
            .expect("plugin catalog resolves"),
    );
    let history = Arc::new(MessageHistory::from_config(config));
    let executor = Arc::new(ConversionExecutor::new(
        registry,
        history.completion_board(),
        config.oversized_threshold,
    ));
    let dedup = Arc::new(KnownMessageIdRegistry::new());
    let demux = Arc::new(MultiConnectionDemultiplexer::new(
        Arc::clone(&executor),
        Arc::clone(&history),
        Arc::clone(&dedup),
        config,
    ));
    TestPipeline {
        history,
        dedup,
        executor,
        demux,
    }
}
