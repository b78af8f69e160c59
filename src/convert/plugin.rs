//! Parser plugin contract for the conversion pipeline.
//!
//! Plugins declare where they run (phase, priority), what they answer to
//! (parser identifiers for selective activation), and what they need
//! (dependencies on other plugins). The executor invokes them one at a time
//! against a mutable element; a plugin communicates back through its
//! [`Result`] and the [`ConversionContext`].

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{ConversionPhase, MessageElement};

/// Static declaration describing one plugin to the registry.
#[derive(Clone, Debug)]
pub struct PluginSpec {
    /// Unique plugin name, also usable as a parser identifier.
    pub name: String,
    /// Pipeline phase the plugin runs in. [`ConversionPhase::Deletion`]
    /// registers a cleanup-aware plugin invoked only for discarded elements.
    pub phase: ConversionPhase,
    /// Higher priority runs earlier within the phase.
    pub priority: i32,
    /// Additional identifiers the plugin answers to for activation toggles.
    pub parser_ids: Vec<String>,
    /// Optional plugins start inactive unless the parser selector names them.
    pub optional: bool,
    /// Names of plugins that must be registered before this one resolves.
    pub depends_on: Vec<String>,
}

impl PluginSpec {
    /// Declaration with default priority, no aliases, and no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: ConversionPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            priority: 0,
            parser_ids: Vec::new(),
            optional: false,
            depends_on: Vec::new(),
        }
    }

    /// Set the intra-phase priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add parser identifiers the plugin answers to.
    #[must_use]
    pub fn with_parser_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parser_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Mark the plugin optional (inactive unless selected).
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declare dependencies on other plugins by name.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether this plugin answers to `parser_id`.
    #[must_use]
    pub fn answers_to(&self, parser_id: &str) -> bool {
        self.name == parser_id || self.parser_ids.iter().any(|id| id == parser_id)
    }
}

/// Error returned by a failing plugin invocation.
///
/// Failures are recovered locally: the executor attaches a diagnostic note
/// to the element and keeps running the remaining plugins and phases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The bytes did not match the format the plugin parses.
    #[error("parse failure: {0}")]
    Parse(String),
    /// Any other plugin-internal failure.
    #[error("plugin failure: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Per-invocation channel from a plugin back to the executor.
#[derive(Debug, Default)]
pub struct ConversionContext {
    delete_requested: bool,
    consumed: Option<usize>,
}

impl ConversionContext {
    /// Ask the executor to discard the in-flight element. Remaining pipeline
    /// phases are skipped and the deletion phase runs instead. A protocol
    /// parser uses this to signal "not enough bytes yet".
    pub fn request_deletion(&mut self) { self.delete_requested = true; }

    /// Whether deletion has been requested during this conversion.
    #[must_use]
    pub fn deletion_requested(&self) -> bool { self.delete_requested }

    /// Report how many buffered bytes the carved message actually consumed.
    /// Without a report the reassembler consumes the element's whole raw
    /// range.
    pub fn set_consumed(&mut self, bytes: usize) { self.consumed = Some(bytes); }

    /// Byte count reported via [`set_consumed`](Self::set_consumed), if any.
    #[must_use]
    pub fn consumed(&self) -> Option<usize> { self.consumed }
}

/// A format parser participating in the conversion pipeline.
#[async_trait]
pub trait ConverterPlugin: Send + Sync {
    /// Static registration declaration.
    fn spec(&self) -> PluginSpec;

    /// Whether the plugin is willing to parse oversized elements.
    fn handles_oversized(&self) -> bool { false }

    /// Run the plugin against one element.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] on parse or internal failure; the executor
    /// records the failure on the element and continues.
    async fn convert(
        &self,
        element: &mut MessageElement,
        ctx: &mut ConversionContext,
    ) -> Result<(), PluginError>;
}
