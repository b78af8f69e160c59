//! Phase executor driving one element through the conversion pipeline.
//!
//! Every applicable plugin runs exactly once per phase; a failing or
//! panicking plugin is recorded on the element and never aborts the phase,
//! the message, or sibling connections. A plugin may instead request
//! deletion, which short-circuits the remaining pipeline, runs the
//! cleanup-aware deletion phase, and still releases any waiters.

use std::{any::Any, num::NonZeroUsize, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::time::Instant;

use super::{
    plugin::ConversionContext,
    registry::{PluginRegistry, RegisteredPlugin},
};
use crate::{
    element::{ConversionPhase, Facet, MessageElement, Note},
    history::CompletionBoard,
    metrics,
};

/// Terminal state a conversion ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionStatus {
    /// All requested phases ran; the element is fully converted.
    Completed,
    /// A plugin requested deletion; the element was discarded.
    Deleted,
}

/// Result of running one element through the executor.
#[derive(Clone, Copy, Debug)]
pub struct ConversionOutcome {
    /// Which terminal state the element reached.
    pub status: ConversionStatus,
    /// Bytes of the raw range actually consumed, when a protocol parser
    /// reported a message boundary.
    pub consumed: Option<usize>,
}

/// Runs elements through the ordered conversion phases.
pub struct ConversionExecutor {
    registry: Arc<PluginRegistry>,
    board: Arc<CompletionBoard>,
    oversized_threshold: Option<NonZeroUsize>,
}

impl ConversionExecutor {
    /// Create an executor over a resolved plugin catalog.
    #[must_use]
    pub fn new(
        registry: Arc<PluginRegistry>,
        board: Arc<CompletionBoard>,
        oversized_threshold: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            registry,
            board,
            oversized_threshold,
        }
    }

    /// The resolved plugin catalog this executor runs.
    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> { &self.registry }

    /// Run the full default pipeline against `element`.
    pub async fn run(&self, element: &mut MessageElement) -> ConversionOutcome {
        self.run_phases(element, &ConversionPhase::PIPELINE).await
    }

    /// Run an explicit ordered subset of phases against `element`.
    ///
    /// On return the element is in a terminal phase and every completion
    /// waiter registered for it has been released.
    pub async fn run_phases(
        &self,
        element: &mut MessageElement,
        phases: &[ConversionPhase],
    ) -> ConversionOutcome {
        let started = Instant::now();
        let mut ctx = ConversionContext::default();
        let oversized = self
            .oversized_threshold
            .is_some_and(|threshold| element.byte_len() > threshold.get());

        'pipeline: for &phase in phases {
            if let Err(err) = element.advance_to(phase) {
                tracing::debug!(id = %element.id(), %err, "skipping phase");
                continue;
            }
            for entry in self.registry.entries_for(phase) {
                if !entry.is_active() {
                    continue;
                }
                if oversized && !entry.plugin().handles_oversized() {
                    tracing::trace!(
                        id = %element.id(),
                        plugin = entry.spec().name,
                        "skipping oversized element"
                    );
                    continue;
                }
                self.invoke(entry, element, &mut ctx).await;
                if ctx.deletion_requested() {
                    break 'pipeline;
                }
            }
        }

        let status = if ctx.deletion_requested() {
            self.run_deletion(element, &mut ctx).await;
            ConversionStatus::Deleted
        } else {
            if let Err(err) = element.advance_to(ConversionPhase::Completed) {
                tracing::warn!(id = %element.id(), %err, "element not completable");
            }
            ConversionStatus::Completed
        };

        element.record_elapsed(started.elapsed());
        self.board.complete(element.id());
        ConversionOutcome {
            status,
            consumed: ctx.consumed(),
        }
    }

    /// Run the cleanup-aware deletion phase and mark the element deleted.
    async fn run_deletion(&self, element: &mut MessageElement, ctx: &mut ConversionContext) {
        if element.advance_to(ConversionPhase::Deletion).is_ok() {
            for entry in self.registry.entries_for(ConversionPhase::Deletion) {
                if entry.is_active() {
                    self.invoke(entry, element, ctx).await;
                }
            }
        }
        if let Err(err) = element.advance_to(ConversionPhase::Deleted) {
            tracing::warn!(id = %element.id(), %err, "element not deletable");
        }
    }

    /// Invoke one plugin, recovering failures and panics locally.
    async fn invoke(
        &self,
        entry: &RegisteredPlugin,
        element: &mut MessageElement,
        ctx: &mut ConversionContext,
    ) {
        let name = entry.spec().name.as_str();
        let result = AssertUnwindSafe(entry.plugin().convert(element, ctx))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(id = %element.id(), plugin = name, %err, "plugin failed");
                metrics::inc_plugin_failures();
                element.add_facet(Facet::Note(Note::warning(format!(
                    "plugin {name} failed: {err}"
                ))));
            }
            Err(payload) => {
                let panic = panic_text(&payload);
                tracing::warn!(id = %element.id(), plugin = name, %panic, "plugin panicked");
                metrics::inc_plugin_failures();
                element.add_facet(Facet::Note(Note::error(format!(
                    "plugin {name} panicked: {panic}"
                ))));
            }
        }
    }
}

/// Best-effort extraction of a readable message from a panic payload.
fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
