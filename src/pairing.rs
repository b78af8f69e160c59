//! Exchange pairing: correlates requests with responses and publishes both.
//!
//! Sits above the demultiplexer. The request half converts first; its
//! facets decide whether a reply is expected at all. Fire-and-forget
//! requests publish immediately as unpaired. Otherwise the handler
//! suspends on the transport's response future, converts the reply on the
//! reverse direction, links both halves with bidirectional pairing facets,
//! and publishes each element to every listener exactly once. Transport
//! failures are classified: connection resets are expected noise, anything
//! else is surfaced as a warning.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::{
    element::{ElementId, Facet},
    history::SharedElement,
    reassembly::{BufferedEntry, MultiConnectionDemultiplexer},
};

/// Failure delivering the response half of an exchange.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The peer reset the connection. Expected during normal shutdown.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// The connection closed before a response arrived. Expected.
    #[error("connection closed")]
    ConnectionClosed,
    /// The transport's own response deadline elapsed.
    #[error("timed out waiting for response")]
    TimedOut,
    /// Any other I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the failure is expected connection churn rather than a
    /// problem worth warning about.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionReset | TransportError::ConnectionClosed
        )
    }
}

/// Future the transport layer supplies for the response fragment.
pub type ResponseFuture = BoxFuture<'static, Result<BufferedEntry, TransportError>>;

/// Downstream consumer notified once per fully processed element.
#[async_trait]
pub trait ExchangeListener: Send + Sync {
    /// Called exactly once per published element. `paired` is `true` when
    /// the element carries a pairing facet to its exchange partner.
    async fn on_published(&self, element: SharedElement, paired: bool);
}

/// Correlates and publishes request/response exchanges.
pub struct ExchangePairingHandler {
    demux: Arc<MultiConnectionDemultiplexer>,
    listeners: Vec<Arc<dyn ExchangeListener>>,
    silence_benign_errors: bool,
}

impl ExchangePairingHandler {
    /// Create a handler publishing through `demux`.
    #[must_use]
    pub fn new(demux: Arc<MultiConnectionDemultiplexer>) -> Self {
        Self {
            demux,
            listeners: Vec::new(),
            silence_benign_errors: false,
        }
    }

    /// Subscribe a listener to published elements.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ExchangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Suppress even the debug-level log for benign transport failures.
    #[must_use]
    pub fn silence_benign_errors(mut self) -> Self {
        self.silence_benign_errors = true;
        self
    }

    /// Process one exchange end to end.
    ///
    /// Converts the request, optionally awaits and converts the response,
    /// links the halves when both succeeded, and publishes whatever is
    /// available. Missing halves are never an error: the present half is
    /// published unpaired.
    pub async fn handle_exchange(
        &self,
        request: BufferedEntry,
        response: Option<ResponseFuture>,
    ) {
        let Some(request_element) = last_carved(self.demux.buffer(request).await) else {
            tracing::debug!("request fragment carved no message");
            // the response half may still carve on its own
            if let Some(response) = response
                && let Some(response_element) = self.resolve_response(response).await
            {
                self.publish(response_element, false).await;
            }
            return;
        };

        let expects_reply = request_element.read().await.expects_reply();
        if !expects_reply {
            self.publish(request_element, false).await;
            return;
        }
        let Some(response) = response else {
            tracing::debug!("reply expected but transport offered no response future");
            self.publish(request_element, false).await;
            return;
        };

        if let Some(response_element) = self.resolve_response(response).await {
            self.link_pair(&request_element, &response_element).await;
            self.publish(request_element, true).await;
            self.publish(response_element, true).await;
        } else {
            self.publish(request_element, false).await;
        }
    }

    /// Await the transport's response future and carve the reply,
    /// classifying transport failures.
    async fn resolve_response(&self, response: ResponseFuture) -> Option<SharedElement> {
        match response.await {
            Ok(entry) => {
                let carved = last_carved(self.demux.buffer(entry).await);
                if carved.is_none() {
                    tracing::debug!("response fragment carved no message");
                }
                carved
            }
            Err(err) if err.is_benign() => {
                if !self.silence_benign_errors {
                    tracing::debug!(%err, "response transport closed");
                }
                None
            }
            Err(err) => {
                tracing::warn!(%err, "response transport failed");
                None
            }
        }
    }

    /// Attach bidirectional pairing facets to both halves.
    async fn link_pair(&self, request: &SharedElement, response: &SharedElement) {
        let request_id: ElementId = request.read().await.id().clone();
        let response_id: ElementId = response.read().await.id().clone();
        request
            .write()
            .await
            .add_facet(Facet::PairedWith(response_id));
        response
            .write()
            .await
            .add_facet(Facet::PairedWith(request_id));
    }

    async fn publish(&self, element: SharedElement, paired: bool) {
        for listener in &self.listeners {
            listener.on_published(Arc::clone(&element), paired).await;
        }
    }
}

/// The newest message carved from a fragment, when any.
fn last_carved(mut carved: Vec<SharedElement>) -> Option<SharedElement> { carved.pop() }
