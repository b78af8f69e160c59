//! Message elements: the parsed-tree node type produced by conversion.
//!
//! A [`MessageElement`] pairs an immutable raw byte range with a growing set
//! of [`Facet`] annotations and a forward-only [`ConversionPhase`] marker.
//! Elements form a tree: a parent owns its children outright and children
//! refer back to the parent by identifier only.

mod facet;
mod phase;
#[cfg(test)]
mod tests;

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use derive_more::{Display, From, Into};

pub use facet::{EndpointPair, Facet, FacetKind, Note, NoteSeverity};
pub use phase::{ConversionPhase, PhaseError};

/// Identifier assigned to a message element.
///
/// Blank identifiers (empty or whitespace-only) opt out of deduplication.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("{_0}")]
pub struct ElementId(String);

impl ElementId {
    /// Create a new identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }

    /// Whether this identifier opts out of deduplication.
    #[must_use]
    pub fn is_blank(&self) -> bool { self.0.trim().is_empty() }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

/// Monotonic position of an element within the message history.
///
/// Sequence numbers are never reused, even after eviction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into,
)]
#[display("{_0}")]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Create a sequence number from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self { Self(value) }

    /// Return the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

/// One node of the parsed message tree.
#[derive(Debug)]
pub struct MessageElement {
    id: ElementId,
    parent: Option<ElementId>,
    previous: Option<ElementId>,
    raw: Bytes,
    facets: Vec<Facet>,
    phase: ConversionPhase,
    sequence: Option<SequenceNumber>,
    elapsed: Option<Duration>,
    metadata: HashMap<String, String>,
    children: Vec<MessageElement>,
}

impl MessageElement {
    /// Create an element in the `unparsed` phase wrapping `raw`.
    #[must_use]
    pub fn new(id: ElementId, raw: Bytes) -> Self {
        Self {
            id,
            parent: None,
            previous: None,
            raw,
            facets: Vec::new(),
            phase: ConversionPhase::Unparsed,
            sequence: None,
            elapsed: None,
            metadata: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Set the causal predecessor emitted on the same connection direction.
    #[must_use]
    pub fn with_previous(mut self, previous: Option<ElementId>) -> Self {
        self.previous = previous;
        self
    }

    /// Attach admission-time metadata (timestamps, hostnames, custom flags).
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identifier of this element.
    #[must_use]
    pub fn id(&self) -> &ElementId { &self.id }

    /// Identifier of the owning parent element, if this is a child node.
    #[must_use]
    pub fn parent(&self) -> Option<&ElementId> { self.parent.as_ref() }

    /// Identifier of the previous message on the same connection direction.
    #[must_use]
    pub fn previous(&self) -> Option<&ElementId> { self.previous.as_ref() }

    /// The raw bytes this element was carved from. Fixed once the element
    /// is exposed to readers.
    #[must_use]
    pub fn raw(&self) -> &Bytes { &self.raw }

    /// Length of the raw byte range.
    #[must_use]
    pub fn byte_len(&self) -> usize { self.raw.len() }

    /// Admission-time metadata map.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, String> { &self.metadata }

    /// All facets in attachment order.
    #[must_use]
    pub fn facets(&self) -> &[Facet] { &self.facets }

    /// Attach a facet. Unique-kind facets replace any existing facet of the
    /// same kind; repeatable kinds accumulate.
    pub fn add_facet(&mut self, facet: Facet) {
        let kind = facet.kind();
        if kind.is_unique()
            && let Some(existing) = self.facets.iter_mut().find(|f| f.kind() == kind)
        {
            *existing = facet;
            return;
        }
        self.facets.push(facet);
    }

    /// First facet of the given kind, if any.
    #[must_use]
    pub fn facet_of(&self, kind: FacetKind) -> Option<&Facet> {
        self.facets.iter().find(|f| f.kind() == kind)
    }

    /// All diagnostic notes attached so far.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.facets.iter().filter_map(|f| match f {
            Facet::Note(note) => Some(note),
            _ => None,
        })
    }

    /// The endpoint pair this element travelled between, if stamped.
    #[must_use]
    pub fn endpoints(&self) -> Option<EndpointPair> {
        match self.facet_of(FacetKind::Endpoints) {
            Some(Facet::Endpoints(pair)) => Some(*pair),
            _ => None,
        }
    }

    /// Identifier of the paired exchange half, if pairing has linked one.
    #[must_use]
    pub fn pair_link(&self) -> Option<&ElementId> {
        match self.facet_of(FacetKind::PairedWith) {
            Some(Facet::PairedWith(id)) => Some(id),
            _ => None,
        }
    }

    /// Whether this element is a request awaiting a reply.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        matches!(
            self.facet_of(FacetKind::Request),
            Some(Facet::Request {
                expects_reply: true
            })
        )
    }

    /// Current conversion phase.
    #[must_use]
    pub fn phase(&self) -> ConversionPhase { self.phase }

    /// Advance the phase marker.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] when the transition would move backwards,
    /// leave a terminal state, or re-enter the pipeline from deletion.
    pub fn advance_to(&mut self, next: ConversionPhase) -> Result<(), PhaseError> {
        if self.phase.can_advance_to(next) {
            self.phase = next;
            Ok(())
        } else {
            Err(PhaseError {
                from: self.phase,
                to: next,
            })
        }
    }

    /// History sequence number, assigned at admission.
    #[must_use]
    pub fn sequence(&self) -> Option<SequenceNumber> { self.sequence }

    pub(crate) fn assign_sequence(&mut self, sequence: SequenceNumber) {
        debug_assert!(self.sequence.is_none(), "sequence assigned twice");
        self.sequence = Some(sequence);
    }

    /// Wall time the conversion pipeline spent on this element.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> { self.elapsed }

    pub(crate) fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }

    /// Narrow the raw range to the carved prefix. Called while the element
    /// is still write-locked, before any reader sees it.
    pub(crate) fn retain_raw_prefix(&mut self, len: usize) { self.raw.truncate(len); }

    /// Append a child node, taking sole ownership of it.
    pub fn push_child(&mut self, mut child: MessageElement) {
        child.parent = Some(self.id.clone());
        self.children.push(child);
    }

    /// Child nodes in attachment order.
    #[must_use]
    pub fn children(&self) -> &[MessageElement] { &self.children }
}
