//! Conversion phase state machine for message elements.
//!
//! Phases advance strictly forward through the pipeline; the only side exit
//! is the deletion path, reachable from any non-terminal phase when a plugin
//! asks for the in-flight message to be discarded.

use std::fmt;

use thiserror::Error;

/// Stage of the conversion pipeline a [`MessageElement`](super::MessageElement)
/// has reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionPhase {
    /// Initial state before any plugin has run.
    Unparsed,
    /// Normalisation and metadata stamping before protocol parsing.
    Preparation,
    /// Message-boundary and protocol-structure parsing.
    ProtocolParsing,
    /// Parsing of carried content (bodies, payload encodings).
    ContentParsing,
    /// Cross-referencing and annotation of already-parsed content.
    ContentEnrichment,
    /// Final pass before the element is handed to listeners.
    Transmission,
    /// Terminal state for a fully converted element.
    Completed,
    /// Cleanup pass running after a plugin requested deletion.
    Deletion,
    /// Terminal state for a discarded element.
    Deleted,
}

impl ConversionPhase {
    /// The ordered pipeline phases an executor runs by default.
    pub const PIPELINE: [ConversionPhase; 5] = [
        ConversionPhase::Preparation,
        ConversionPhase::ProtocolParsing,
        ConversionPhase::ContentParsing,
        ConversionPhase::ContentEnrichment,
        ConversionPhase::Transmission,
    ];

    /// Whether this phase is terminal (no further plugin may run).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ConversionPhase::Completed | ConversionPhase::Deleted)
    }

    /// Total order used when sorting plugins by phase. Deletion-phase
    /// plugins sort after the forward pipeline.
    pub(crate) const fn ordering_key(self) -> u8 {
        match self {
            ConversionPhase::Unparsed => 0,
            ConversionPhase::Preparation => 1,
            ConversionPhase::ProtocolParsing => 2,
            ConversionPhase::ContentParsing => 3,
            ConversionPhase::ContentEnrichment => 4,
            ConversionPhase::Transmission => 5,
            ConversionPhase::Completed => 6,
            ConversionPhase::Deletion => 7,
            ConversionPhase::Deleted => 8,
        }
    }

    /// Position within the forward pipeline, if the phase is on it.
    const fn rank(self) -> Option<u8> {
        match self {
            ConversionPhase::Unparsed => Some(0),
            ConversionPhase::Preparation => Some(1),
            ConversionPhase::ProtocolParsing => Some(2),
            ConversionPhase::ContentParsing => Some(3),
            ConversionPhase::ContentEnrichment => Some(4),
            ConversionPhase::Transmission => Some(5),
            ConversionPhase::Completed => Some(6),
            ConversionPhase::Deletion | ConversionPhase::Deleted => None,
        }
    }

    /// Whether a transition from `self` to `next` is permitted.
    ///
    /// Forward moves may skip intermediate phases (an executor can be asked
    /// to run a subset of the pipeline), but never go backwards or leave a
    /// terminal state.
    #[must_use]
    pub fn can_advance_to(self, next: ConversionPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ConversionPhase::Deletion => true,
            ConversionPhase::Deleted => self == ConversionPhase::Deletion,
            ConversionPhase::Unparsed => false,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                // the only non-ranked current state is `Deletion`, which may
                // not rejoin the forward pipeline
                _ => false,
            },
        }
    }
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionPhase::Unparsed => "unparsed",
            ConversionPhase::Preparation => "preparation",
            ConversionPhase::ProtocolParsing => "protocol-parsing",
            ConversionPhase::ContentParsing => "content-parsing",
            ConversionPhase::ContentEnrichment => "content-enrichment",
            ConversionPhase::Transmission => "transmission",
            ConversionPhase::Completed => "completed",
            ConversionPhase::Deletion => "deletion",
            ConversionPhase::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Error raised when a phase transition would violate forward-only ordering.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid phase transition: {from} -> {to}")]
pub struct PhaseError {
    /// Phase the element was in.
    pub from: ConversionPhase,
    /// Phase the caller attempted to move to.
    pub to: ConversionPhase,
}
