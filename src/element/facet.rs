//! Typed annotations attached to message elements.
//!
//! A [`Facet`] records one interpretation of an element: that it is a
//! request, that it travelled between a given endpoint pair, that a parser
//! gave up on it, and so on. The set is closed; protocol plugins express
//! everything they learn through these variants plus free-form notes.

use std::{fmt, net::SocketAddr};

use bytes::Bytes;

use super::ElementId;

/// Directional sender/receiver socket-address pair.
///
/// Equality is directional: `A -> B` and `B -> A` are distinct pairs, each
/// owning its own reassembly state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointPair {
    /// Address the bytes were sent from.
    pub sender: SocketAddr,
    /// Address the bytes were delivered to.
    pub receiver: SocketAddr,
}

impl EndpointPair {
    /// Create a new directional pair.
    #[must_use]
    pub const fn new(sender: SocketAddr, receiver: SocketAddr) -> Self {
        Self { sender, receiver }
    }

    /// The opposite direction of the same conversation.
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            sender: self.receiver,
            receiver: self.sender,
        }
    }
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.sender, self.receiver)
    }
}

/// Severity of a diagnostic note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoteSeverity {
    /// Informational annotation.
    Info,
    /// Recoverable problem, e.g. a plugin failure that other plugins survived.
    Warning,
    /// The element could not be fully interpreted.
    Error,
}

/// Free-form diagnostic annotation attached to an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    /// How serious the annotated condition is.
    pub severity: NoteSeverity,
    /// Human-readable description.
    pub text: String,
}

impl Note {
    /// Informational note.
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            severity: NoteSeverity::Info,
            text: text.into(),
        }
    }

    /// Warning-level note.
    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: NoteSeverity::Warning,
            text: text.into(),
        }
    }

    /// Error-level note.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: NoteSeverity::Error,
            text: text.into(),
        }
    }
}

/// One typed interpretation of a message element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Facet {
    /// The element is an application-level request. `expects_reply` drives
    /// exchange pairing; fire-and-forget protocols set it to `false`.
    Request {
        /// Whether a response should be awaited on the reverse direction.
        expects_reply: bool,
    },
    /// The element is an application-level response.
    Response,
    /// Socket addresses the bytes travelled between.
    Endpoints(EndpointPair),
    /// Raw binary payload extracted by a content parser.
    Blob(Bytes),
    /// Diagnostic annotation.
    Note(Note),
    /// Bidirectional link to the other half of an exchange.
    PairedWith(ElementId),
    /// A parser recognised the format but needs more bytes.
    ParsingIncomplete,
}

impl Facet {
    /// Discriminant used for uniqueness bookkeeping.
    #[must_use]
    pub const fn kind(&self) -> FacetKind {
        match self {
            Facet::Request { .. } => FacetKind::Request,
            Facet::Response => FacetKind::Response,
            Facet::Endpoints(_) => FacetKind::Endpoints,
            Facet::Blob(_) => FacetKind::Blob,
            Facet::Note(_) => FacetKind::Note,
            Facet::PairedWith(_) => FacetKind::PairedWith,
            Facet::ParsingIncomplete => FacetKind::ParsingIncomplete,
        }
    }
}

/// Variant discriminant of a [`Facet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FacetKind {
    /// See [`Facet::Request`].
    Request,
    /// See [`Facet::Response`].
    Response,
    /// See [`Facet::Endpoints`].
    Endpoints,
    /// See [`Facet::Blob`].
    Blob,
    /// See [`Facet::Note`].
    Note,
    /// See [`Facet::PairedWith`].
    PairedWith,
    /// See [`Facet::ParsingIncomplete`].
    ParsingIncomplete,
}

impl FacetKind {
    /// Whether an element may carry at most one facet of this kind.
    ///
    /// Adding a second unique facet replaces the first rather than
    /// accumulating contradictory interpretations.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        !matches!(self, FacetKind::Blob | FacetKind::Note)
    }
}
