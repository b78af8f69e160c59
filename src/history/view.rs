//! Read-only history view that waits for conversion to finish.
//!
//! Every accessor suspends, bounded by the history's wait timeout, until
//! the elements it is about to expose have reached a terminal conversion
//! phase. The view offers no mutating operations; callers needing removal
//! or admission go through [`MessageHistory`] directly.

use super::{MessageHistory, SharedElement, WaitError};
use crate::element::ElementId;

/// Synchronous-semantics view over a [`MessageHistory`].
pub struct CompleteView<'a> {
    history: &'a MessageHistory,
}

impl<'a> CompleteView<'a> {
    pub(super) fn new(history: &'a MessageHistory) -> Self { Self { history } }

    /// The oldest retained element, fully converted.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] when the element does not reach a terminal
    /// phase within the wait bound.
    pub async fn first(&self) -> Result<Option<SharedElement>, WaitError> {
        let Some(element) = self.history.snapshot().into_iter().next() else {
            return Ok(None);
        };
        self.history.wait_terminal(&element).await?;
        Ok(Some(element))
    }

    /// The newest retained element, fully converted.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] when the element does not reach a terminal
    /// phase within the wait bound.
    pub async fn last(&self) -> Result<Option<SharedElement>, WaitError> {
        let Some(element) = self.history.snapshot().into_iter().next_back() else {
            return Ok(None);
        };
        self.history.wait_terminal(&element).await?;
        Ok(Some(element))
    }

    /// Look up an element by identifier, waiting for its conversion.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] when the element does not reach a terminal
    /// phase within the wait bound.
    pub async fn get(&self, id: &ElementId) -> Result<Option<SharedElement>, WaitError> {
        let Some(element) = self.history.get(id) else {
            return Ok(None);
        };
        self.history.wait_terminal(&element).await?;
        Ok(Some(element))
    }

    /// Membership test that first waits for the element's conversion, so a
    /// positive answer always refers to a finished element.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] when the element does not reach a terminal
    /// phase within the wait bound.
    pub async fn contains(&self, id: &ElementId) -> Result<bool, WaitError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Sequence-ordered listing of all retained elements, each fully
    /// converted before the listing is returned.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] for the first element that does not reach a
    /// terminal phase within the wait bound.
    pub async fn all(&self) -> Result<Vec<SharedElement>, WaitError> {
        let elements = self.history.snapshot();
        for element in &elements {
            self.history.wait_terminal(element).await?;
        }
        Ok(elements)
    }
}
