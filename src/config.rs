//! Configuration surface consumed by the reassembly core.

use std::{
    num::{NonZeroU64, NonZeroUsize},
    time::Duration,
};

/// How much completed history the [`MessageHistory`](crate::history::MessageHistory)
/// may retain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Size-based eviction disabled; history grows without bound.
    Unbounded,
    /// Retain nothing beyond the in-flight window: every admission is
    /// followed by a full clear.
    Zero,
    /// Evict oldest-first once total retained bytes exceed the limit.
    Bytes(NonZeroU64),
}

impl CapacityPolicy {
    /// Interpret an operator-supplied megabyte count: negative disables
    /// size-based eviction, zero disables retention, positive bounds it.
    #[must_use]
    pub fn from_megabytes(megabytes: i64) -> Self {
        if megabytes < 0 {
            return CapacityPolicy::Unbounded;
        }
        #[allow(clippy::cast_sign_loss)]
        NonZeroU64::new(megabytes as u64 * 1024 * 1024)
            .map_or(CapacityPolicy::Zero, CapacityPolicy::Bytes)
    }
}

/// Tunables for the reassembly and conversion core.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Retention bound applied by history eviction.
    pub capacity: CapacityPolicy,
    /// Elements larger than this are skipped by plugins that opt out of
    /// oversized content. `None` disables the skip.
    pub oversized_threshold: Option<NonZeroUsize>,
    /// Parser identifiers activating optional plugins.
    pub parser_selector: Vec<String>,
    /// Upper bound on how long a complete-view reader waits for an
    /// in-flight element before failing loudly.
    pub history_wait_timeout: Duration,
    /// Whether reassemblers publish raw, not-yet-parsed chunks to history
    /// in addition to carved messages.
    pub publish_raw_chunks: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            capacity: CapacityPolicy::Unbounded,
            oversized_threshold: None,
            parser_selector: Vec::new(),
            history_wait_timeout: Duration::from_secs(100),
            publish_raw_chunks: false,
        }
    }
}
