//! Cancellation tokens for background computations.
//!
//! A [`GenerationTracker`] hands out monotonically increasing generation
//! numbers. Every computation receives a [`CancellationToken`] bound to the
//! generation it was started for; the token reports cancellation as soon as
//! a newer generation has been issued. Cancellation is cooperative: the
//! computation polls the token and winds down on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks the active generation for cancellation.
///
/// Call `next_generation()` to start a new computation. Tokens created for
/// older generations report themselves cancelled from then on.
#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    active_generation: Arc<AtomicU64>,
}

impl GenerationTracker {
    /// Creates a new tracker at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active generation and returns the new value.
    ///
    /// This invalidates every token handed out for older generations.
    pub fn next_generation(&self) -> u64 {
        self.active_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current active generation without incrementing.
    pub fn current_generation(&self) -> u64 {
        self.active_generation.load(Ordering::SeqCst)
    }

    /// Returns true if `generation` is still the active one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Creates a cancellation token for the given generation.
    pub fn token_for(&self, generation: u64) -> CancellationToken {
        CancellationToken {
            active_generation: Some(self.active_generation.clone()),
            generation,
        }
    }
}

/// A cancellation token for terminating long-running operations.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    /// Shared counter holding the active generation. `None` for noop tokens.
    active_generation: Option<Arc<AtomicU64>>,
    /// The generation this token was created with.
    generation: u64,
}

impl CancellationToken {
    /// Creates a cancellation token that is never cancelled.
    ///
    /// Useful for tests or operations that should not be interruptible.
    pub fn noop() -> Self {
        Self {
            active_generation: None,
            generation: 0,
        }
    }

    /// Returns the generation this token belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true once a newer generation has been started.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.active_generation {
            Some(active) => active.load(Ordering::Relaxed) != self.generation,
            None => false,
        }
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn check(&self) -> Option<()> {
        if self.is_cancelled() {
            None
        } else {
            Some(())
        }
    }
}

impl Default for CancellationToken {
    /// Default creates a noop token that is never cancelled.
    fn default() -> Self {
        Self::noop()
    }
}
