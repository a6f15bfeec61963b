//! Core identifier types for the runtime.
//!
//! All IDs are lightweight Copy types using newtype pattern for type safety.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an effect identity.
///
/// Every `Effect::new` / `Effect::derive` allocates a fresh EffectId; identity
/// equality is defined by this value alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EffectId(pub u64);

/// Unique identifier for suspensions (one per `run`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SuspensionId(pub u64);

/// Unique identifier for continuations (one-shot tracking).
///
/// Each suspension point gets a unique ContId; a resume is accepted only when
/// it carries the ContId of the currently pending point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContId(pub u64);

// Global counters for ID generation
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static SUSPENSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static CONT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl EffectId {
    /// Create a fresh unique EffectId.
    pub fn fresh() -> Self {
        EffectId(EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl SuspensionId {
    /// Create a fresh unique SuspensionId.
    pub fn fresh() -> Self {
        SuspensionId(SUSPENSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl ContId {
    /// Create a fresh unique ContId.
    pub fn fresh() -> Self {
        ContId(CONT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

impl fmt::Display for SuspensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "suspension#{}", self.0)
    }
}

impl fmt::Display for ContId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k#{}", self.0)
    }
}
