//! Handler dispatch table: effect identity -> handler function.
//!
//! Lookup is subtype-aware. The performed identity's parent chain is walked
//! from the identity itself upward and the first registered identity wins, so
//! the most specific registered ancestor is always chosen. Because each
//! identity has a single parent, two matches can never be equally specific.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::continuation::RawContinuation;
use crate::effect::EffectIdentity;
use crate::error::VMError;
use crate::ids::EffectId;
use crate::value::Value;

pub(crate) type HandlerFn<U> =
    Arc<dyn Fn(RawContinuation<U>, Value) -> Result<U, VMError> + Send + Sync>;

pub struct HandlerEntry<U> {
    pub identity: EffectIdentity,
    pub(crate) func: HandlerFn<U>,
}

impl<U> Clone for HandlerEntry<U> {
    fn clone(&self) -> Self {
        HandlerEntry {
            identity: self.identity.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<U> fmt::Debug for HandlerEntry<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

pub struct HandlerTable<U> {
    entries: IndexMap<EffectId, HandlerEntry<U>>,
}

impl<U> HandlerTable<U> {
    pub fn new() -> Self {
        HandlerTable {
            entries: IndexMap::new(),
        }
    }

    /// Register `func` for exactly `identity`, replacing any previous entry
    /// for it. Entries for descendants are untouched.
    pub(crate) fn insert(
        &mut self,
        identity: EffectIdentity,
        func: HandlerFn<U>,
    ) -> Option<HandlerEntry<U>> {
        let id = identity.id();
        self.entries.insert(id, HandlerEntry { identity, func })
    }

    /// The entry for the nearest registered ancestor of `identity` (itself included).
    pub fn lookup(&self, identity: &EffectIdentity) -> Option<&HandlerEntry<U>> {
        identity
            .ancestors()
            .find_map(|candidate| self.entries.get(&candidate.id()))
    }

    pub fn handles(&self, identity: &EffectIdentity) -> bool {
        self.lookup(identity).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identities in registration order.
    pub fn identities(&self) -> impl Iterator<Item = &EffectIdentity> {
        self.entries.values().map(|entry| &entry.identity)
    }
}

impl<U> Default for HandlerTable<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Clone for HandlerTable<U> {
    fn clone(&self) -> Self {
        HandlerTable {
            entries: self.entries.clone(),
        }
    }
}

impl<U> fmt::Debug for HandlerTable<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.identities()).finish()
    }
}
