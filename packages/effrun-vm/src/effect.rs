//! Effect identities, typed effect handles, and performed-effect messages.
//!
//! Identities form a forest: each identity may have a single parent, fixed
//! when it is created. A handler registered for an identity also catches every
//! descendant of it, with the nearest registered ancestor winning.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::VMError;
use crate::ids::EffectId;
use crate::suspension;
use crate::value::Value;
use crate::yielded::Message;

#[derive(Debug)]
struct IdentityNode {
    id: EffectId,
    name: Option<Arc<str>>,
    parent: Option<EffectIdentity>,
}

/// Opaque, globally unique effect token.
///
/// Equality and hashing use the id only, never the name or parent.
#[derive(Clone)]
pub struct EffectIdentity(Arc<IdentityNode>);

impl EffectIdentity {
    pub fn new(parent: Option<&EffectIdentity>) -> Self {
        Self::build(None, parent)
    }

    pub fn named(name: impl Into<String>, parent: Option<&EffectIdentity>) -> Self {
        Self::build(Some(Arc::from(name.into())), parent)
    }

    fn build(name: Option<Arc<str>>, parent: Option<&EffectIdentity>) -> Self {
        EffectIdentity(Arc::new(IdentityNode {
            id: EffectId::fresh(),
            name,
            parent: parent.cloned(),
        }))
    }

    pub fn id(&self) -> EffectId {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn parent(&self) -> Option<&EffectIdentity> {
        self.0.parent.as_ref()
    }

    /// Walk the parent chain, starting with `self`.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Reflexive: an identity is its own descendant.
    pub fn is_descendant_of(&self, ancestor: &EffectIdentity) -> bool {
        self.distance_to(ancestor).is_some()
    }

    /// Number of parent links from `self` up to `ancestor`, if it is one.
    pub fn distance_to(&self, ancestor: &EffectIdentity) -> Option<usize> {
        self.ancestors().position(|candidate| candidate == ancestor)
    }

    /// Number of ancestors above this identity (roots have depth 0).
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a EffectIdentity>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a EffectIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

impl PartialEq for EffectIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for EffectIdentity {}

impl Hash for EffectIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for EffectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectIdentity")
            .field("id", &self.0.id.raw())
            .field("name", &self.0.name)
            .field("parent", &self.parent().map(EffectIdentity::id))
            .finish()
    }
}

impl fmt::Display for EffectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0.id),
            None => write!(f, "{}", self.0.id),
        }
    }
}

/// A typed effect: performing it with an `A` suspends the computation until a
/// handler resumes it with an `R`.
pub struct Effect<A, R> {
    identity: EffectIdentity,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A, R> Effect<A, R> {
    pub fn identity(&self) -> &EffectIdentity {
        &self.identity
    }
}

impl<A, R> Effect<A, R>
where
    A: Any + Send,
    R: Any + Send,
{
    pub fn new() -> Self {
        Self::from_identity(EffectIdentity::new(None))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_identity(EffectIdentity::named(name, None))
    }

    fn from_identity(identity: EffectIdentity) -> Self {
        Effect {
            identity,
            _signature: PhantomData,
        }
    }

    /// Create a sub-effect: handlers registered for `self` also catch it.
    pub fn derive(&self) -> Self {
        Self::from_identity(EffectIdentity::new(Some(&self.identity)))
    }

    pub fn derive_named(&self, name: impl Into<String>) -> Self {
        Self::from_identity(EffectIdentity::named(name, Some(&self.identity)))
    }

    /// Send this effect to the nearest enclosing handler and wait for the
    /// value it resumes with.
    pub fn try_perform(&self, args: A) -> Result<R, VMError> {
        let performed = PerformedEffect::new(self.identity.clone(), Value::new(args));
        crate::vm_debug_log!("perform {}", self.identity);
        match suspension::suspend(Message::Perform(performed)) {
            Ok(resumed) => resumed.downcast::<R>(),
            Err(_) => Err(VMError::no_active_suspension(self.identity.to_string())),
        }
    }

    /// Like [`Effect::try_perform`], for code that is known to run under a handler.
    ///
    /// # Panics
    ///
    /// Panics when there is no enclosing `run` or the resumed value has the
    /// wrong type.
    pub fn perform(&self, args: A) -> R {
        match self.try_perform(args) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<A, R> Default for Effect<A, R>
where
    A: Any + Send,
    R: Any + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Clone for Effect<A, R> {
    fn clone(&self) -> Self {
        Effect {
            identity: self.identity.clone(),
            _signature: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Effect<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Effect").field(&self.identity).finish()
    }
}

/// An effect as it travels from `perform` to a driver.
#[derive(Debug)]
pub struct PerformedEffect {
    pub identity: EffectIdentity,
    pub args: Value,
}

impl PerformedEffect {
    pub fn new(identity: EffectIdentity, args: Value) -> Self {
        PerformedEffect { identity, args }
    }
}
