//! Messages exchanged between a suspended computation and its driver.

use std::fmt;

use crate::continuation::ErasedContinuation;
use crate::effect::PerformedEffect;
use crate::error::VMError;
use crate::ids::ContId;
use crate::value::Value;

/// What a suspension hands to its driver when it stops at a suspension point.
pub enum Message {
    /// `perform` was called inside the thunk.
    Perform(PerformedEffect),
    /// A nested driver found no entry for an effect and passed it outward.
    Escalate(Escalation),
}

/// An effect no handler matched yet, with the continuation that resumes the
/// layer it escaped from.
///
/// The continuation is re-wrapped at every layer it passes through, so the
/// carried effect is always the originally performed one.
pub struct Escalation {
    pub effect: PerformedEffect,
    pub continuation: ErasedContinuation,
    /// The escalating thread only forwards what it is resumed with to its
    /// driver's value handler; the driver may release it.
    pub forwarding: bool,
}

impl Message {
    pub fn effect(&self) -> &PerformedEffect {
        match self {
            Message::Perform(effect) => effect,
            Message::Escalate(escalation) => &escalation.effect,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Perform(_) => "perform",
            Message::Escalate(_) => "escalate",
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("effect", &self.effect().identity)
            .finish()
    }
}

/// Outcome of starting or resuming a suspension.
#[derive(Debug)]
pub enum Yielded {
    Completed(Value),
    Suspended { cont_id: ContId, message: Message },
    Failed(VMError),
}

impl Yielded {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Yielded::Suspended { .. })
    }
}
