//! Handlers: effect tables plus a value handler, and the run/resume protocol.
//!
//! # Protocol
//!
//! `run` starts the thunk in a fresh [`Suspension`] and loops:
//!
//! - **Completed** - the value handler is applied. This is the only place it is.
//! - **Perform** - the nearest registered ancestor's function is called with a
//!   continuation for the suspension; its result is the result of the run.
//! - **Escalate** - a nested run had no entry for the effect. If this table
//!   matches, the function receives a *rehandling* continuation (see below).
//! - **No match** - the effect is escalated to whatever drives the current
//!   thread, or reported as unhandled at the outermost run.
//! - **Failed** - the error propagates; no handler sees it.
//!
//! # Rehandling
//!
//! An escalated effect is resolved by an outer handler while the computation
//! that raised it still lives under the nested handler. Resuming it with the
//! lower continuation alone would lose this handler's interception for any
//! effect performed afterwards, because the lower continuation now runs on
//! the outer handler's stack rather than inside this handler's suspension.
//! The rehandling continuation therefore runs the lower continuation under a
//! fresh handler holding a copy of this table, whose value handler resumes
//! this handler's own suspension with the nested run's result.
//!
//! When such a copy receives a further escalation from its own thunk and that
//! thunk has nothing left to do but forward the result, the copy's thread is
//! released and the next copy reports straight to the copy's value handler.
//! A long-lived nested run escalating repeatedly therefore keeps a constant
//! number of threads alive.
//!
//! # Stack use
//!
//! A resumed continuation returns only when the rest of the computation has
//! finished, so each effect handled by resuming nests one more handler
//! function call on the driving thread. `handle` grows that stack on demand.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::continuation::{Continuation, ErasedContinuation, RawContinuation};
use crate::dispatch::{HandlerFn, HandlerTable};
use crate::effect::{Effect, EffectIdentity, PerformedEffect};
use crate::error::VMError;
use crate::ids::ContId;
use crate::suspension::{self, CallbackFrame, Suspension, Thunk};
use crate::value::Value;
use crate::yielded::{Escalation, Message, Yielded};

type ValueHandlerFn<U> = Arc<dyn Fn(Value) -> Result<U, VMError> + Send + Sync>;

/// Stack that must remain before another protocol step is entered.
const RED_ZONE: usize = 128 * 1024;
/// Size of each stack segment allocated once the red zone is reached.
const STACK_GROWTH: usize = 2 * 1024 * 1024;

/// The untyped state shared by a handler and the copies made while rehandling.
struct HandlerCore<U> {
    table: Arc<HandlerTable<U>>,
    value_handler: ValueHandlerFn<U>,
}

impl<U> Clone for HandlerCore<U> {
    fn clone(&self) -> Self {
        HandlerCore {
            table: Arc::clone(&self.table),
            value_handler: Arc::clone(&self.value_handler),
        }
    }
}

impl<U: Any + Send> HandlerCore<U> {
    fn run(&self, thunk: Thunk) -> Result<U, VMError> {
        let suspension = Arc::new(Suspension::new(thunk));
        log::debug!(
            "run {} under {} handler entries",
            suspension.id(),
            self.table.len()
        );
        let step = suspension.start()?;
        self.handle(suspension, step)
    }

    fn continue_with(
        &self,
        suspension: Arc<Suspension>,
        cont_id: ContId,
        value: Value,
    ) -> Result<U, VMError> {
        let step = suspension.resume(cont_id, value)?;
        self.handle(suspension, step)
    }

    /// Continuation that resumes `suspension` at `cont_id` and keeps handling it here.
    fn capture(&self, suspension: Arc<Suspension>, cont_id: ContId) -> RawContinuation<U> {
        let core = self.clone();
        RawContinuation::new(cont_id, move |value| {
            core.continue_with(suspension, cont_id, value)
        })
    }

    fn handle(&self, suspension: Arc<Suspension>, step: Yielded) -> Result<U, VMError> {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || self.dispatch(suspension, step))
    }

    fn dispatch(&self, suspension: Arc<Suspension>, step: Yielded) -> Result<U, VMError> {
        match step {
            Yielded::Completed(value) => {
                crate::vm_debug_log!(
                    target: "effrun_vm::handler",
                    "{} completed",
                    suspension.id()
                );
                (self.value_handler)(value)
            }
            Yielded::Failed(err) => {
                log::debug!("{} failed: {err}", suspension.id());
                Err(err)
            }
            Yielded::Suspended {
                cont_id,
                message: Message::Perform(effect),
            } => {
                let k = self.capture(suspension, cont_id);
                match self.find(&effect.identity) {
                    Some(func) => func(k, effect.args),
                    None => self.escalate(effect, k.erase()),
                }
            }
            Yielded::Suspended {
                cont_id,
                message: Message::Escalate(escalation),
            } => {
                let Escalation {
                    effect,
                    continuation,
                    forwarding,
                } = escalation;
                let next_k = if forwarding {
                    // Only our value handler is waiting on that thread.
                    drop(suspension);
                    self.forward(continuation)
                } else {
                    self.rehandle(suspension, cont_id, continuation)
                };
                match self.find(&effect.identity) {
                    Some(func) => func(next_k, effect.args),
                    None => self.escalate(effect, next_k.erase()),
                }
            }
        }
    }

    fn find(&self, identity: &EffectIdentity) -> Option<HandlerFn<U>> {
        let entry = self.table.lookup(identity)?;
        log::trace!("dispatch {} -> entry for {}", identity, entry.identity);
        Some(Arc::clone(&entry.func))
    }

    /// Pass an unmatched effect to whatever drives the current thread. The
    /// value we are resumed with is this run's result.
    fn escalate(
        &self,
        effect: PerformedEffect,
        continuation: ErasedContinuation,
    ) -> Result<U, VMError> {
        crate::vm_debug_log!(target: "effrun_vm::handler", "escalate {}", effect.identity);
        let message = Message::Escalate(Escalation {
            effect,
            continuation,
            forwarding: suspension::in_forwarding_tail(),
        });
        match suspension::suspend(message) {
            Ok(resumed) => resumed.downcast::<U>(),
            Err(message) => {
                let effect = message.effect().identity.to_string();
                log::debug!("effect {effect} reached the outermost run unhandled");
                Err(VMError::unhandled_effect(effect))
            }
        }
    }

    fn rehandle(
        &self,
        suspension: Arc<Suspension>,
        cont_id: ContId,
        lower: ErasedContinuation,
    ) -> RawContinuation<U> {
        let outer = self.clone();
        RawContinuation::new(lower.id(), move |value| {
            let table = Arc::clone(&outer.table);
            let value_handler: ValueHandlerFn<U> = Arc::new(move |finished: Value| {
                let nested_result = finished.downcast::<Result<Value, VMError>>()??;
                outer.continue_with(Arc::clone(&suspension), cont_id, nested_result)
            });
            let copy = HandlerCore {
                table,
                value_handler,
            };
            copy.run_forwarding(lower, value)
        })
    }

    /// Like `rehandle` for an escalation from this copy's own thunk: the
    /// lower continuation runs under a clone of `self`, so its result reaches
    /// the value handler the released thunk would have handed it to.
    fn forward(&self, lower: ErasedContinuation) -> RawContinuation<U> {
        let copy = self.clone();
        RawContinuation::new(lower.id(), move |value| copy.run_forwarding(lower, value))
    }

    fn run_forwarding(&self, lower: ErasedContinuation, value: Value) -> Result<U, VMError> {
        self.run(Box::new(move || {
            suspension::mark_forwarding_root();
            Value::new(lower.call(value))
        }))
    }
}

/// A first-class effect handler.
///
/// `T` is the result type of the computations it runs, `U` the result type of
/// `run` (the value handler maps `T` to `U`; effect functions produce `U`).
/// Cloning is cheap and a handler can be reused for any number of runs; each
/// run sees the entries registered at the time it started.
pub struct Handler<T, U = T> {
    core: HandlerCore<U>,
    _input: PhantomData<fn(T)>,
}

impl<T: Any + Send> Handler<T, T> {
    /// An empty handler whose value handler is the identity.
    pub fn new() -> Self {
        Self::try_with_value_handler(Ok)
    }
}

impl<T: Any + Send> Default for Handler<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, U> Handler<T, U>
where
    T: Any + Send,
    U: Any + Send,
{
    pub fn with_value_handler<F>(f: F) -> Self
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Self::try_with_value_handler(move |value| Ok(f(value)))
    }

    pub fn try_with_value_handler<F>(f: F) -> Self
    where
        F: Fn(T) -> Result<U, VMError> + Send + Sync + 'static,
    {
        Handler {
            core: HandlerCore {
                table: Arc::new(HandlerTable::new()),
                value_handler: Self::erase_value_handler(f),
            },
            _input: PhantomData,
        }
    }

    fn erase_value_handler<F>(f: F) -> ValueHandlerFn<U>
    where
        F: Fn(T) -> Result<U, VMError> + Send + Sync + 'static,
    {
        Arc::new(move |value: Value| {
            let value = value.downcast::<T>()?;
            let _frame = CallbackFrame::enter();
            f(value)
        })
    }

    /// Register `f` for `effect` and all of its derived effects, replacing any
    /// previous function for exactly this effect.
    ///
    /// `f` may be re-entered before an earlier call returns (for instance when
    /// the resumed computation performs the same effect again), so it is `Fn`.
    pub fn on<A, R, F>(mut self, effect: &Effect<A, R>, f: F) -> Self
    where
        A: Any + Send,
        R: Any + Send,
        F: Fn(Continuation<R, U>, A) -> Result<U, VMError> + Send + Sync + 'static,
    {
        let func: HandlerFn<U> = Arc::new(
            move |k: RawContinuation<U>, args: Value| -> Result<U, VMError> {
                let args = args.downcast::<A>()?;
                let _frame = CallbackFrame::enter();
                f(Continuation::from_raw(k), args)
            },
        );
        if Arc::make_mut(&mut self.core.table)
            .insert(effect.identity().clone(), func)
            .is_some()
        {
            log::trace!("replaced handler entry for {}", effect.identity());
        }
        self
    }

    /// Replace the value handler.
    pub fn to<F>(self, f: F) -> Self
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.try_to(move |value| Ok(f(value)))
    }

    pub fn try_to<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Result<U, VMError> + Send + Sync + 'static,
    {
        self.core.value_handler = Self::erase_value_handler(f);
        self
    }

    /// Run `thunk` under this handler.
    pub fn run<F>(&self, thunk: F) -> Result<U, VMError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.core.run(Box::new(move || Value::new(thunk())))
    }

    /// Whether an effect with `identity` would be caught by this handler's own table.
    pub fn handles(&self, identity: &EffectIdentity) -> bool {
        self.core.table.handles(identity)
    }

    pub fn table(&self) -> &HandlerTable<U> {
        &self.core.table
    }

    pub fn len(&self) -> usize {
        self.core.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.table.is_empty()
    }
}

impl<T, U> Clone for Handler<T, U> {
    fn clone(&self) -> Self {
        Handler {
            core: self.core.clone(),
            _input: PhantomData,
        }
    }
}

impl<T, U> fmt::Debug for Handler<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("entries", &*self.core.table)
            .finish_non_exhaustive()
    }
}
