//! One-shot continuations handed to handler functions.
//!
//! A continuation is bound to one suspension point at capture time. It is
//! consumed by `resume`, so it can be invoked at most once; dropping it
//! abandons the rest of the suspended computation.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::error::VMError;
use crate::ids::ContId;
use crate::value::Value;

type ResumeFn<U> = Box<dyn FnOnce(Value) -> Result<U, VMError> + Send>;

/// Untyped continuation: takes the erased resumption value directly.
pub struct RawContinuation<U> {
    cont_id: ContId,
    resume: ResumeFn<U>,
}

/// Continuation carried by an escalation between handler layers.
pub type ErasedContinuation = RawContinuation<Value>;

impl<U> RawContinuation<U> {
    pub(crate) fn new<F>(cont_id: ContId, resume: F) -> Self
    where
        F: FnOnce(Value) -> Result<U, VMError> + Send + 'static,
    {
        RawContinuation {
            cont_id,
            resume: Box::new(resume),
        }
    }

    pub fn id(&self) -> ContId {
        self.cont_id
    }

    pub(crate) fn call(self, value: Value) -> Result<U, VMError> {
        (self.resume)(value)
    }
}

impl<U: Any + Send> RawContinuation<U> {
    /// Box the result so the continuation can cross handler layers.
    pub(crate) fn erase(self) -> ErasedContinuation {
        let resume = self.resume;
        RawContinuation::new(self.cont_id, move |value| resume(value).map(Value::new))
    }
}

impl<U> fmt::Debug for RawContinuation<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawContinuation")
            .field("cont_id", &self.cont_id)
            .finish_non_exhaustive()
    }
}

/// The remainder of a computation suspended at an effect returning `R`,
/// producing the handler's result type `U` when resumed.
pub struct Continuation<R, U> {
    raw: RawContinuation<U>,
    _input: PhantomData<fn(R)>,
}

impl<R, U> Continuation<R, U>
where
    R: Any + Send,
{
    pub(crate) fn from_raw(raw: RawContinuation<U>) -> Self {
        Continuation {
            raw,
            _input: PhantomData,
        }
    }

    pub fn id(&self) -> ContId {
        self.raw.id()
    }

    /// Resume the suspended computation with `value` as the result of its
    /// `perform`. Returns whatever the handling of the rest of the computation
    /// produces.
    ///
    /// A continuation cannot be resumed twice:
    ///
    /// ```compile_fail
    /// use effrun_vm::{Effect, Handler};
    ///
    /// let tick: Effect<(), ()> = Effect::new();
    /// let _handler = Handler::<()>::new().on(&tick, |k, ()| {
    ///     k.resume(())?;
    ///     k.resume(())
    /// });
    /// ```
    pub fn resume(self, value: R) -> Result<U, VMError> {
        self.raw.call(Value::new(value))
    }
}

impl<U> Continuation<Value, U>
where
    U: 'static,
{
    /// View a continuation for an erased effect result as one taking `A`.
    pub fn typed<A: Any + Send>(self) -> Continuation<A, U> {
        let raw = self.raw;
        let cont_id = raw.id();
        Continuation::from_raw(RawContinuation::new(cont_id, move |value| {
            raw.call(Value::new(value))
        }))
    }
}

impl<R, U> fmt::Debug for Continuation<R, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("cont_id", &self.raw.cont_id)
            .finish_non_exhaustive()
    }
}
