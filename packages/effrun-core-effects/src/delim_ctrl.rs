//! One-shot delimited control: `reset` and `shift`.

use std::any::Any;
use std::fmt;

use effrun_vm::{Continuation, Effect, Handler, VMError, Value};

type ShiftBody<T> = Box<dyn FnOnce(Continuation<Value, T>) -> Result<T, VMError> + Send>;

/// Delimiter installed by [`reset`]; `shift` captures up to it.
pub struct Prompt<T> {
    eff: Effect<ShiftBody<T>, Value>,
}

/// Run `body` delimited by a fresh prompt.
///
/// ```
/// use effrun_core_effects::delim_ctrl::reset;
///
/// let result = reset(|p| {
///     let x: i32 = p.shift(|k| Ok(k.resume(1)? * 10));
///     x + 1
/// })
/// .unwrap();
/// assert_eq!(result, 20);
/// ```
pub fn reset<T, F>(body: F) -> Result<T, VMError>
where
    T: Any + Send,
    F: FnOnce(&Prompt<T>) -> T + Send + 'static,
{
    let prompt = Prompt {
        eff: Effect::named("reset"),
    };
    let inner = prompt.clone();
    Handler::new()
        .on(&prompt.eff, |k, shift_body: ShiftBody<T>| shift_body(k))
        .run(move || body(&inner))
}

impl<T: Any + Send> Prompt<T> {
    /// Capture the rest of the computation up to the enclosing `reset` as `k`
    /// and replace that `reset`'s result with what `f` returns. Resuming `k`
    /// with `v` makes this `shift` return `v` and yields the `reset` body's
    /// result.
    pub fn try_shift<A, F>(&self, f: F) -> Result<A, VMError>
    where
        A: Any + Send,
        F: FnOnce(Continuation<A, T>) -> Result<T, VMError> + Send + 'static,
    {
        let body: ShiftBody<T> = Box::new(move |k: Continuation<Value, T>| f(k.typed::<A>()));
        self.eff.try_perform(body)?.downcast::<A>()
    }

    /// # Panics
    ///
    /// Panics outside the body of the `reset` that created this prompt.
    pub fn shift<A, F>(&self, f: F) -> A
    where
        A: Any + Send,
        F: FnOnce(Continuation<A, T>) -> Result<T, VMError> + Send + 'static,
    {
        match self.try_shift(f) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T> Clone for Prompt<T> {
    fn clone(&self) -> Self {
        Prompt {
            eff: self.eff.clone(),
        }
    }
}

impl<T> fmt::Debug for Prompt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Prompt").field(self.eff.identity()).finish()
    }
}
