//! Call with one-shot escape continuation.
//!
//! ```
//! use effrun_core_effects::Call1cc;
//!
//! let halves = Call1cc::context(|cc| {
//!     let halve_all = |values: Vec<i32>, fallback: Vec<i32>| {
//!         cc.call1cc(move |k| {
//!             values
//!                 .iter()
//!                 .map(|&v| if v == 0 { k.call(fallback.clone()) } else { v / 2 })
//!                 .collect()
//!         })
//!         .unwrap()
//!     };
//!     (halve_all(vec![1, 3, 5], vec![1]), halve_all(vec![1, 0, 5], vec![1]))
//! })
//! .unwrap();
//! assert_eq!(halves, (vec![0, 1, 2], vec![1]));
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use effrun_vm::{Effect, Handler, VMError, Value};

/// The prompt that escapes are delivered through.
#[derive(Clone, Debug)]
pub struct Call1cc {
    prompt: Effect<Value, Value>,
}

impl Call1cc {
    /// Run `body` with a fresh prompt installed.
    pub fn context<T, F>(body: F) -> Result<T, VMError>
    where
        T: Any + Send,
        F: FnOnce(&Call1cc) -> T + Send + 'static,
    {
        let cc = Call1cc {
            prompt: Effect::named("call1cc"),
        };
        let inner = cc.clone();
        Handler::new()
            .on(&cc.prompt, |k, escaped: Value| k.resume(escaped))
            .run(move || body(&inner))
    }

    /// Call `f` with an escape. Calling the escape abandons the rest of `f`
    /// and makes `call1cc` return the escaped value; otherwise `call1cc`
    /// returns what `f` returns.
    pub fn call1cc<A, F>(&self, f: F) -> Result<A, VMError>
    where
        A: Any + Send,
        F: FnOnce(Escape<A>) -> A + Send + 'static,
    {
        // Each call gets its own child of the prompt so nested calls can
        // escape past one another.
        let target = self.prompt.derive();
        let escape = Escape {
            target: target.clone(),
            _value: PhantomData,
        };
        let prompt = self.prompt.clone();
        Handler::new()
            .on(&target, move |_k, escaped: Value| {
                log::trace!("escape through {}", prompt.identity());
                prompt.try_perform(escaped)?.downcast::<A>()
            })
            .run(move || f(escape))
    }
}

/// One-shot escape from a [`Call1cc::call1cc`] body.
pub struct Escape<A> {
    target: Effect<Value, Value>,
    _value: PhantomData<fn(A)>,
}

impl<A: Any + Send> Escape<A> {
    /// Leave the enclosing `call1cc` with `value`.
    ///
    /// # Panics
    ///
    /// Panics when the `call1cc` this escape belongs to has already returned,
    /// or when called outside its [`Call1cc::context`].
    pub fn call(&self, value: A) -> ! {
        match self.target.try_perform(Value::new(value)) {
            Ok(_) => panic!(
                "escape {} used after its call1cc returned",
                self.target.identity()
            ),
            Err(err) => panic!("{err}"),
        }
    }
}

impl<A> Clone for Escape<A> {
    fn clone(&self) -> Self {
        Escape {
            target: self.target.clone(),
            _value: PhantomData,
        }
    }
}

impl<A> fmt::Debug for Escape<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Escape").field(self.target.identity()).finish()
    }
}
