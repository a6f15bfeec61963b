//! A mutable cell scoped to one handled computation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use effrun_vm::{Effect, Handler, VMError};
use parking_lot::Mutex;

pub type Modifier<S> = Box<dyn FnOnce(S) -> S + Send>;

/// `get`/`modify` effects interpreted as a state cell by [`State::with_init`].
///
/// ```
/// use effrun_core_effects::State;
///
/// let state = State::new();
/// let cell = state.clone();
/// let result = state
///     .with_init(0, move || {
///         cell.put(10);
///         cell.modify(|s| s + 20);
///         cell.get()
///     })
///     .unwrap();
/// assert_eq!(result, 30);
/// ```
pub struct State<S> {
    get: Effect<(), S>,
    modify: Effect<Modifier<S>, ()>,
}

impl<S> State<S>
where
    S: Clone + Send + 'static,
{
    pub fn new() -> Self {
        State {
            get: Effect::named("state.get"),
            modify: Effect::named("state.modify"),
        }
    }

    /// The current state.
    pub fn get(&self) -> S {
        self.get.perform(())
    }

    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(S) -> S + Send + 'static,
    {
        self.modify.perform(Box::new(f))
    }

    pub fn put(&self, state: S) {
        self.modify(move |_| state)
    }

    /// Run `thunk` with the cell starting at `init`. The thunk's result is
    /// returned unchanged; the final state is not.
    pub fn with_init<T, F>(&self, init: S, thunk: F) -> Result<T, VMError>
    where
        T: Any + Send,
        F: FnOnce() -> T + Send + 'static,
    {
        // One cell per call; handlers must not share it across runs.
        let cell = Arc::new(Mutex::new(init));
        let read = Arc::clone(&cell);

        Handler::new()
            .on(&self.modify, move |k, f: Modifier<S>| {
                let current = cell.lock().clone();
                let next = f(current);
                *cell.lock() = next;
                k.resume(())
            })
            .on(&self.get, move |k, ()| {
                let current = read.lock().clone();
                k.resume(current)
            })
            .run(thunk)
    }

    pub fn get_effect(&self) -> &Effect<(), S> {
        &self.get
    }

    pub fn modify_effect(&self) -> &Effect<Modifier<S>, ()> {
        &self.modify
    }
}

impl<S> State<S>
where
    S: Clone + Default + Send + 'static,
{
    /// [`State::with_init`] starting from `S::default()`.
    pub fn with<T, F>(&self, thunk: F) -> Result<T, VMError>
    where
        T: Any + Send,
        F: FnOnce() -> T + Send + 'static,
    {
        self.with_init(S::default(), thunk)
    }
}

impl<S> Default for State<S>
where
    S: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for State<S> {
    fn clone(&self) -> Self {
        State {
            get: self.get.clone(),
            modify: self.modify.clone(),
        }
    }
}

impl<S> fmt::Debug for State<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("get", &self.get)
            .field("modify", &self.modify)
            .finish()
    }
}
