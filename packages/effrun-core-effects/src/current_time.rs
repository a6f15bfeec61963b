//! The current time as an effect, so computations can be run against a fixed clock.

use std::any::Any;

use chrono::{DateTime, Utc};
use effrun_vm::{Effect, Handler, VMError};

#[derive(Clone, Debug)]
pub struct CurrentTime {
    eff: Effect<(), DateTime<Utc>>,
}

impl CurrentTime {
    pub fn new() -> Self {
        CurrentTime {
            eff: Effect::named("current_time"),
        }
    }

    pub fn get(&self) -> DateTime<Utc> {
        self.eff.perform(())
    }

    /// Answer every request with the wall clock.
    pub fn with<T, F>(&self, thunk: F) -> Result<T, VMError>
    where
        T: Any + Send,
        F: FnOnce() -> T + Send + 'static,
    {
        self.with_clock(Utc::now, thunk)
    }

    /// Answer every request with `clock()`.
    pub fn with_clock<T, C, F>(&self, clock: C, thunk: F) -> Result<T, VMError>
    where
        T: Any + Send,
        C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        Handler::new()
            .on(&self.eff, move |k, ()| k.resume(clock()))
            .run(thunk)
    }

    pub fn effect(&self) -> &Effect<(), DateTime<Utc>> {
        &self.eff
    }
}

impl Default for CurrentTime {
    fn default() -> Self {
        Self::new()
    }
}
