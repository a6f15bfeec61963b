//! Go-style deferred procedures.

use std::any::Any;
use std::sync::Arc;

use effrun_vm::{Effect, Handler, VMError};
use parking_lot::Mutex;

pub type Deferred = Box<dyn FnOnce() + Send>;

/// Procedures registered during [`Defer::with`] run after the thunk returns,
/// most recently registered first.
///
/// They do not run when the computation is aborted by an outer handler or
/// fails.
#[derive(Clone, Debug)]
pub struct Defer {
    eff: Effect<Deferred, ()>,
}

impl Defer {
    pub fn new() -> Self {
        Defer {
            eff: Effect::named("defer"),
        }
    }

    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.eff.perform(Box::new(f))
    }

    pub fn with<T, F>(&self, thunk: F) -> Result<T, VMError>
    where
        T: Any + Send,
        F: FnOnce() -> T + Send + 'static,
    {
        let pending: Arc<Mutex<Vec<Deferred>>> = Arc::new(Mutex::new(Vec::new()));
        let drain = Arc::clone(&pending);

        Handler::new()
            .on(&self.eff, move |k, f: Deferred| {
                pending.lock().push(f);
                k.resume(())
            })
            .to(move |value: T| {
                let deferred = std::mem::take(&mut *drain.lock());
                log::trace!("running {} deferred procedures", deferred.len());
                for f in deferred.into_iter().rev() {
                    f();
                }
                value
            })
            .run(thunk)
    }

    pub fn effect(&self) -> &Effect<Deferred, ()> {
        &self.eff
    }
}

impl Default for Defer {
    fn default() -> Self {
        Self::new()
    }
}
