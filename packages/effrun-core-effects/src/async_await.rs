//! Cooperative async/await on a single logical thread.
//!
//! Every task runs under its own handler (`fork`). Performing `spawn`,
//! `yield_now` or `await` suspends the task; the handler parks its
//! continuation in the run queue or on a promise and runs the next ready job.
//! When a task finishes, its promise is resolved and everything awaiting it is
//! queued again.
//!
//! The run queue belongs to a single [`Scheduler::run`] call. A `run` nested in
//! a task, even of the same scheduler, schedules its own tasks only.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use effrun_vm::{Continuation, Effect, Handler, VMError};
use parking_lot::Mutex;

type Payload = Arc<dyn Any + Send + Sync>;
type Job = Box<dyn FnOnce() -> Result<(), VMError> + Send>;
type Forker = Box<dyn FnOnce(RunQueue, PromiseCell) -> Result<(), VMError> + Send>;
type PromiseCell = Arc<Mutex<PromiseState>>;

/// Jobs ready to run, in FIFO order.
#[derive(Clone, Default)]
struct RunQueue(Arc<Mutex<VecDeque<Job>>>);

impl RunQueue {
    fn push<J>(&self, job: J)
    where
        J: FnOnce() -> Result<(), VMError> + Send + 'static,
    {
        self.0.lock().push_back(Box::new(job));
    }

    fn run_next(&self) -> Result<(), VMError> {
        let next = self.0.lock().pop_front();
        match next {
            Some(job) => job(),
            None => Ok(()),
        }
    }

    /// Drop every parked job, returning how many there were.
    fn clear(&self) -> usize {
        let leftover = std::mem::take(&mut *self.0.lock());
        leftover.len()
    }
}

enum PromiseState {
    Waiting(Vec<Continuation<Payload, ()>>),
    Done(Payload),
}

fn new_cell() -> PromiseCell {
    Arc::new(Mutex::new(PromiseState::Waiting(Vec::new())))
}

/// The eventual result of a spawned task.
pub struct Promise<T> {
    cell: PromiseCell,
    _result: PhantomData<fn() -> T>,
}

impl<T> Promise<T> {
    fn from_cell(cell: PromiseCell) -> Self {
        Promise {
            cell,
            _result: PhantomData,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.cell.lock(), PromiseState::Done(_))
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise::from_cell(Arc::clone(&self.cell))
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.is_done())
            .finish()
    }
}

struct AsyncEffects {
    spawn: Effect<Forker, PromiseCell>,
    yield_now: Effect<(), ()>,
    await_promise: Effect<PromiseCell, Payload>,
}

/// The `spawn`/`yield_now`/`await` effects and the runner that handles them.
///
/// ```
/// use effrun_core_effects::Scheduler;
///
/// let sched = Scheduler::new();
/// let s = sched.clone();
/// let sum = sched
///     .run(move || {
///         let a = s.spawn(|| 10);
///         let b = s.spawn(|| 20);
///         s.await_promise(&a) + s.await_promise(&b)
///     })
///     .unwrap();
/// assert_eq!(sum, Some(30));
/// ```
#[derive(Clone)]
pub struct Scheduler {
    effects: Arc<AsyncEffects>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            effects: Arc::new(AsyncEffects {
                spawn: Effect::named("async.spawn"),
                yield_now: Effect::named("async.yield"),
                await_promise: Effect::named("async.await"),
            }),
        }
    }

    /// Start `task` concurrently with the caller. It runs until its first
    /// suspension before `spawn` returns.
    pub fn spawn<T, F>(&self, task: F) -> Promise<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T + Send + 'static,
    {
        let sched = self.clone();
        let forker: Forker =
            Box::new(move |queue: RunQueue, cell: PromiseCell| sched.fork(queue, cell, task));
        Promise::from_cell(self.effects.spawn.perform(forker))
    }

    /// Let every other ready task run before continuing.
    pub fn yield_now(&self) {
        self.effects.yield_now.perform(())
    }

    pub fn try_await<T>(&self, promise: &Promise<T>) -> Result<T, VMError>
    where
        T: Any + Clone + Send + Sync,
    {
        let payload = self
            .effects
            .await_promise
            .try_perform(Arc::clone(&promise.cell))?;
        match payload.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => Err(VMError::type_mismatch(
                std::any::type_name::<T>(),
                "another promise payload",
            )),
        }
    }

    /// Block the current task until `promise` is resolved.
    ///
    /// # Panics
    ///
    /// Panics when called outside [`Scheduler::run`].
    pub fn await_promise<T>(&self, promise: &Promise<T>) -> T
    where
        T: Any + Clone + Send + Sync,
    {
        match self.try_await(promise) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Run `main` and every task it spawns until no job is left.
    ///
    /// Returns `None` when `main` never finished, which happens when it waits
    /// on a promise that is never resolved.
    pub fn run<T, F>(&self, main: F) -> Result<Option<T>, VMError>
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce() -> T + Send + 'static,
    {
        let queue = RunQueue::default();
        let result = new_cell();
        let outcome = self.fork(queue.clone(), Arc::clone(&result), main);

        // Whatever is still parked can never run again.
        let dropped = queue.clear();
        if dropped > 0 {
            log::debug!("dropping {dropped} unfinished jobs");
        }
        outcome?;

        let state = std::mem::replace(&mut *result.lock(), PromiseState::Waiting(Vec::new()));
        match state {
            PromiseState::Done(payload) => Ok(payload.downcast_ref::<T>().cloned()),
            PromiseState::Waiting(blocked) => {
                log::debug!("main task blocked with {} waiters", blocked.len());
                Ok(None)
            }
        }
    }

    fn fork<T, F>(&self, queue: RunQueue, cell: PromiseCell, task: F) -> Result<(), VMError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T + Send + 'static,
    {
        let on_done = queue.clone();
        let on_spawn = queue.clone();
        let on_yield = queue.clone();
        let on_await = queue;

        Handler::try_with_value_handler(move |value: T| {
            let payload: Payload = Arc::new(value);
            let previous = std::mem::replace(
                &mut *cell.lock(),
                PromiseState::Done(Arc::clone(&payload)),
            );
            let PromiseState::Waiting(waiters) = previous else {
                return Err(VMError::internal("promise resolved twice"));
            };
            for k in waiters {
                let payload = Arc::clone(&payload);
                on_done.push(move || k.resume(payload));
            }
            on_done.run_next()
        })
        .on(&self.effects.spawn, move |k, forker: Forker| {
            let child = new_cell();
            let handle = Arc::clone(&child);
            on_spawn.push(move || k.resume(handle));
            forker(on_spawn.clone(), child)
        })
        .on(&self.effects.yield_now, move |k, ()| {
            on_yield.push(move || k.resume(()));
            on_yield.run_next()
        })
        .on(&self.effects.await_promise, move |k, awaited: PromiseCell| {
            let mut state = awaited.lock();
            match &mut *state {
                PromiseState::Done(payload) => {
                    let payload = Arc::clone(payload);
                    drop(state);
                    k.resume(payload)
                }
                PromiseState::Waiting(waiters) => {
                    waiters.push(k);
                    drop(state);
                    on_await.run_next()
                }
            }
        })
        .run(task)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("spawn", self.effects.spawn.identity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn note(journal: &Journal, entry: impl Into<String>) {
        journal.lock().push(entry.into());
    }

    #[test]
    fn test_await_sums_tasks() {
        let sched = Scheduler::new();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let (s, j) = (sched.clone(), journal.clone());

        let sum = sched
            .run(move || {
                let ja = j.clone();
                let task_a = s.spawn(move || {
                    note(&ja, "Task A Done");
                    10
                });
                let (jb, sb) = (j.clone(), s.clone());
                let task_b = s.spawn(move || {
                    note(&jb, "Task B Started");
                    sb.yield_now();
                    note(&jb, "Task B Resumed");
                    20
                });
                let sum = s.await_promise(&task_a) + s.await_promise(&task_b);
                note(&j, format!("Sum: {sum}"));
                sum
            })
            .unwrap();

        assert_eq!(sum, Some(30));
        assert_eq!(
            *journal.lock(),
            vec!["Task A Done", "Task B Started", "Task B Resumed", "Sum: 30"]
        );
    }

    #[test]
    fn test_yield_interleaves_fifo() {
        let sched = Scheduler::new();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let (s, j) = (sched.clone(), journal.clone());

        sched
            .run(move || {
                let task = |name: &'static str| {
                    let (s, j) = (s.clone(), j.clone());
                    move || {
                        note(&j, format!("Starting {name}"));
                        s.yield_now();
                        note(&j, format!("Ending {name}"));
                        name.len()
                    }
                };
                let pa = s.spawn(task("a"));
                let pb = s.spawn(task("bb"));
                let (sc, pa2, pb2) = (s.clone(), pa.clone(), pb.clone());
                let pc = s.spawn(move || sc.await_promise(&pa2) + sc.await_promise(&pb2));
                let total = s.await_promise(&pc);
                note(&j, format!("sum is {total}"));
                assert!(pa.is_done() && pb.is_done());
            })
            .unwrap();

        assert_eq!(
            *journal.lock(),
            vec![
                "Starting a",
                "Starting bb",
                "Ending a",
                "Ending bb",
                "sum is 3",
            ]
        );
    }

    #[test]
    fn test_promise_awaited_by_many() {
        let sched = Scheduler::new();
        let s = sched.clone();
        let total = sched
            .run(move || {
                let gate = s.spawn({
                    let s = s.clone();
                    move || {
                        s.yield_now();
                        7
                    }
                });
                let waiters: Vec<_> = (1..=3)
                    .map(|i| {
                        let (s, gate) = (s.clone(), gate.clone());
                        s.clone().spawn(move || s.await_promise(&gate) * i)
                    })
                    .collect();
                waiters.iter().map(|p| s.await_promise(p)).sum::<i32>()
            })
            .unwrap();
        assert_eq!(total, Some(42));
    }

    #[test]
    fn test_blocked_main_returns_none() {
        let sched = Scheduler::new();
        let s = sched.clone();
        let result = sched
            .run(move || {
                let never: Promise<i32> = Promise::from_cell(new_cell());
                s.await_promise(&never)
            })
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_await_outside_run_is_error() {
        let sched = Scheduler::new();
        let promise: Promise<i32> = Promise::from_cell(new_cell());
        let err = sched.try_await(&promise).unwrap_err();
        assert!(matches!(err, VMError::NoActiveSuspension { .. }));
    }

    #[test]
    fn test_nested_run_keeps_outer_jobs() {
        let sched = Scheduler::new();
        let s = sched.clone();
        let result = sched
            .run(move || {
                let s2 = s.clone();
                let parked = s.spawn(move || {
                    s2.yield_now();
                    7
                });
                let nested = s.run(|| 5).unwrap();
                nested.unwrap() + s.await_promise(&parked)
            })
            .unwrap();
        assert_eq!(result, Some(12));
    }
}
