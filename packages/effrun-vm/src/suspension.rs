//! The suspension primitive: a cooperatively resumable computation.
//!
//! Each suspension runs its thunk on a dedicated thread that is only ever used
//! as a stack. Control is handed back and forth over a pair of channels, so at
//! any moment exactly one side (the thunk or whoever resumed it) is running.
//!
//! A thread-local records the channels of the suspension whose thunk owns the
//! current thread. `suspend` uses it to deliver a [`Message`] to the driver and
//! block until the driver resumes with a value.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::runtime_config;
use crate::error::VMError;
use crate::ids::{ContId, SuspensionId};
use crate::value::Value;
use crate::yielded::{Message, Yielded};

pub(crate) type Thunk = Box<dyn FnOnce() -> Value + Send>;

/// Unwind payload used to tear down a suspension nobody will resume.
struct Abandoned;

enum Report {
    Suspended(Message),
    Completed(Value),
    Failed(VMError),
}

struct ThreadContext {
    report_tx: Sender<Report>,
    resume_rx: Receiver<Value>,
}

static LIVE_THREADS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };
    static FORWARDING_ROOT: Cell<bool> = const { Cell::new(false) };
    static CALLBACK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Number of suspension threads whose thunk has started and not yet returned
/// or unwound.
pub fn live_suspension_threads() -> usize {
    LIVE_THREADS.load(Ordering::SeqCst)
}

/// Mark the current thread's thunk as one that only forwards the result of
/// the continuation it calls.
pub(crate) fn mark_forwarding_root() {
    FORWARDING_ROOT.with(|root| root.set(true));
}

/// Guard held while user code (a handler or value-handler function) runs on
/// the current thread.
pub(crate) struct CallbackFrame(());

impl CallbackFrame {
    pub(crate) fn enter() -> Self {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        CallbackFrame(())
    }
}

impl Drop for CallbackFrame {
    fn drop(&mut self) {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// True when nothing on the current thread's stack would run after a
/// suspension point reached now, other than returning its value from the
/// forwarding thunk.
pub(crate) fn in_forwarding_tail() -> bool {
    FORWARDING_ROOT.with(Cell::get) && CALLBACK_DEPTH.with(Cell::get) == 0
}

/// Hand `message` to whoever last started or resumed the current suspension
/// and block until it resumes us.
///
/// Returns the message back when the current thread is not driven by any
/// suspension. If the suspension is dropped while we wait, the thread unwinds.
pub(crate) fn suspend(message: Message) -> Result<Value, Message> {
    let channels = CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|ctx| (ctx.report_tx.clone(), ctx.resume_rx.clone()))
    });
    let Some((report_tx, resume_rx)) = channels else {
        return Err(message);
    };

    if report_tx.send(Report::Suspended(message)).is_err() {
        panic::resume_unwind(Box::new(Abandoned));
    }
    match resume_rx.recv() {
        Ok(value) => Ok(value),
        Err(_) => panic::resume_unwind(Box::new(Abandoned)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionState {
    Created,
    Running,
    Suspended(ContId),
    Completed,
    Failed,
}

impl SuspensionState {
    pub fn name(&self) -> &'static str {
        match self {
            SuspensionState::Created => "created",
            SuspensionState::Running => "running",
            SuspensionState::Suspended(_) => "suspended",
            SuspensionState::Completed => "completed",
            SuspensionState::Failed => "failed",
        }
    }
}

struct Inner {
    state: SuspensionState,
    thunk: Option<Thunk>,
    thread_side: Option<ThreadContext>,
    resume_tx: Option<Sender<Value>>,
    report_rx: Receiver<Report>,
    thread: Option<JoinHandle<()>>,
}

pub struct Suspension {
    id: SuspensionId,
    inner: Mutex<Inner>,
}

impl Suspension {
    pub(crate) fn new(thunk: Thunk) -> Self {
        let (report_tx, report_rx) = bounded(1);
        let (resume_tx, resume_rx) = bounded(1);
        Suspension {
            id: SuspensionId::fresh(),
            inner: Mutex::new(Inner {
                state: SuspensionState::Created,
                thunk: Some(thunk),
                thread_side: Some(ThreadContext {
                    report_tx,
                    resume_rx,
                }),
                resume_tx: Some(resume_tx),
                report_rx,
                thread: None,
            }),
        }
    }

    pub fn id(&self) -> SuspensionId {
        self.id
    }

    pub fn state(&self) -> SuspensionState {
        self.inner.lock().state
    }

    /// Run the thunk until it completes, fails, or reaches its first suspension point.
    pub fn start(&self) -> Result<Yielded, VMError> {
        let report_rx = {
            let mut inner = self.inner.lock();
            if inner.state != SuspensionState::Created {
                return Err(VMError::not_suspended(inner.state.name()));
            }
            let (Some(thunk), Some(ctx)) = (inner.thunk.take(), inner.thread_side.take()) else {
                return Err(VMError::internal("suspension lost its thunk before start"));
            };
            let config = runtime_config();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, self.id.raw()))
                .stack_size(config.suspension_stack_size)
                .spawn(move || thread_main(ctx, thunk))
                .map_err(|err| VMError::internal(format!("failed to spawn suspension: {err}")))?;
            inner.thread = Some(handle);
            inner.state = SuspensionState::Running;
            inner.report_rx.clone()
        };
        crate::vm_debug_log!(target: "effrun_vm::suspension", "{} started", self.id);
        self.await_report(&report_rx)
    }

    /// Resume the pending suspension point `cont_id` with `value`.
    pub fn resume(&self, cont_id: ContId, value: Value) -> Result<Yielded, VMError> {
        let (resume_tx, report_rx) = {
            let mut inner = self.inner.lock();
            match inner.state {
                SuspensionState::Suspended(pending) if pending == cont_id => {}
                SuspensionState::Suspended(_) => return Err(VMError::one_shot_violation(cont_id)),
                SuspensionState::Completed | SuspensionState::Failed => {
                    return Err(VMError::one_shot_violation(cont_id))
                }
                other => return Err(VMError::not_suspended(other.name())),
            }
            let Some(resume_tx) = inner.resume_tx.clone() else {
                return Err(VMError::suspension_lost("resume channel closed"));
            };
            inner.state = SuspensionState::Running;
            (resume_tx, inner.report_rx.clone())
        };
        crate::vm_debug_log!(
            target: "effrun_vm::suspension",
            "{} resumed at {}",
            self.id,
            cont_id
        );
        if resume_tx.send(value).is_err() {
            self.inner.lock().state = SuspensionState::Failed;
            return Err(VMError::suspension_lost(format!("{} stopped listening", self.id)));
        }
        self.await_report(&report_rx)
    }

    fn await_report(&self, report_rx: &Receiver<Report>) -> Result<Yielded, VMError> {
        let report = report_rx.recv();
        let mut inner = self.inner.lock();
        match report {
            Ok(Report::Suspended(message)) => {
                let cont_id = ContId::fresh();
                inner.state = SuspensionState::Suspended(cont_id);
                Ok(Yielded::Suspended { cont_id, message })
            }
            Ok(Report::Completed(value)) => {
                inner.state = SuspensionState::Completed;
                Ok(Yielded::Completed(value))
            }
            Ok(Report::Failed(err)) => {
                inner.state = SuspensionState::Failed;
                Ok(Yielded::Failed(err))
            }
            Err(_) => {
                inner.state = SuspensionState::Failed;
                Err(VMError::suspension_lost(format!(
                    "{} exited without reporting",
                    self.id
                )))
            }
        }
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        // Closing the resume channel makes a suspended thread unwind.
        inner.resume_tx.take();
        let Some(handle) = inner.thread.take() else {
            return;
        };
        if let SuspensionState::Suspended(_) = inner.state {
            log::debug!("{} abandoned while suspended", self.id);
        }
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::warn!("{} thread did not shut down cleanly", self.id);
        }
    }
}

fn thread_main(ctx: ThreadContext, thunk: Thunk) {
    LIVE_THREADS.fetch_add(1, Ordering::SeqCst);
    let report_tx = ctx.report_tx.clone();
    CURRENT.with(|current| *current.borrow_mut() = Some(ctx));

    let outcome = panic::catch_unwind(AssertUnwindSafe(thunk));
    LIVE_THREADS.fetch_sub(1, Ordering::SeqCst);
    let report = match outcome {
        Ok(value) => Report::Completed(value),
        Err(payload) if payload.is::<Abandoned>() => return,
        Err(payload) => Report::Failed(VMError::thunk_panicked(panic_message(&*payload))),
    };
    // The driver may already be gone; nothing is waiting for this report then.
    let _ = report_tx.send(report);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectIdentity, PerformedEffect};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn perform_raw(identity: &EffectIdentity, args: Value) -> Value {
        match suspend(Message::Perform(PerformedEffect::new(identity.clone(), args))) {
            Ok(value) => value,
            Err(_) => panic!("not inside a suspension"),
        }
    }

    #[test]
    fn test_suspension_completes_without_effects() {
        let s = Suspension::new(Box::new(|| Value::new(5i32)));
        assert_eq!(s.state(), SuspensionState::Created);
        match s.start().unwrap() {
            Yielded::Completed(v) => assert_eq!(v.downcast::<i32>().unwrap(), 5),
            other => panic!("Expected Completed, got {other:?}"),
        }
        assert_eq!(s.state(), SuspensionState::Completed);
    }

    #[test]
    fn test_suspension_suspends_and_resumes() {
        let identity = EffectIdentity::named("ask", None);
        let thunk_identity = identity.clone();
        let s = Suspension::new(Box::new(move || {
            let got = perform_raw(&thunk_identity, Value::new(20i32));
            Value::new(got.downcast::<i32>().unwrap() + 1)
        }));

        let cont_id = match s.start().unwrap() {
            Yielded::Suspended { cont_id, message } => {
                assert_eq!(message.effect().identity, identity);
                assert_eq!(message.kind(), "perform");
                cont_id
            }
            other => panic!("Expected Suspended, got {other:?}"),
        };
        assert_eq!(s.state(), SuspensionState::Suspended(cont_id));

        match s.resume(cont_id, Value::new(41i32)).unwrap() {
            Yielded::Completed(v) => assert_eq!(v.downcast::<i32>().unwrap(), 42),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn test_resume_with_stale_cont_id_is_rejected() {
        let identity = EffectIdentity::new(None);
        let thunk_identity = identity.clone();
        let s = Suspension::new(Box::new(move || {
            perform_raw(&thunk_identity, Value::unit());
            perform_raw(&thunk_identity, Value::unit());
            Value::unit()
        }));

        let first = match s.start().unwrap() {
            Yielded::Suspended { cont_id, .. } => cont_id,
            other => panic!("Expected Suspended, got {other:?}"),
        };
        assert!(s.resume(first, Value::unit()).unwrap().is_suspended());

        let err = s.resume(first, Value::unit()).unwrap_err();
        assert!(matches!(err, VMError::OneShotViolation { .. }));
    }

    #[test]
    fn test_resume_after_completion_is_rejected() {
        let s = Suspension::new(Box::new(Value::unit));
        assert!(matches!(s.start().unwrap(), Yielded::Completed(_)));
        let err = s.resume(ContId::fresh(), Value::unit()).unwrap_err();
        assert!(err.is_continuation_misuse());
        assert!(matches!(s.start(), Err(VMError::NotSuspended { .. })));
    }

    #[test]
    fn test_panicking_thunk_reports_failure() {
        let s = Suspension::new(Box::new(|| -> Value { panic!("boom") }));
        match s.start().unwrap() {
            Yielded::Failed(VMError::ThunkPanicked { message }) => assert_eq!(message, "boom"),
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert_eq!(s.state(), SuspensionState::Failed);
    }

    #[test]
    fn test_dropping_suspended_suspension_unwinds_thunk() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard_flag = dropped.clone();
        let identity = EffectIdentity::new(None);
        let s = Suspension::new(Box::new(move || {
            let _guard = SetOnDrop(guard_flag);
            perform_raw(&identity, Value::unit());
            Value::unit()
        }));
        assert!(s.start().unwrap().is_suspended());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(s);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_forwarding_tail_tracks_callback_frames() {
        assert!(!in_forwarding_tail());
        let s = Suspension::new(Box::new(|| {
            let before = in_forwarding_tail();
            mark_forwarding_root();
            let at_root = in_forwarding_tail();
            let in_callback = {
                let _frame = CallbackFrame::enter();
                in_forwarding_tail()
            };
            Value::new((before, at_root, in_callback, in_forwarding_tail()))
        }));
        match s.start().unwrap() {
            Yielded::Completed(v) => {
                assert_eq!(
                    v.downcast::<(bool, bool, bool, bool)>().unwrap(),
                    (false, true, false, true)
                );
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
        assert!(!in_forwarding_tail());
    }
}
