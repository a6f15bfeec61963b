use std::sync::Arc;

use effrun_core_effects::{Defer, Scheduler, State};
use parking_lot::Mutex;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn ten_thousand_state_updates_under_defer() {
    init_logging();
    let defer = Defer::new();
    let state: State<u64> = State::new();
    let (s, st) = (state.clone(), state.clone());

    let total = defer
        .with(move || {
            st.with_init(0, move || {
                for _ in 0..10_000 {
                    s.modify(|n| n + 1);
                }
                s.get()
            })
        })
        .unwrap()
        .unwrap();

    assert_eq!(total, 10_000);
}

#[test]
fn many_deferred_procedures_registered_through_state() {
    init_logging();
    let defer = Defer::new();
    let state: State<usize> = State::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (d, s, st, o) = (defer.clone(), state.clone(), state.clone(), order.clone());

    let registered = defer
        .with(move || {
            st.with(move || {
                for i in 0..500 {
                    let o = o.clone();
                    d.register(move || o.lock().push(i));
                    s.modify(|n| n + 1);
                }
                s.get()
            })
        })
        .unwrap()
        .unwrap();

    assert_eq!(registered, 500);
    let order = order.lock();
    assert_eq!(order.len(), 500);
    assert_eq!(order.first(), Some(&499));
    assert_eq!(order.last(), Some(&0));
}

#[test]
fn tasks_yielding_ten_thousand_times() {
    init_logging();
    let sched = Scheduler::new();
    let s = sched.clone();
    let switches = Arc::new(Mutex::new(Vec::new()));
    let trace = switches.clone();

    let result = sched
        .run(move || {
            let (s2, worker_trace) = (s.clone(), trace.clone());
            let worker = s.spawn(move || {
                for _ in 0..10_000 {
                    worker_trace.lock().push('w');
                    s2.yield_now();
                }
                "worker done"
            });
            for _ in 0..10_000 {
                trace.lock().push('m');
                s.yield_now();
            }
            s.await_promise(&worker)
        })
        .unwrap();

    assert_eq!(result, Some("worker done"));
    let switches = switches.lock();
    assert_eq!(switches.len(), 20_000);
    assert_eq!(switches[..6].iter().collect::<String>(), "wmwmwm");
}
