//! Kept alone in its binary: it watches the process-wide suspension thread count.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use effrun_vm::{live_suspension_threads, Effect, Handler, VMError};

#[test]
fn repeated_escalation_keeps_thread_count_flat() {
    let _ = env_logger::builder().is_test(true).try_init();
    const MESSAGES: usize = 2_500;

    let log: Effect<usize, ()> = Effect::named("log");
    let seen = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (count, high) = (seen.clone(), peak.clone());

    let outer = Handler::<Result<usize, VMError>>::new().on(&log, move |k, i: usize| {
        assert_eq!(count.fetch_add(1, Ordering::SeqCst), i);
        high.fetch_max(live_suspension_threads(), Ordering::SeqCst);
        k.resume(())
    });
    let inner = Handler::<usize>::new();
    let performer = log.clone();

    let result = outer
        .run(move || {
            inner.run(move || {
                for i in 0..MESSAGES {
                    performer.perform(i);
                }
                MESSAGES
            })
        })
        .unwrap()
        .unwrap();

    assert_eq!(result, MESSAGES);
    assert_eq!(seen.load(Ordering::SeqCst), MESSAGES);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "{peak} suspension threads alive at once");
    assert_eq!(live_suspension_threads(), 0);
}
