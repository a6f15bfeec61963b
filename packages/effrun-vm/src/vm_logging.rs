//! Step tracing for suspensions and handlers, compiled in only on request.

/// Trace one protocol step (start, resume, perform, escalate, completion).
///
/// Routed through `log::trace!` when the `vm_debug_logs` Cargo feature is
/// enabled; otherwise a no-op that still type-checks its format arguments.
/// Without an explicit `target:` the `effrun_vm::step` target is used.
#[macro_export]
macro_rules! vm_debug_log {
    (target: $target:expr, $($arg:tt)+) => {{
        #[cfg(feature = "vm_debug_logs")]
        {
            ::log::trace!(target: $target, $($arg)+);
        }
        #[cfg(not(feature = "vm_debug_logs"))]
        {
            let _ = $target;
            let _ = format_args!($($arg)+);
        }
    }};
    ($($arg:tt)+) => {
        $crate::vm_debug_log!(target: "effrun_vm::step", $($arg)+)
    };
}
