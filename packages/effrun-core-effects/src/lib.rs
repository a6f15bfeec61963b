//! Standard effects and handlers built on `effrun-vm`.
//!
//! Each module owns its effects in a context value and exposes a `with`-style
//! entry point that installs a fresh handler per call, so no state is shared
//! between independent runs.

pub mod async_await;
pub mod call1cc;
pub mod current_time;
pub mod defer;
pub mod delim_ctrl;
pub mod measure_time;
pub mod state;

pub use async_await::{Promise, Scheduler};
pub use call1cc::{Call1cc, Escape};
pub use current_time::CurrentTime;
pub use defer::Defer;
pub use delim_ctrl::{reset, Prompt};
pub use measure_time::{MeasureTime, Measured, Measurement};
pub use state::State;
