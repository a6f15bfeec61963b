//! effrun-vm: a runtime for algebraic effects with first-class handlers.
//!
//! # Architecture
//!
//! - **Effect identities**: fresh ids with an optional parent; a derived effect
//!   is caught by any handler for one of its ancestors
//! - **Suspensions**: each `run` drives its computation on a stack of its own and
//!   trades control with it through rendezvous channels
//! - **Dispatch**: nearest registered ancestor wins; unmatched effects escalate
//!   to the enclosing run
//! - **One-shot continuations**: consumed by `resume`, checked again at runtime
//!
//! ```
//! use effrun_vm::{Effect, Handler};
//!
//! let double: Effect<i32, i32> = Effect::named("double");
//! let performer = double.clone();
//! let result = Handler::new()
//!     .on(&double, |k, v| k.resume(v * 2))
//!     .run(move || performer.perform(5) + 1)
//!     .unwrap();
//! assert_eq!(result, 11);
//! ```

pub mod config;
pub mod continuation;
pub mod dispatch;
mod effect;
pub mod error;
mod handler;
pub mod ids;
pub mod suspension;
pub mod value;
mod vm_logging;
pub mod yielded;

// Re-exports for convenience
pub use config::{configure, load_config, runtime_config, ConfigError, RuntimeConfig};
pub use continuation::{Continuation, ErasedContinuation, RawContinuation};
pub use dispatch::{HandlerEntry, HandlerTable};
pub use effect::{Ancestors, Effect, EffectIdentity, PerformedEffect};
pub use error::VMError;
pub use handler::Handler;
pub use ids::{ContId, EffectId, SuspensionId};
pub use suspension::{live_suspension_threads, Suspension, SuspensionState};
pub use value::Value;
pub use yielded::{Escalation, Message, Yielded};
