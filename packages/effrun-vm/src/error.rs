//! Error types for the runtime.

use thiserror::Error;

use crate::ids::ContId;

#[derive(Debug, Clone, Error)]
pub enum VMError {
    /// An effect reached the outermost `run` without any matching handler entry.
    #[error("unhandled effect: {effect}")]
    UnhandledEffect { effect: String },

    /// `perform` was called with no suspension driving the current thread.
    #[error("perform of {effect} outside of any handler run")]
    NoActiveSuspension { effect: String },

    #[error("one-shot violation: continuation {} already consumed", cont_id.raw())]
    OneShotViolation { cont_id: ContId },

    #[error("suspension cannot be resumed in state {state}")]
    NotSuspended { state: &'static str },

    #[error("computation panicked: {message}")]
    ThunkPanicked { message: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The thread backing a suspension went away without reporting an outcome.
    #[error("suspension lost: {message}")]
    SuspensionLost { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl VMError {
    pub fn unhandled_effect(effect: impl Into<String>) -> Self {
        VMError::UnhandledEffect {
            effect: effect.into(),
        }
    }

    pub fn no_active_suspension(effect: impl Into<String>) -> Self {
        VMError::NoActiveSuspension {
            effect: effect.into(),
        }
    }

    pub fn one_shot_violation(cont_id: ContId) -> Self {
        VMError::OneShotViolation { cont_id }
    }

    pub fn not_suspended(state: &'static str) -> Self {
        VMError::NotSuspended { state }
    }

    pub fn thunk_panicked(message: impl Into<String>) -> Self {
        VMError::ThunkPanicked {
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        VMError::TypeMismatch { expected, found }
    }

    pub fn suspension_lost(message: impl Into<String>) -> Self {
        VMError::SuspensionLost {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        VMError::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is a usage error on a continuation.
    pub fn is_continuation_misuse(&self) -> bool {
        matches!(
            self,
            VMError::OneShotViolation { .. } | VMError::NotSuspended { .. }
        )
    }
}
