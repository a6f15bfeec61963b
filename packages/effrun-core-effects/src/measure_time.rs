//! Labelled timing of the remainder of a computation.

use std::any::Any;
use std::time::{Duration, Instant};

use effrun_vm::{Effect, Handler, VMError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub label: String,
    /// Time from the `measure` call to the end of the computation.
    pub elapsed: Duration,
}

/// The computation's value and its measurements, latest `measure` first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measured<T> {
    pub value: T,
    pub measurements: Vec<Measurement>,
}

#[derive(Clone, Debug)]
pub struct MeasureTime {
    eff: Effect<String, ()>,
}

impl MeasureTime {
    pub fn new() -> Self {
        MeasureTime {
            eff: Effect::named("measure_time"),
        }
    }

    pub fn measure(&self, label: impl Into<String>) {
        self.eff.perform(label.into())
    }

    pub fn with<T, F>(&self, thunk: F) -> Result<Measured<T>, VMError>
    where
        T: Any + Send,
        F: FnOnce() -> T + Send + 'static,
    {
        Handler::with_value_handler(|value: T| Measured {
            value,
            measurements: Vec::new(),
        })
        .on(&self.eff, |k, label: String| {
            let started = Instant::now();
            let mut measured = k.resume(())?;
            measured.measurements.push(Measurement {
                label,
                elapsed: started.elapsed(),
            });
            Ok(measured)
        })
        .run(thunk)
    }

    pub fn effect(&self) -> &Effect<String, ()> {
        &self.eff
    }
}

impl Default for MeasureTime {
    fn default() -> Self {
        Self::new()
    }
}
