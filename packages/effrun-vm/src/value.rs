//! Values that flow between a suspended computation and its driver.
//!
//! Effect arguments, resumption values and final results cross thread
//! boundaries inside the runtime, so they travel type-erased and are
//! recovered by the typed `Effect` / `Continuation` / `Handler` wrappers.

use std::any::{type_name, Any};
use std::fmt;

use crate::error::VMError;

/// A type-erased, sendable value.
pub struct Value {
    inner: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Value {
            inner: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn unit() -> Self {
        Value::new(())
    }

    /// Name of the concrete type stored in this value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Recover the concrete value, failing with `TypeMismatch` if the stored
    /// type is not `T`.
    pub fn downcast<T: Any>(self) -> Result<T, VMError> {
        let found = self.type_name;
        self.inner
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| VMError::type_mismatch(type_name::<T>(), found))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>", self.type_name)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast_mismatch_reports_types() {
        let err = Value::new(5i32).downcast::<String>().unwrap_err();
        match err {
            VMError::TypeMismatch { expected, found } => {
                assert!(expected.contains("String"));
                assert_eq!(found, "i32");
            }
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_value_nested_value_unwraps_one_layer() {
        let nested = Value::new(Value::new(7u8));
        let inner = nested.downcast::<Value>().unwrap();
        assert_eq!(inner.downcast::<u8>().unwrap(), 7);
    }

    #[test]
    fn test_value_debug_shows_type() {
        let v = Value::new(vec![1u32, 2]);
        assert_eq!(format!("{v:?}"), "Value<alloc::vec::Vec<u32>>");
        assert_eq!(v.downcast_ref::<Vec<u32>>().map(Vec::len), Some(2));
    }
}
