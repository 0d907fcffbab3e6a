// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-erased property values.
//!
//! Values of every property live in the same per-object store, so they are
//! boxed behind [`ErasedValue`]. Besides downcasting, an erased value can be
//! cloned and compared, which is what the change dispatcher needs to snapshot
//! old and new values and to short-circuit idempotent writes.

use alloc::boxed::Box;
use core::any::{Any, TypeId};
use core::fmt;

/// Bound shared by every property value type.
///
/// Values are cloned into notification snapshots and compared to decide
/// whether an effective value changed.
pub trait PropertyValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> PropertyValue for T {}

/// A type-erased property value.
///
/// ```rust
/// use understory_dependency::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_i64));
/// ```
pub struct ErasedValue {
    inner: Box<dyn ErasedValueTrait>,
    type_id: TypeId,
}

impl ErasedValue {
    /// Creates a new erased value from a concrete value.
    #[must_use]
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            inner: Box::new(value),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            self.inner.as_any().downcast_ref()
        } else {
            None
        }
    }

    /// Attempts to downcast to a mutable reference of type `T`.
    #[must_use]
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.is::<T>() {
            self.inner.as_any_mut().downcast_mut()
        } else {
            None
        }
    }

    /// Clones the contained value out as `T`.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl Clone for ErasedValue {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            type_id: self.type_id,
        }
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.inner.eq_dyn(other.inner.as_any())
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Trait object for type-erased values that can be cloned and compared.
trait ErasedValueTrait: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait>;
    fn eq_dyn(&self, other: &dyn Any) -> bool;
}

impl<T: PropertyValue> ErasedValueTrait for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn erased_value_downcast() {
        let value = ErasedValue::new(42_i32);
        assert!(value.is::<i32>());
        assert!(!value.is::<f64>());
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        assert_eq!(value.downcast_ref::<f64>(), None);
        assert_eq!(value.get::<i32>(), Some(42));
    }

    #[test]
    fn erased_value_downcast_mut() {
        let mut value = ErasedValue::new(vec![1, 2]);
        value.downcast_mut::<Vec<i32>>().unwrap().push(3);
        assert_eq!(value.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
        assert!(value.downcast_mut::<String>().is_none());
    }

    #[test]
    fn erased_value_clone_is_independent() {
        let value = ErasedValue::new(vec![1]);
        let mut cloned = value.clone();
        cloned.downcast_mut::<Vec<i32>>().unwrap().push(2);

        assert_eq!(value.downcast_ref::<Vec<i32>>(), Some(&vec![1]));
        assert_eq!(cloned.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2]));
    }

    #[test]
    fn erased_value_equality() {
        assert_eq!(ErasedValue::new(0.5_f64), ErasedValue::new(0.5_f64));
        assert_ne!(ErasedValue::new(0.5_f64), ErasedValue::new(0.25_f64));
        // Same bits, different types.
        assert_ne!(ErasedValue::new(1_u32), ErasedValue::new(1_i32));
        assert_eq!(
            ErasedValue::new(String::from("a")),
            ErasedValue::new(String::from("a"))
        );
    }

    #[test]
    fn erased_value_debug() {
        let debug = format!("{:?}", ErasedValue::new(42_i32));
        assert!(debug.contains("ErasedValue"));
        assert!(debug.contains("type_id"));
    }
}
