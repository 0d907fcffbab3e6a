// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clone-on-animation capability.

/// Produces independent copies for the animation engine to mutate.
///
/// A copy reports itself as a clone so dependent logic can tell an instance
/// that is safe to mutate in place from a shared original.
///
/// ```rust
/// use understory_dependency::{CloneOnAnimation, PropertyCollection};
///
/// let original: PropertyCollection<u8> = [1, 2].into_iter().collect();
/// let mut copy = original.clone_for_animation();
/// copy.push(3);
///
/// assert!(copy.is_clone());
/// assert_eq!(original.len(), 2);
/// ```
pub trait CloneOnAnimation {
    /// Returns `true` if this instance was produced by
    /// [`clone_for_animation`](Self::clone_for_animation).
    fn is_clone(&self) -> bool;

    /// Produces a copy that shares no mutable state with `self`.
    #[must_use]
    fn clone_for_animation(&self) -> Self
    where
        Self: Sized;
}
