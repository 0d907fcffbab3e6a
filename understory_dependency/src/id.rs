// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifiers used throughout the engine.
//!
//! - [`PropertyId`] / [`Property<T>`]: registry handles for properties.
//! - [`TypeKey`]: handle for a registered owner type.
//! - [`ObjectId`]: generational handle for a property-bearing object.
//! - [`OwnerRef`]: non-owning `(object, property)` back-reference.
//! - [`OverrideSource`]: token naming whoever drives an override.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) that uniquely identifies a property
/// within a [`PropertyRegistry`](crate::PropertyRegistry).
///
/// ```rust
/// use understory_dependency::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    ///
    /// This is typically called by [`PropertyRegistry::register`](crate::PropertyRegistry::register)
    /// rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// A type-safe property key.
///
/// Wraps a [`PropertyId`] with a phantom value type so that reads and writes
/// are checked at compile time. Handles are only minted by the registry, which
/// records the matching [`TypeId`](core::any::TypeId); accessors still verify
/// it and report [`PropertyError::TypeMismatch`](crate::PropertyError::TypeMismatch)
/// for handles built by hand with [`Property::from_id`].
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a new typed property from a property ID.
    #[must_use]
    #[inline]
    pub const fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying property ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }
}

// Manual trait implementations to avoid requiring T: Clone, etc.

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}

/// Handle for an owner type registered with
/// [`PropertyRegistry::register_type`](crate::PropertyRegistry::register_type).
///
/// Owner types form a single-inheritance table; property lookup and metadata
/// resolution walk from a type to its ancestors.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeKey(u16);

impl TypeKey {
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this type key.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

/// Identifier for a property-bearing object in a
/// [`PropertySystem`](crate::PropertySystem).
///
/// A slot index plus a generation counter:
///
/// - On creation, a fresh slot is allocated with generation `1`.
/// - On destruction, the slot is freed; existing ids for that slot become stale.
/// - On reuse of a freed slot, its generation is incremented.
///
/// Stale ids never alias a different live object because the generation must
/// match. Use [`PropertySystem::is_alive`](crate::PropertySystem::is_alive) to
/// check liveness.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjectId(pub(crate) u32, pub(crate) u32);

impl ObjectId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn generation(self) -> u32 {
        self.1
    }
}

/// A non-owning reference from a value to the `(object, property)` that holds it.
///
/// Collections produced by a factory default carry one of these so that
/// mutations can be routed back to their owner through
/// [`PropertySystem::invalidate_owner`](crate::PropertySystem::invalidate_owner).
/// It never keeps the object alive.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OwnerRef {
    /// The owning object.
    pub object: ObjectId,
    /// The property on `object` holding the value.
    pub property: PropertyId,
}

impl OwnerRef {
    /// Creates a new back-reference.
    #[must_use]
    #[inline]
    pub const fn new(object: ObjectId, property: PropertyId) -> Self {
        Self { object, property }
    }
}

/// Identifies the driver of an override, typically an animation clock.
///
/// Removal must name the same source that installed the override.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OverrideSource(pub u64);
