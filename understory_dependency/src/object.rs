// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handles for objects living in a [`PropertySystem`].
//!
//! Host types that wrap an [`ObjectId`] implement [`DependencyObject`] and
//! get typed accessors from [`DependencyObjectExt`]:
//!
//! ```rust
//! use understory_dependency::{
//!     DependencyObject, DependencyObjectExt, ObjectId, Property,
//!     PropertyMetadataBuilder, PropertyRegistry, PropertySystem,
//! };
//!
//! struct GradientStop(ObjectId);
//!
//! impl DependencyObject for GradientStop {
//!     fn object_id(&self) -> ObjectId {
//!         self.0
//!     }
//! }
//!
//! let mut registry = PropertyRegistry::new();
//! let stop_type = registry.register_type("GradientStop", None).unwrap();
//! let offset: Property<f64> = registry
//!     .register(stop_type, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
//!     .unwrap();
//!
//! let mut system = PropertySystem::new(&registry);
//! let stop = GradientStop(system.create_object(stop_type).unwrap());
//!
//! stop.set(&mut system, offset, 0.5).unwrap();
//! assert_eq!(stop.get(&mut system, offset).unwrap(), 0.5);
//! ```

use crate::error::PropertyError;
use crate::id::{ObjectId, OverrideSource, Property};
use crate::system::PropertySystem;
use crate::value::PropertyValue;

/// An object whose property values live in a [`PropertySystem`].
pub trait DependencyObject {
    /// Returns the id of the object in its property system.
    fn object_id(&self) -> ObjectId;
}

impl DependencyObject for ObjectId {
    fn object_id(&self) -> ObjectId {
        *self
    }
}

/// Typed property access for [`DependencyObject`]s.
///
/// Each method forwards to the [`PropertySystem`] method of the same name.
pub trait DependencyObjectExt: DependencyObject {
    /// Returns the effective value of `property`.
    fn get<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
    ) -> Result<T, PropertyError> {
        system.get(self.object_id(), property)
    }

    /// Sets the base value of `property`.
    fn set<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
        value: T,
    ) -> Result<(), PropertyError> {
        system.set(self.object_id(), property, value)
    }

    /// Removes the base value of `property`.
    fn clear<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        system.clear(self.object_id(), property)
    }

    /// Updates the base value of `property` in place.
    fn modify<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), PropertyError> {
        system.modify(self.object_id(), property, f)
    }

    /// Installs an override on `property`.
    fn install_override<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
        value: T,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        system.install_override(self.object_id(), property, value, source)
    }

    /// Removes the override `source` installed on `property`.
    fn remove_override<T: PropertyValue>(
        &self,
        system: &mut PropertySystem<'_>,
        property: Property<T>,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        system.remove_override(self.object_id(), property, source)
    }
}

impl<D: DependencyObject + ?Sized> DependencyObjectExt for D {}
