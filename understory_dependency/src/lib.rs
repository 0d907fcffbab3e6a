// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Dependency: a dependency-property value engine.
//!
//! Objects are described by typed properties registered once per owner type.
//! Each object stores only the values that were written to it; everything
//! else resolves through inheritance or the registered default, so objects
//! stay small and property defaults are shared.
//!
//! ## Core Concepts
//!
//! - [`PropertyRegistry`] holds owner types and property registrations with
//!   their [`PropertyMetadata`]: default (a literal or a per-object factory),
//!   [`PropertyFlags`], and change, coercion, validation, and attach callbacks.
//!   Subtypes can refine metadata with [`MetadataOverride`].
//! - [`PropertySystem`] owns the objects and their [`PropertyStore`]s and
//!   resolves effective values.
//! - Writes that change an effective value produce [`Notification`]s, which
//!   are dispatched in FIFO order after the write commits. Callbacks may write
//!   other properties; those changes are queued, never delivered re-entrantly.
//!
//! ## Value Resolution
//!
//! The effective value of a property on an object is the first of:
//!
//! 1. the active override, installed by an [`OverrideSource`] such as an
//!    animation clock,
//! 2. the coerced base value,
//! 3. for inheriting properties, the nearest logical ancestor's value,
//! 4. the registered default.
//!
//! Coercion applies to every candidate, including inherited and default
//! values, so a read never returns a value the property's coercion would
//! change or reject.
//!
//! Factory defaults are produced on first access, attached to their owner,
//! and stored, so repeated reads see the same instance and mutable defaults
//! such as [`PropertyCollection`]s are never shared between objects.
//!
//! ## Quick Start
//!
//! ```rust
//! use understory_dependency::{
//!     OverrideSource, Property, PropertyMetadataBuilder, PropertyRegistry, PropertySystem,
//! };
//!
//! let mut registry = PropertyRegistry::new();
//! let stop = registry.register_type("GradientStop", None).unwrap();
//! let offset: Property<f64> = registry
//!     .register(
//!         stop,
//!         "Offset",
//!         PropertyMetadataBuilder::new(0.0_f64)
//!             .coerce(|v: f64| v.clamp(0.0, 1.0))
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let mut system = PropertySystem::new(&registry);
//! let a = system.create_object(stop).unwrap();
//! let b = system.create_object(stop).unwrap();
//!
//! system.set(a, offset, 1.5).unwrap();
//! assert_eq!(system.get(a, offset).unwrap(), 1.0);
//! assert_eq!(system.get(b, offset).unwrap(), 0.0);
//!
//! // Overrides compose on top of the base value.
//! let clock = OverrideSource(1);
//! system.install_override(a, offset, 0.25, clock).unwrap();
//! system.set(a, offset, 0.5).unwrap();
//! assert_eq!(system.get(a, offset).unwrap(), 0.25);
//! system.remove_override(a, offset, clock).unwrap();
//! assert_eq!(system.get(a, offset).unwrap(), 0.5);
//! ```
//!
//! ## Animation Clones
//!
//! An animation that must mutate a shared object clones it with
//! [`PropertySystem::clone_for_animation`] and overrides the property
//! referencing it with the clone. Clones copy base values, deep-copy held
//! child objects, and report themselves through [`CloneOnAnimation`].
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod animation;
mod clone;
mod collection;
mod dispatch;
mod error;
mod id;
mod metadata;
mod object;
mod registry;
mod store;
mod system;
mod value;

pub use clone::CloneOnAnimation;
pub use collection::{ChildObjects, PropertyCollection};
pub use dispatch::{ChangeKind, Notification, PropertyChange};
pub use error::{OverrideStateError, PropertyError, Rejection};
pub use id::{ObjectId, OverrideSource, OwnerRef, Property, PropertyId, TypeKey};
pub use metadata::{
    AttachCallback, CoerceValueCallback, DefaultFactory, MetadataOverride, PropertyChangedCallback,
    PropertyFlags, PropertyMetadata, PropertyMetadataBuilder, ValidateValueCallback,
};
pub use object::{DependencyObject, DependencyObjectExt};
pub use registry::{PropertyRegistration, PropertyRegistry, TypeChangedHook};
pub use store::{BaseSource, OverrideState, PropertyStore, ValueEntry};
pub use system::{DispatchConfig, PropertySystem};
pub use value::{ErasedValue, PropertyValue};
