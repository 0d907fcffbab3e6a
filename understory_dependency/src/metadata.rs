// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertyMetadata`] for storing property configuration,
//! [`PropertyMetadataBuilder`] for ergonomic construction, and
//! [`MetadataOverride`] for per-subtype changes to an existing property.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use smallvec::SmallVec;

use crate::collection::ChildObjects;
use crate::dispatch::PropertyChange;
use crate::error::{PropertyError, Rejection};
use crate::id::{ObjectId, OwnerRef};
use crate::system::PropertySystem;
use crate::value::{ErasedValue, PropertyValue};

bitflags::bitflags! {
    /// Static behavior flags of a property.
    ///
    /// The `AFFECTS_*` flags are not interpreted by the engine; they are
    /// reported on every [`Notification`](crate::Notification) so that layout and
    /// rendering collaborators can decide what to invalidate.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u8 {
        /// Changes invalidate measurement.
        const AFFECTS_MEASURE = 0b0000_0001;
        /// Changes invalidate arrangement.
        const AFFECTS_ARRANGE = 0b0000_0010;
        /// Changes invalidate rendering.
        const AFFECTS_RENDER  = 0b0000_0100;
        /// Objects without their own value inherit it from their logical parent.
        const INHERITS        = 0b0000_1000;
        /// Overrides may not be installed on this property.
        const NOT_ANIMATABLE  = 0b0001_0000;
    }
}

/// Callback invoked after a property's effective value changed.
///
/// The callback may read and write other properties through the system.
/// Writes commit immediately; their notifications are dispatched after the
/// current one completes.
pub type PropertyChangedCallback<T> =
    Rc<dyn Fn(&mut PropertySystem<'_>, &PropertyChange<'_, T>) -> Result<(), PropertyError>>;

/// Callback for coercing a candidate value before it is stored.
///
/// Returning a different value substitutes it (clamping); returning an error
/// rejects the write and leaves stored state unchanged.
pub type CoerceValueCallback<T> =
    Rc<dyn Fn(&PropertySystem<'_>, ObjectId, T) -> Result<T, Rejection>>;

/// Predicate checked against every candidate value and the literal default.
pub type ValidateValueCallback<T> = Rc<dyn Fn(&T) -> bool>;

/// Zero-argument producer of a fresh per-object default.
pub type DefaultFactory<T> = Rc<dyn Fn() -> T>;

/// Wires a value to the `(object, property)` that now holds it.
pub type AttachCallback<T> = Rc<dyn Fn(&mut T, OwnerRef)>;

enum DefaultKind<T> {
    Literal(ErasedValue),
    Factory(DefaultFactory<T>),
}

impl<T> Clone for DefaultKind<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Factory(factory) => Self::Factory(factory.clone()),
        }
    }
}

struct ChildHooks<T> {
    collect: fn(&T, &mut Vec<ObjectId>),
    remap: fn(&mut T, &mut dyn FnMut(ObjectId) -> ObjectId),
}

impl<T> Clone for ChildHooks<T> {
    fn clone(&self) -> Self {
        Self {
            collect: self.collect,
            remap: self.remap,
        }
    }
}

fn coerce_fn<T, F>(callback: F) -> CoerceValueCallback<T>
where
    F: Fn(&PropertySystem<'_>, ObjectId, T) -> Result<T, Rejection> + 'static,
{
    Rc::new(callback)
}

fn clamp_fn<T: 'static, F>(callback: F) -> CoerceValueCallback<T>
where
    F: Fn(T) -> T + 'static,
{
    coerce_fn(move |_, _, value| Ok(callback(value)))
}

/// Metadata for a dependency property.
///
/// Holds the default (a literal, or a factory for mutable defaults), flags,
/// and the change, coercion, validation, and attach callbacks. Metadata is
/// immutable once registered.
///
/// ```rust
/// use understory_dependency::{PropertyFlags, PropertyMetadataBuilder};
///
/// let metadata = PropertyMetadataBuilder::new(100.0_f64)
///     .inherits(true)
///     .flags(PropertyFlags::AFFECTS_MEASURE)
///     .build();
///
/// assert_eq!(metadata.default_value(), Some(&100.0));
/// assert!(metadata.inherits());
/// assert!(metadata.flags().contains(PropertyFlags::AFFECTS_MEASURE));
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default: DefaultKind<T>,
    flags: PropertyFlags,
    attach: Option<AttachCallback<T>>,
    changed: SmallVec<[PropertyChangedCallback<T>; 1]>,
    coerce: Option<CoerceValueCallback<T>>,
    validate: Option<ValidateValueCallback<T>>,
    children: Option<ChildHooks<T>>,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Creates new property metadata with the given literal default and no callbacks.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns the literal default, or `None` for a factory default.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> Option<&T> {
        match &self.default {
            DefaultKind::Literal(value) => value.downcast_ref(),
            DefaultKind::Factory(_) => None,
        }
    }

    /// Returns `true` if defaults are produced per object by a factory.
    #[must_use]
    #[inline]
    pub fn has_factory_default(&self) -> bool {
        matches!(self.default, DefaultKind::Factory(_))
    }

    /// Returns the property's flags.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Returns whether this property inherits from parent objects.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.flags.contains(PropertyFlags::INHERITS)
    }

    /// Returns whether overrides may be installed.
    #[must_use]
    #[inline]
    pub fn is_animatable(&self) -> bool {
        !self.flags.contains(PropertyFlags::NOT_ANIMATABLE)
    }

    /// Returns whether any changed callback is set.
    #[must_use]
    #[inline]
    pub fn has_changed_callback(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Returns whether a coerce callback is set.
    #[must_use]
    #[inline]
    pub fn has_coerce_callback(&self) -> bool {
        self.coerce.is_some()
    }

    /// Returns whether values of this property report child objects.
    #[must_use]
    #[inline]
    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    /// Runs the validation predicate; `true` when no predicate is set.
    #[must_use]
    pub fn validate(&self, value: &T) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate(value))
    }

    /// Coerces a value using the coerce callback if one is set.
    pub fn coerce(
        &self,
        system: &PropertySystem<'_>,
        object: ObjectId,
        value: T,
    ) -> Result<T, Rejection> {
        match &self.coerce {
            Some(coerce) => coerce(system, object, value),
            None => Ok(value),
        }
    }

    /// Produces a fresh default for `owner` and attaches it.
    ///
    /// Returns `None` for literal defaults.
    #[must_use]
    pub fn create_default(&self, owner: OwnerRef) -> Option<T> {
        let DefaultKind::Factory(factory) = &self.default else {
            return None;
        };
        let mut value = factory();
        self.attach(&mut value, owner);
        Some(value)
    }

    /// Invokes the attach callback if one is set.
    pub fn attach(&self, value: &mut T, owner: OwnerRef) {
        if let Some(attach) = &self.attach {
            attach(value, owner);
        }
    }

    pub(crate) fn literal_default(&self) -> Option<&ErasedValue> {
        match &self.default {
            DefaultKind::Literal(value) => Some(value),
            DefaultKind::Factory(_) => None,
        }
    }

    pub(crate) fn changed_callbacks(&self) -> &[PropertyChangedCallback<T>] {
        &self.changed
    }

    pub(crate) fn collect_children(&self, value: &T, out: &mut Vec<ObjectId>) {
        if let Some(hooks) = &self.children {
            (hooks.collect)(value, out);
        }
    }

    pub(crate) fn remap_children(&self, value: &mut T, map: &mut dyn FnMut(ObjectId) -> ObjectId) {
        if let Some(hooks) = &self.children {
            (hooks.remap)(value, map);
        }
    }
}

impl<T: PropertyValue> Clone for PropertyMetadata<T> {
    fn clone(&self) -> Self {
        Self {
            default: self.default.clone(),
            flags: self.flags,
            attach: self.attach.clone(),
            changed: self.changed.clone(),
            coerce: self.coerce.clone(),
            validate: self.validate.clone(),
            children: self.children.clone(),
        }
    }
}

// Manual Debug impl since callbacks aren't Debug
impl<T: PropertyValue + fmt::Debug> fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value())
            .field("factory_default", &self.has_factory_default())
            .field("flags", &self.flags)
            .field("changed_callbacks", &self.changed.len())
            .field("has_coerce_callback", &self.coerce.is_some())
            .field("has_validate_callback", &self.validate.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PropertyMetadata`].
///
/// ```rust
/// use understory_dependency::{PropertyFlags, PropertyMetadataBuilder};
///
/// let metadata = PropertyMetadataBuilder::new(0.0_f64)
///     .flags(PropertyFlags::AFFECTS_RENDER)
///     .validate(|v: &f64| v.is_finite())
///     .coerce(|v| v.clamp(0.0, 1.0))
///     .build();
/// assert!(metadata.has_coerce_callback());
/// ```
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    metadata: PropertyMetadata<T>,
}

impl<T: PropertyValue + fmt::Debug> fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Creates a new builder with a literal default value.
    ///
    /// Literal defaults are shared by every object; use
    /// [`with_factory`](Self::with_factory) for mutable defaults such as collections.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self::from_default(DefaultKind::Literal(ErasedValue::new(default_value)))
    }

    /// Creates a new builder whose default is produced per object by `factory`.
    ///
    /// The factory runs on first access, at most once per object until the
    /// value is cleared.
    #[must_use]
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::from_default(DefaultKind::Factory(Rc::new(factory)))
    }

    fn from_default(default: DefaultKind<T>) -> Self {
        Self {
            metadata: PropertyMetadata {
                default,
                flags: PropertyFlags::empty(),
                attach: None,
                changed: SmallVec::new(),
                coerce: None,
                validate: None,
                children: None,
            },
        }
    }

    /// Adds flags to the property.
    #[must_use]
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.metadata.flags |= flags;
        self
    }

    /// Sets whether this property inherits from parent objects.
    #[must_use]
    pub fn inherits(mut self, inherits: bool) -> Self {
        self.metadata.flags.set(PropertyFlags::INHERITS, inherits);
        self
    }

    /// Forbids overrides on this property.
    #[must_use]
    pub fn not_animatable(mut self) -> Self {
        self.metadata.flags |= PropertyFlags::NOT_ANIMATABLE;
        self
    }

    /// Sets the callback that wires a stored value to its owner.
    ///
    /// Runs on materialized defaults, on explicitly set values, and on values
    /// copied into an animation clone.
    #[must_use]
    pub fn on_attach<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut T, OwnerRef) + 'static,
    {
        self.metadata.attach = Some(Rc::new(callback));
        self
    }

    /// Adds a callback to be invoked when the effective value changes.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut PropertySystem<'_>, &PropertyChange<'_, T>) -> Result<(), PropertyError>
            + 'static,
    {
        self.metadata.changed.push(Rc::new(callback));
        self
    }

    /// Sets an infallible coercion, typically a clamp.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> T + 'static,
    {
        self.metadata.coerce = Some(clamp_fn(callback));
        self
    }

    /// Sets a coercion that can read the object and reject values.
    #[must_use]
    pub fn coerce_with<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PropertySystem<'_>, ObjectId, T) -> Result<T, Rejection> + 'static,
    {
        self.metadata.coerce = Some(coerce_fn(callback));
        self
    }

    /// Sets the validation predicate.
    #[must_use]
    pub fn validate<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.metadata.validate = Some(Rc::new(callback));
        self
    }

    /// Declares that values hold child objects.
    ///
    /// Children are re-parented under the owning property when the value
    /// changes, their own property changes are reported on the owner, and
    /// they are deep-copied by animation clones.
    #[must_use]
    pub fn children(mut self) -> Self
    where
        T: ChildObjects,
    {
        self.metadata.children = Some(ChildHooks {
            collect: T::collect_children,
            remap: T::remap_children,
        });
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        self.metadata
    }
}

/// Partial metadata applied to a subtype with
/// [`PropertyRegistry::override_metadata`](crate::PropertyRegistry::override_metadata).
///
/// Unset parts are inherited from the nearest ancestor. The default, flags,
/// coercion, and attach callback replace the inherited ones; change callbacks
/// run after the inherited ones.
pub struct MetadataOverride<T: PropertyValue> {
    default: Option<DefaultKind<T>>,
    flags: Option<PropertyFlags>,
    attach: Option<AttachCallback<T>>,
    changed: Option<PropertyChangedCallback<T>>,
    coerce: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> fmt::Debug for MetadataOverride<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataOverride")
            .field("has_default", &self.default.is_some())
            .field("flags", &self.flags)
            .field("has_changed_callback", &self.changed.is_some())
            .field("has_coerce_callback", &self.coerce.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: PropertyValue> Default for MetadataOverride<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PropertyValue> MetadataOverride<T> {
    /// Creates an override that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: None,
            flags: None,
            attach: None,
            changed: None,
            coerce: None,
        }
    }

    /// Replaces the default with a literal.
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(DefaultKind::Literal(ErasedValue::new(value)));
        self
    }

    /// Replaces the default with a per-object factory.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        self.default = Some(DefaultKind::Factory(Rc::new(factory)));
        self
    }

    /// Replaces the flags.
    #[must_use]
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Replaces the attach callback.
    #[must_use]
    pub fn on_attach<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut T, OwnerRef) + 'static,
    {
        self.attach = Some(Rc::new(callback));
        self
    }

    /// Adds a change callback that runs after the inherited ones.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut PropertySystem<'_>, &PropertyChange<'_, T>) -> Result<(), PropertyError>
            + 'static,
    {
        self.changed = Some(Rc::new(callback));
        self
    }

    /// Replaces the coercion with an infallible one.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> T + 'static,
    {
        self.coerce = Some(clamp_fn(callback));
        self
    }

    /// Replaces the coercion with a context-aware one.
    #[must_use]
    pub fn coerce_with<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PropertySystem<'_>, ObjectId, T) -> Result<T, Rejection> + 'static,
    {
        self.coerce = Some(coerce_fn(callback));
        self
    }

    /// Merges this override onto `base`, producing a complete metadata entry.
    pub(crate) fn apply_to(self, base: &PropertyMetadata<T>) -> PropertyMetadata<T> {
        let mut merged = base.clone();
        if let Some(default) = self.default {
            merged.default = default;
        }
        if let Some(flags) = self.flags {
            merged.flags = flags;
        }
        if let Some(attach) = self.attach {
            merged.attach = Some(attach);
        }
        if let Some(changed) = self.changed {
            merged.changed.push(changed);
        }
        if let Some(coerce) = self.coerce {
            merged.coerce = Some(coerce);
        }
        merged
    }
}
