// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property descriptor registry.
//!
//! This module provides [`PropertyRegistry`]: the catalog of owner types and
//! property descriptors. Registration happens once, at type setup, and entries
//! are never removed. Per-subtype metadata overrides are stored as separate
//! entries and found by walking the type table from an object's type to its
//! ancestors.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt;
use hashbrown::HashMap;

use crate::dispatch::{Notification, PropertyChange};
use crate::error::{PropertyError, Rejection};
use crate::id::{ObjectId, OwnerRef, Property, PropertyId, TypeKey};
use crate::metadata::{MetadataOverride, PropertyFlags, PropertyMetadata};
use crate::system::PropertySystem;
use crate::value::{ErasedValue, PropertyValue};

/// Hook invoked for every property change on objects of an owner type.
///
/// Runs after the property's own change callbacks.
pub type TypeChangedHook =
    Rc<dyn Fn(&mut PropertySystem<'_>, &Notification) -> Result<(), PropertyError>>;

struct TypeEntry {
    name: &'static str,
    base: Option<TypeKey>,
    hook: Option<TypeChangedHook>,
}

/// A registration entry for a property.
///
/// This stores the property's identity, value type, and declaring metadata.
pub struct PropertyRegistration {
    name: &'static str,
    owner_type: TypeKey,
    type_id: TypeId,
    type_name: &'static str,
    metadata: Box<dyn ErasedMetadata>,
}

impl PropertyRegistration {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declaring owner type.
    #[must_use]
    #[inline]
    pub fn owner_type(&self) -> TypeKey {
        self.owner_type
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the flags of the declaring metadata.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> PropertyFlags {
        self.metadata.flags()
    }
}

impl fmt::Debug for PropertyRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("owner_type", &self.owner_type)
            .field("value_type", &self.type_name)
            .field("flags", &self.flags())
            .finish_non_exhaustive()
    }
}

/// A registry of owner types and dependency properties.
///
/// Owner types are registered first, optionally deriving from a base type.
/// Properties are identified by `(owner type, name)`; the same name on
/// unrelated types yields independent properties.
///
/// ```rust
/// use understory_dependency::{PropertyError, PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let stop = registry.register_type("Stop", None)?;
/// let offset = registry.register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())?;
///
/// assert_eq!(registry.lookup(stop, "Offset"), Some(offset.id()));
/// assert!(matches!(
///     registry.register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build()),
///     Err(PropertyError::DuplicateRegistration { .. })
/// ));
/// # Ok::<(), PropertyError>(())
/// ```
#[derive(Default)]
pub struct PropertyRegistry {
    types: Vec<TypeEntry>,
    types_by_name: HashMap<&'static str, TypeKey>,
    properties: Vec<PropertyRegistration>,
    by_identity: HashMap<(TypeKey, &'static str), PropertyId>,
    overrides: HashMap<(PropertyId, TypeKey), Box<dyn ErasedMetadata>>,
}

impl PropertyRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Owner types
    // =========================================================================

    /// Registers an owner type, optionally deriving from `base`.
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 owner types are registered.
    pub fn register_type(
        &mut self,
        name: &'static str,
        base: Option<TypeKey>,
    ) -> Result<TypeKey, PropertyError> {
        self.insert_type(name, base, None)
    }

    /// Registers an owner type with a hook called for every property change
    /// on its objects (and objects of derived types).
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 owner types are registered.
    pub fn register_type_with_hook<F>(
        &mut self,
        name: &'static str,
        base: Option<TypeKey>,
        hook: F,
    ) -> Result<TypeKey, PropertyError>
    where
        F: Fn(&mut PropertySystem<'_>, &Notification) -> Result<(), PropertyError> + 'static,
    {
        self.insert_type(name, base, Some(Rc::new(hook)))
    }

    fn insert_type(
        &mut self,
        name: &'static str,
        base: Option<TypeKey>,
        hook: Option<TypeChangedHook>,
    ) -> Result<TypeKey, PropertyError> {
        if self.types_by_name.contains_key(name) {
            return Err(PropertyError::DuplicateType(name));
        }
        if let Some(base) = base {
            self.type_entry(base)?;
        }
        assert!(
            self.types.len() < u16::MAX as usize,
            "Too many owner types registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let key = TypeKey::new(self.types.len() as u16);
        self.types.push(TypeEntry { name, base, hook });
        self.types_by_name.insert(name, key);
        tracing::debug!(owner_type = name, ?base, "registered owner type");
        Ok(key)
    }

    fn type_entry(&self, key: TypeKey) -> Result<&TypeEntry, PropertyError> {
        self.types
            .get(key.index() as usize)
            .ok_or(PropertyError::UnknownType(key))
    }

    /// Looks up an owner type by name.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<TypeKey> {
        self.types_by_name.get(name).copied()
    }

    /// Returns the name of an owner type.
    #[must_use]
    pub fn type_name(&self, key: TypeKey) -> Option<&'static str> {
        self.types.get(key.index() as usize).map(|t| t.name)
    }

    /// Returns the base type of an owner type.
    #[must_use]
    pub fn base_type(&self, key: TypeKey) -> Option<TypeKey> {
        self.types.get(key.index() as usize).and_then(|t| t.base)
    }

    /// Iterates `key` and then its ancestors, nearest first.
    pub fn ancestors(&self, key: TypeKey) -> impl Iterator<Item = TypeKey> + '_ {
        let start = self.types.get(key.index() as usize).map(|_| key);
        core::iter::successors(start, |k| self.base_type(*k))
    }

    /// Returns `true` if `key` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, key: TypeKey, ancestor: TypeKey) -> bool {
        self.ancestors(key).any(|k| k == ancestor)
    }

    pub(crate) fn type_hooks(&self, key: TypeKey) -> impl Iterator<Item = &TypeChangedHook> + '_ {
        self.ancestors(key)
            .filter_map(|k| self.types[k.index() as usize].hook.as_ref())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Registers a new property on `owner_type`.
    ///
    /// Returns a type-safe [`Property<T>`] handle. Fails with
    /// [`PropertyError::DuplicateRegistration`] if `owner_type` already
    /// declares `name`, and with [`PropertyError::Validation`] if the literal
    /// default fails the metadata's own validation.
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 properties are registered.
    pub fn register<T: PropertyValue>(
        &mut self,
        owner_type: TypeKey,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Result<Property<T>, PropertyError> {
        let owner = self.type_entry(owner_type)?.name;
        if self.by_identity.contains_key(&(owner_type, name)) {
            return Err(PropertyError::DuplicateRegistration { owner, name });
        }
        if metadata.default_value().is_some_and(|d| !metadata.validate(d)) {
            return Err(PropertyError::Validation { name });
        }
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        self.properties.push(PropertyRegistration {
            name,
            owner_type,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            metadata: Box::new(metadata),
        });
        self.by_identity.insert((owner_type, name), id);
        tracing::debug!(owner_type = owner, property = name, id = id.index(), "registered property");

        Ok(Property::from_id(id))
    }

    /// Overrides the metadata of `property` for `owner_type` and its subtypes.
    ///
    /// The override is merged onto the metadata of the nearest ancestor and
    /// stored as a distinct entry; the declaring metadata is never mutated.
    pub fn override_metadata<T: PropertyValue>(
        &mut self,
        property: Property<T>,
        owner_type: TypeKey,
        metadata: MetadataOverride<T>,
    ) -> Result<(), PropertyError> {
        let id = property.id();
        let registration = self.checked::<T>(id)?;
        let name = registration.name;
        let declaring = registration.owner_type;
        let owner = self.type_entry(owner_type)?.name;

        if owner_type == declaring || !self.is_subtype(owner_type, declaring) {
            return Err(PropertyError::UnrelatedType { name, owner_type });
        }
        if self.overrides.contains_key(&(id, owner_type)) {
            return Err(PropertyError::DuplicateRegistration { owner, name });
        }

        let base_type = self.base_type(owner_type).unwrap_or(declaring);
        let merged = {
            let base = self
                .metadata(property, base_type)
                .ok_or(PropertyError::TypeMismatch { name })?;
            metadata.apply_to(base)
        };
        if merged.default_value().is_some_and(|d| !merged.validate(d)) {
            return Err(PropertyError::Validation { name });
        }

        self.overrides.insert((id, owner_type), Box::new(merged));
        tracing::debug!(owner_type = owner, property = name, "overrode property metadata");
        Ok(())
    }

    /// Looks up a property by name on `owner_type` or its nearest ancestor
    /// declaring it.
    #[must_use]
    pub fn lookup(&self, owner_type: TypeKey, name: &str) -> Option<PropertyId> {
        self.ancestors(owner_type)
            .find_map(|k| self.by_identity.get(&(k, name)).copied())
    }

    /// Returns the number of registered properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns the name of a property.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.properties.get(id.index() as usize).map(|r| r.name)
    }

    /// Returns the registration for a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration> {
        self.properties.get(id.index() as usize)
    }

    /// Returns the declaring metadata for a typed property.
    ///
    /// Returns `None` if the property is not registered or the type doesn't match.
    #[must_use]
    pub fn get_metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Option<&PropertyMetadata<T>> {
        self.properties
            .get(property.id().index() as usize)
            .and_then(|r| r.metadata.downcast_ref())
    }

    /// Returns the metadata that applies to objects of `owner_type`.
    ///
    /// This is the nearest override on `owner_type` or its ancestors, or the
    /// declaring metadata when no override applies.
    #[must_use]
    pub fn metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
        owner_type: TypeKey,
    ) -> Option<&PropertyMetadata<T>> {
        self.erased_metadata(property.id(), owner_type)
            .ok()
            .and_then(|m| m.downcast_ref())
    }

    /// Returns the flags that apply to objects of `owner_type`.
    #[must_use]
    pub fn flags(&self, id: PropertyId, owner_type: TypeKey) -> PropertyFlags {
        self.erased_metadata(id, owner_type)
            .map(|m| m.flags())
            .unwrap_or_default()
    }

    /// Returns an iterator over all registered properties.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            (PropertyId::new(i as u16), r)
        })
    }

    pub(crate) fn registration(&self, id: PropertyId) -> Result<&PropertyRegistration, PropertyError> {
        self.properties
            .get(id.index() as usize)
            .ok_or(PropertyError::UnknownProperty(id))
    }

    /// Returns the registration if it holds values of type `T`.
    pub(crate) fn checked<T: 'static>(
        &self,
        id: PropertyId,
    ) -> Result<&PropertyRegistration, PropertyError> {
        let registration = self.registration(id)?;
        if registration.type_id == TypeId::of::<T>() {
            Ok(registration)
        } else {
            Err(PropertyError::TypeMismatch {
                name: registration.name,
            })
        }
    }

    pub(crate) fn erased_metadata(
        &self,
        id: PropertyId,
        owner_type: TypeKey,
    ) -> Result<&dyn ErasedMetadata, PropertyError> {
        let registration = self.registration(id)?;
        if !self.overrides.is_empty() {
            for key in self.ancestors(owner_type) {
                if let Some(metadata) = self.overrides.get(&(id, key)) {
                    return Ok(metadata.as_ref());
                }
            }
        }
        Ok(registration.metadata.as_ref())
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("types", &self.types.iter().map(|t| t.name).collect::<Vec<_>>())
            .field(
                "properties",
                &self.properties.iter().map(|p| p.name).collect::<Vec<_>>(),
            )
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

/// Type-erased metadata trait for heterogeneous storage.
pub(crate) trait ErasedMetadata: Any {
    fn as_any(&self) -> &dyn Any;
    fn flags(&self) -> PropertyFlags;
    fn literal_default(&self) -> Option<&ErasedValue>;
    fn create_default(&self, owner: OwnerRef) -> Option<ErasedValue>;
    fn attach(&self, value: &mut ErasedValue, owner: OwnerRef);
    fn validate(&self, value: &ErasedValue) -> bool;
    fn has_coercion(&self) -> bool;
    fn coerce(
        &self,
        system: &PropertySystem<'_>,
        object: ObjectId,
        value: ErasedValue,
    ) -> Result<ErasedValue, Rejection>;
    fn has_children(&self) -> bool;
    fn collect_children(&self, value: &ErasedValue, out: &mut Vec<ObjectId>);
    fn remap_children(&self, value: &mut ErasedValue, map: &mut dyn FnMut(ObjectId) -> ObjectId);
    fn notify(
        &self,
        system: &mut PropertySystem<'_>,
        notification: &Notification,
    ) -> Result<(), PropertyError>;
}

impl<T: PropertyValue> ErasedMetadata for PropertyMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn flags(&self) -> PropertyFlags {
        Self::flags(self)
    }

    fn literal_default(&self) -> Option<&ErasedValue> {
        Self::literal_default(self)
    }

    fn create_default(&self, owner: OwnerRef) -> Option<ErasedValue> {
        Self::create_default(self, owner).map(ErasedValue::new)
    }

    fn attach(&self, value: &mut ErasedValue, owner: OwnerRef) {
        if let Some(value) = value.downcast_mut::<T>() {
            Self::attach(self, value, owner);
        }
    }

    fn validate(&self, value: &ErasedValue) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| Self::validate(self, v))
    }

    fn has_coercion(&self) -> bool {
        self.has_coerce_callback()
    }

    fn coerce(
        &self,
        system: &PropertySystem<'_>,
        object: ObjectId,
        value: ErasedValue,
    ) -> Result<ErasedValue, Rejection> {
        if !self.has_coerce_callback() {
            return Ok(value);
        }
        let typed = value
            .get::<T>()
            .ok_or_else(|| Rejection::new("value type does not match the property"))?;
        Self::coerce(self, system, object, typed).map(ErasedValue::new)
    }

    fn has_children(&self) -> bool {
        Self::has_children(self)
    }

    fn collect_children(&self, value: &ErasedValue, out: &mut Vec<ObjectId>) {
        if let Some(value) = value.downcast_ref::<T>() {
            Self::collect_children(self, value, out);
        }
    }

    fn remap_children(&self, value: &mut ErasedValue, map: &mut dyn FnMut(ObjectId) -> ObjectId) {
        if let Some(value) = value.downcast_mut::<T>() {
            Self::remap_children(self, value, map);
        }
    }

    fn notify(
        &self,
        system: &mut PropertySystem<'_>,
        notification: &Notification,
    ) -> Result<(), PropertyError> {
        let callbacks = self.changed_callbacks();
        if callbacks.is_empty() {
            return Ok(());
        }
        let (Some(old), Some(new)) = (
            notification.old_value().downcast_ref::<T>(),
            notification.new_value().downcast_ref::<T>(),
        ) else {
            return Err(PropertyError::TypeMismatch {
                name: system.registry().name(notification.property()).unwrap_or(""),
            });
        };
        let change = PropertyChange {
            object: notification.object(),
            property: Property::from_id(notification.property()),
            old,
            new,
            kind: notification.kind(),
        };
        for callback in callbacks {
            callback(system, &change)?;
        }
        Ok(())
    }
}

impl dyn ErasedMetadata {
    fn downcast_ref<T: PropertyValue>(&self) -> Option<&PropertyMetadata<T>> {
        self.as_any().downcast_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::{format, vec, vec::Vec};

    fn registry_with_stop() -> (PropertyRegistry, TypeKey) {
        let mut registry = PropertyRegistry::new();
        let stop = registry.register_type("Stop", None).unwrap();
        (registry, stop)
    }

    #[test]
    fn registry_new() {
        let registry = PropertyRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_and_lookup() {
        let (mut registry, stop) = registry_with_stop();
        let offset = registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(offset.id().index(), 0);
        assert_eq!(registry.lookup(stop, "Offset"), Some(offset.id()));
        assert_eq!(registry.lookup(stop, "Color"), None);
        assert_eq!(registry.name(offset.id()), Some("Offset"));
        assert_eq!(registry.get(offset.id()).unwrap().owner_type(), stop);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let (mut registry, stop) = registry_with_stop();
        registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let err = registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(1.0_f64).build())
            .unwrap_err();
        assert_eq!(
            err,
            PropertyError::DuplicateRegistration {
                owner: "Stop",
                name: "Offset"
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_name_on_unrelated_types_is_independent() {
        let (mut registry, stop) = registry_with_stop();
        let brush = registry.register_type("Brush", None).unwrap();
        let a = registry
            .register(stop, "Opacity", PropertyMetadataBuilder::new(1.0_f64).build())
            .unwrap();
        let b = registry
            .register(brush, "Opacity", PropertyMetadataBuilder::new(0.5_f64).build())
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.lookup(stop, "Opacity"), Some(a.id()));
        assert_eq!(registry.lookup(brush, "Opacity"), Some(b.id()));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let (mut registry, _) = registry_with_stop();
        assert_eq!(
            registry.register_type("Stop", None),
            Err(PropertyError::DuplicateType("Stop"))
        );
    }

    #[test]
    fn unknown_base_type_is_rejected() {
        let mut registry = PropertyRegistry::new();
        let bogus = TypeKey::new(9);
        assert_eq!(
            registry.register_type("Orphan", Some(bogus)),
            Err(PropertyError::UnknownType(bogus))
        );
    }

    #[test]
    fn lookup_walks_ancestors() {
        let mut registry = PropertyRegistry::new();
        let brush = registry.register_type("Brush", None).unwrap();
        let gradient = registry.register_type("GradientBrush", Some(brush)).unwrap();
        let linear = registry
            .register_type("LinearGradientBrush", Some(gradient))
            .unwrap();
        let opacity = registry
            .register(brush, "Opacity", PropertyMetadataBuilder::new(1.0_f64).build())
            .unwrap();

        assert_eq!(registry.lookup(linear, "Opacity"), Some(opacity.id()));
        assert!(registry.is_subtype(linear, brush));
        assert!(!registry.is_subtype(brush, linear));
        assert_eq!(
            registry.ancestors(linear).collect::<Vec<_>>(),
            vec![linear, gradient, brush]
        );
    }

    #[test]
    fn override_metadata_applies_to_subtypes_only() {
        let mut registry = PropertyRegistry::new();
        let brush = registry.register_type("Brush", None).unwrap();
        let solid = registry.register_type("SolidBrush", Some(brush)).unwrap();
        let other = registry.register_type("Other", None).unwrap();
        let opacity = registry
            .register(brush, "Opacity", PropertyMetadataBuilder::new(1.0_f64).build())
            .unwrap();

        registry
            .override_metadata(opacity, solid, MetadataOverride::new().default_value(0.25))
            .unwrap();

        assert_eq!(
            registry.metadata(opacity, brush).unwrap().default_value(),
            Some(&1.0)
        );
        assert_eq!(
            registry.metadata(opacity, solid).unwrap().default_value(),
            Some(&0.25)
        );
        // The declaring metadata is untouched.
        assert_eq!(
            registry.get_metadata(opacity).unwrap().default_value(),
            Some(&1.0)
        );

        assert!(matches!(
            registry.override_metadata(opacity, solid, MetadataOverride::new()),
            Err(PropertyError::DuplicateRegistration { .. })
        ));
        assert!(matches!(
            registry.override_metadata(opacity, other, MetadataOverride::new()),
            Err(PropertyError::UnrelatedType { .. })
        ));
        assert!(matches!(
            registry.override_metadata(opacity, brush, MetadataOverride::new()),
            Err(PropertyError::UnrelatedType { .. })
        ));
    }

    #[test]
    fn override_chains_through_intermediate_types() {
        let mut registry = PropertyRegistry::new();
        let a = registry.register_type("A", None).unwrap();
        let b = registry.register_type("B", Some(a)).unwrap();
        let c = registry.register_type("C", Some(b)).unwrap();
        let width = registry
            .register(
                a,
                "Width",
                PropertyMetadataBuilder::new(1_i32)
                    .on_changed(|_, _| Ok(()))
                    .build(),
            )
            .unwrap();

        registry
            .override_metadata(
                width,
                b,
                MetadataOverride::new()
                    .default_value(2)
                    .on_changed(|_, _| Ok(())),
            )
            .unwrap();

        // C has no override of its own; it sees B's.
        let c_meta = registry.metadata(width, c).unwrap();
        assert_eq!(c_meta.default_value(), Some(&2));
        assert_eq!(c_meta.changed_callbacks().len(), 2);
    }

    #[test]
    fn invalid_default_is_rejected() {
        let (mut registry, stop) = registry_with_stop();
        let err = registry
            .register(
                stop,
                "Offset",
                PropertyMetadataBuilder::new(f64::NAN)
                    .validate(|v: &f64| v.is_finite())
                    .build(),
            )
            .unwrap_err();
        assert_eq!(err, PropertyError::Validation { name: "Offset" });
    }

    #[test]
    fn typed_checks() {
        let (mut registry, stop) = registry_with_stop();
        let offset = registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        assert!(registry.checked::<f64>(offset.id()).is_ok());
        assert_eq!(
            registry.checked::<i32>(offset.id()).unwrap_err(),
            PropertyError::TypeMismatch { name: "Offset" }
        );
        assert_eq!(
            registry.checked::<f64>(PropertyId::new(77)).unwrap_err(),
            PropertyError::UnknownProperty(PropertyId::new(77))
        );
        let wrong: Property<i32> = Property::from_id(offset.id());
        assert!(registry.get_metadata(wrong).is_none());
    }

    #[test]
    fn registry_debug() {
        let (mut registry, stop) = registry_with_stop();
        registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();

        let debug = format!("{:?}", registry);
        assert!(debug.contains("PropertyRegistry"));
        assert!(debug.contains("Offset"));
        assert!(debug.contains("Stop"));
    }
}
