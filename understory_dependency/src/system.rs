// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The property system: objects, value resolution, and writes.
//!
//! [`PropertySystem`] owns every property-bearing object and its
//! [`PropertyStore`]. Reads resolve, highest precedence first:
//!
//! 1. the active override (not one being released),
//! 2. the coerced base value,
//! 3. for [`INHERITS`](crate::PropertyFlags::INHERITS) properties, the nearest
//!    logical ancestor's value,
//! 4. the metadata default, materializing a factory default on first access.
//!
//! Inherited and default values pass through the property's coercion as well.
//! When coercion changes one, [`get_ref`](PropertySystem::get_ref) keeps the
//! result as a [`BaseSource::Coerced`] entry until the property is cleared, an
//! inherited value changes, or [`coerce_value`](PropertySystem::coerce_value)
//! runs again. Coercion callbacks must not read their own property.
//!
//! Writes validate, attach, and coerce the candidate before anything is
//! stored, then dispatch a notification if the effective value changed.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use crate::dispatch::{ChangeKind, Notification};
use crate::error::PropertyError;
use crate::id::{ObjectId, OwnerRef, Property, PropertyId, TypeKey};
use crate::metadata::PropertyFlags;
use crate::registry::PropertyRegistry;
use crate::store::{BaseSource, PropertyStore, ValueEntry};
use crate::value::{ErasedValue, PropertyValue};

/// Runtime configuration of a [`PropertySystem`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on notifications dispatched by one drain.
    ///
    /// Change callbacks that keep writing each other's properties would
    /// otherwise never settle; exceeding the bound aborts the drain with
    /// [`PropertyError::NotificationOverflow`].
    pub max_notifications: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_notifications: 4096,
        }
    }
}

pub(crate) struct ObjectData {
    pub(crate) type_key: TypeKey,
    /// Created on the first write or materialization.
    pub(crate) store: Option<PropertyStore>,
    /// Logical parent, used for value inheritance.
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
    /// The `(object, property)` whose value holds this object.
    pub(crate) structural_parent: Option<OwnerRef>,
    pub(crate) clone_of: Option<ObjectId>,
}

impl ObjectData {
    fn new(type_key: TypeKey) -> Self {
        Self {
            type_key,
            store: None,
            parent: None,
            children: Vec::new(),
            structural_parent: None,
            clone_of: None,
        }
    }

    pub(crate) fn entry(&self, property: PropertyId) -> Option<&ValueEntry> {
        self.store.as_ref()?.entry(property)
    }

    pub(crate) fn entry_mut(&mut self, property: PropertyId) -> Option<&mut ValueEntry> {
        self.store.as_mut()?.entry_mut(property)
    }
}

struct Slot {
    generation: u32,
    data: Option<ObjectData>,
}

/// Owner of all property-bearing objects and entry point for reading,
/// writing, and overriding their properties.
///
/// The system borrows a [`PropertyRegistry`] that was fully populated at type
/// setup. Objects are addressed by generational [`ObjectId`]s; each object
/// gets its [`PropertyStore`] lazily.
///
/// All access is single-threaded. Change callbacks receive `&mut` access to
/// the system and may write further properties; see
/// [`Notification`] for the dispatch order.
///
/// ```rust
/// use understory_dependency::{PropertyMetadataBuilder, PropertyRegistry, PropertySystem};
///
/// let mut registry = PropertyRegistry::new();
/// let stop = registry.register_type("Stop", None)?;
/// let offset = registry.register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())?;
///
/// let mut system = PropertySystem::new(&registry);
/// let a = system.create_object(stop)?;
/// let b = system.create_object(stop)?;
///
/// system.set(a, offset, 0.5)?;
/// assert_eq!(system.get(a, offset)?, 0.5);
/// assert_eq!(system.get(b, offset)?, 0.0);
/// # Ok::<(), understory_dependency::PropertyError>(())
/// ```
pub struct PropertySystem<'r> {
    pub(crate) registry: &'r PropertyRegistry,
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub(crate) queue: VecDeque<Notification>,
    pub(crate) draining: bool,
    pub(crate) config: DispatchConfig,
}

impl fmt::Debug for PropertySystem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySystem")
            .field("objects", &self.object_count())
            .field("queued", &self.queue.len())
            .field("draining", &self.draining)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'r> PropertySystem<'r> {
    /// Creates an empty system with the default [`DispatchConfig`].
    #[must_use]
    pub fn new(registry: &'r PropertyRegistry) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    /// Creates an empty system with the given configuration.
    #[must_use]
    pub fn with_config(registry: &'r PropertyRegistry, config: DispatchConfig) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            free: Vec::new(),
            queue: VecDeque::new(),
            draining: false,
            config,
        }
    }

    /// Returns the registry this system resolves against.
    #[must_use]
    #[inline]
    pub fn registry(&self) -> &'r PropertyRegistry {
        self.registry
    }

    /// Returns the dispatch configuration.
    #[must_use]
    #[inline]
    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Creates an object of the given owner type.
    pub fn create_object(&mut self, type_key: TypeKey) -> Result<ObjectId, PropertyError> {
        if self.registry.type_name(type_key).is_none() {
            return Err(PropertyError::UnknownType(type_key));
        }
        Ok(self.alloc(type_key))
    }

    pub(crate) fn alloc(&mut self, type_key: TypeKey) -> ObjectId {
        let data = ObjectData::new(type_key);
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.data = Some(data);
            return ObjectId::new(idx, slot.generation);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "more than u32::MAX live objects is unsupported"
        )]
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            data: Some(data),
        });
        ObjectId::new(idx, 1)
    }

    /// Destroys an object and its value store.
    ///
    /// Logical children become roots and objects structurally held by it lose
    /// their owner. No notifications are sent; the id becomes stale.
    pub fn destroy_object(&mut self, object: ObjectId) -> Result<(), PropertyError> {
        let data = self.data(object)?;
        let parent = data.parent;
        let children = data.children.clone();

        if let Some(parent) = parent
            && let Ok(parent) = self.data_mut(parent)
        {
            parent.children.retain(|c| *c != object);
        }
        for child in children {
            if let Ok(child) = self.data_mut(child) {
                child.parent = None;
            }
        }
        for slot in &mut self.slots {
            if let Some(data) = &mut slot.data
                && data.structural_parent.is_some_and(|o| o.object == object)
            {
                data.structural_parent = None;
            }
        }

        self.slots[object.idx()].data = None;
        self.free.push(object.0);
        tracing::trace!(object = ?object, "destroyed object");
        Ok(())
    }

    /// Returns `true` if `object` refers to a live object.
    #[must_use]
    pub fn is_alive(&self, object: ObjectId) -> bool {
        self.data(object).is_ok()
    }

    /// Returns the number of live objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns the owner type of an object.
    pub fn type_of(&self, object: ObjectId) -> Result<TypeKey, PropertyError> {
        Ok(self.data(object)?.type_key)
    }

    /// Returns the logical parent of an object.
    pub fn parent(&self, object: ObjectId) -> Result<Option<ObjectId>, PropertyError> {
        Ok(self.data(object)?.parent)
    }

    /// Returns the logical children of an object.
    pub fn children(&self, object: ObjectId) -> Result<&[ObjectId], PropertyError> {
        Ok(&self.data(object)?.children)
    }

    /// Sets the logical parent of `child`, or detaches it with `None`.
    ///
    /// Inheriting properties whose resolved value changes on `child` notify
    /// with [`ChangeKind::Inherited`], and so on down the subtree.
    pub fn set_parent(
        &mut self,
        child: ObjectId,
        parent: Option<ObjectId>,
    ) -> Result<(), PropertyError> {
        let old_parent = self.data(child)?.parent;
        if let Some(parent) = parent {
            let mut next = Some(parent);
            while let Some(current) = next {
                if current == child {
                    return Err(PropertyError::ParentCycle { child });
                }
                next = self.data(current)?.parent;
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        let inherited = self.inherited_values(child)?;

        if let Some(old_parent) = old_parent
            && let Ok(old_parent) = self.data_mut(old_parent)
        {
            old_parent.children.retain(|c| *c != child);
        }
        if let Some(parent) = parent {
            self.data_mut(parent)?.children.push(child);
        }
        self.data_mut(child)?.parent = parent;

        let type_key = self.data(child)?.type_key;
        for (property, old) in inherited {
            if self
                .data(child)?
                .entry(property)
                .is_some_and(ValueEntry::is_coerced_fallback)
            {
                self.store_mut(child)?.clear_base(property);
            }
            let Some(new) = self.snapshot(child, property)? else {
                continue;
            };
            if new != old {
                let flags = self.registry.flags(property, type_key);
                self.enqueue(Notification::new(
                    child,
                    property,
                    old,
                    new,
                    ChangeKind::Inherited,
                    flags,
                ));
            }
        }
        self.drain()
    }

    /// Resolved values of inheriting properties that `object` does not store itself.
    fn inherited_values(
        &self,
        object: ObjectId,
    ) -> Result<Vec<(PropertyId, ErasedValue)>, PropertyError> {
        let registry = self.registry;
        let data = self.data(object)?;
        let mut values = Vec::new();
        for (property, _) in registry.iter() {
            if !registry
                .flags(property, data.type_key)
                .contains(PropertyFlags::INHERITS)
                || data.entry(property).and_then(ValueEntry::local_value).is_some()
            {
                continue;
            }
            if let Some(value) = self.snapshot(object, property)? {
                values.push((property, value));
            }
        }
        Ok(values)
    }

    pub(crate) fn data(&self, object: ObjectId) -> Result<&ObjectData, PropertyError> {
        self.slots
            .get(object.idx())
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.data.as_ref())
            .ok_or(PropertyError::UnknownObject(object))
    }

    pub(crate) fn data_mut(&mut self, object: ObjectId) -> Result<&mut ObjectData, PropertyError> {
        self.slots
            .get_mut(object.idx())
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.data.as_mut())
            .ok_or(PropertyError::UnknownObject(object))
    }

    pub(crate) fn live_objects(&self) -> impl Iterator<Item = (ObjectId, &ObjectData)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            #[expect(clippy::cast_possible_truncation, reason = "slot count fits u32")]
            let id = ObjectId::new(idx as u32, slot.generation);
            slot.data.as_ref().map(|data| (id, data))
        })
    }

    pub(crate) fn store_mut(&mut self, object: ObjectId) -> Result<&mut PropertyStore, PropertyError> {
        Ok(self.data_mut(object)?.store.get_or_insert_with(PropertyStore::new))
    }

    pub(crate) fn property_name(&self, property: PropertyId) -> &'static str {
        self.registry.name(property).unwrap_or("<unregistered>")
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Returns the value store of an object, if it has one yet.
    pub fn store(&self, object: ObjectId) -> Result<Option<&PropertyStore>, PropertyError> {
        Ok(self.data(object)?.store.as_ref())
    }

    /// Returns the stored entry of a property on an object.
    ///
    /// `None` means the property resolves to its inherited or default value.
    pub fn entry(
        &self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<Option<&ValueEntry>, PropertyError> {
        self.registry.registration(property)?;
        Ok(self.data(object)?.entry(property))
    }

    /// Returns the effective value of a property.
    ///
    /// Materializes a factory default on first access.
    pub fn get<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
    ) -> Result<T, PropertyError> {
        self.get_ref(object, property).cloned()
    }

    /// Returns the effective value of a property by reference.
    ///
    /// Materializes a factory default on first access; repeated reads return
    /// the same stored instance.
    pub fn get_ref<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
    ) -> Result<&T, PropertyError> {
        let id = property.id();
        let name = self.registry.checked::<T>(id)?.name();
        if self.lookup(object, id)?.is_none() {
            self.materialize(object, id)?;
        }
        let unset = self.data(object)?.entry(id).and_then(ValueEntry::effective).is_none();
        if unset && let Some(coerced) = self.coerce_fallback(object, id)? {
            self.pin_fallback(object, id, coerced)?;
        }
        self.lookup(object, id)?
            .and_then(ErasedValue::downcast_ref::<T>)
            .ok_or(PropertyError::TypeMismatch { name })
    }

    /// Returns the effective value without materializing anything.
    ///
    /// Returns `Ok(None)` only for a factory default that was not produced yet.
    /// Coercion callbacks, which only get shared access, read through this.
    /// An inherited or default value is coerced on the fly.
    pub fn peek<T: PropertyValue>(
        &self,
        object: ObjectId,
        property: Property<T>,
    ) -> Result<Option<T>, PropertyError> {
        let id = property.id();
        let name = self.registry.checked::<T>(id)?.name();
        if self.data(object)?.entry(id).and_then(ValueEntry::effective).is_none()
            && let Some(coerced) = self.coerce_fallback(object, id)?
        {
            return coerced
                .get::<T>()
                .map(Some)
                .ok_or(PropertyError::TypeMismatch { name });
        }
        match self.lookup(object, id)? {
            Some(value) => value
                .get::<T>()
                .map(Some)
                .ok_or(PropertyError::TypeMismatch { name }),
            None => Ok(None),
        }
    }

    /// Resolves without materializing or coercing the fallback. `None` means a
    /// factory default is due.
    pub(crate) fn lookup(
        &self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<Option<&ErasedValue>, PropertyError> {
        let data = self.data(object)?;
        if let Some(value) = data.entry(property).and_then(ValueEntry::effective) {
            return Ok(Some(value));
        }
        self.fallback(data, property)
    }

    /// The value below the object's own entry: inherited, else the literal default.
    fn fallback<'a>(
        &'a self,
        data: &ObjectData,
        property: PropertyId,
    ) -> Result<Option<&'a ErasedValue>, PropertyError> {
        let metadata = self.registry.erased_metadata(property, data.type_key)?;
        if metadata.flags().contains(PropertyFlags::INHERITS) {
            let mut next = data.parent;
            while let Some(ancestor) = next.and_then(|p| self.data(p).ok()) {
                if let Some(value) = ancestor.entry(property).and_then(ValueEntry::effective) {
                    return Ok(Some(value));
                }
                next = ancestor.parent;
            }
        }
        Ok(metadata.literal_default())
    }

    /// Coerces the inherited or default value below the object's own entry.
    ///
    /// Returns `None` when there is no such value or coercion keeps it as is.
    fn coerce_fallback(
        &self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<Option<ErasedValue>, PropertyError> {
        let registry = self.registry;
        let data = self.data(object)?;
        let metadata = registry.erased_metadata(property, data.type_key)?;
        if !metadata.has_coercion() {
            return Ok(None);
        }
        let Some(candidate) = self.fallback(data, property)? else {
            return Ok(None);
        };
        let name = registry.registration(property)?.name();
        let mut coerced = metadata
            .coerce(self, object, candidate.clone())
            .map_err(|rejection| PropertyError::Coercion { name, rejection })?;
        if coerced == *candidate {
            return Ok(None);
        }
        metadata.attach(&mut coerced, OwnerRef::new(object, property));
        Ok(Some(coerced))
    }

    /// Stores a coerced fallback as a [`BaseSource::Coerced`] base value.
    fn pin_fallback(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        coerced: ErasedValue,
    ) -> Result<(), PropertyError> {
        let Some(raw) = self.fallback(self.data(object)?, property)?.cloned() else {
            return Ok(());
        };
        tracing::trace!(
            object = ?object,
            property = self.property_name(property),
            "kept coerced fallback"
        );
        self.store_mut(object)?
            .set_base(property, raw, coerced, BaseSource::Coerced);
        Ok(())
    }

    /// Owned effective value without touching the store. `None` means a
    /// factory default is due.
    ///
    /// A fallback that coercion rejects is returned uncoerced, so change
    /// snapshots never fail on it.
    fn snapshot(
        &self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<Option<ErasedValue>, PropertyError> {
        if self.data(object)?.entry(property).and_then(ValueEntry::effective).is_none() {
            match self.coerce_fallback(object, property) {
                Ok(Some(coerced)) => return Ok(Some(coerced)),
                Ok(None) | Err(PropertyError::Coercion { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(self.lookup(object, property)?.cloned())
    }

    /// Resolves to an owned snapshot, materializing if needed.
    pub(crate) fn resolve_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<ErasedValue, PropertyError> {
        if self.lookup(object, property)?.is_none() {
            self.materialize(object, property)?;
        }
        self.snapshot(object, property)?
            .ok_or(PropertyError::UnknownProperty(property))
    }

    /// Runs the factory default of `property` on `object`, coerces it, and
    /// stores it as the base value.
    fn materialize(&mut self, object: ObjectId, property: PropertyId) -> Result<(), PropertyError> {
        let registry = self.registry;
        let name = registry.registration(property)?.name();
        let metadata = registry.erased_metadata(property, self.data(object)?.type_key)?;
        let owner = OwnerRef::new(object, property);
        let Some(value) = metadata.create_default(owner) else {
            return Ok(());
        };
        let mut coerced = metadata
            .coerce(self, object, value.clone())
            .map_err(|rejection| PropertyError::Coercion { name, rejection })?;
        metadata.attach(&mut coerced, owner);
        tracing::trace!(object = ?object, property = name, "materialized default");
        self.reparent_children(metadata, owner, None, &coerced);
        self.store_mut(object)?
            .set_base(property, value, coerced, BaseSource::Default);
        Ok(())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Sets the base value of a property.
    ///
    /// The value is validated, attached, and coerced before it is stored. If
    /// validation or coercion fails, nothing is stored. If the effective value
    /// changed, change callbacks run before this returns (or, when called from
    /// a callback, after the current notification).
    ///
    /// While an override is active the new base value is stored underneath it
    /// and becomes visible when the override is removed.
    ///
    /// A value equal to the literal default is not stored, except on
    /// inheriting properties, where it keeps the object from inheriting its
    /// parent's value. Values of [`children`](crate::PropertyMetadataBuilder::children)
    /// properties that would hold the object itself or one of its holders
    /// fail with [`PropertyError::ParentCycle`].
    pub fn set<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
        value: T,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<T>(property.id())?;
        self.write_base(object, property.id(), ErasedValue::new(value), BaseSource::Local)
    }

    /// Sets a base value from an erased value.
    pub fn set_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        value: ErasedValue,
    ) -> Result<(), PropertyError> {
        let registration = self.registry.registration(property)?;
        if registration.type_id() != value.type_id() {
            return Err(PropertyError::TypeMismatch {
                name: registration.name(),
            });
        }
        self.write_base(object, property, value, BaseSource::Local)
    }

    pub(crate) fn write_base(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        mut value: ErasedValue,
        source: BaseSource,
    ) -> Result<(), PropertyError> {
        let registry = self.registry;
        let name = registry.registration(property)?.name();
        let metadata = registry.erased_metadata(property, self.data(object)?.type_key)?;
        if !metadata.validate(&value) {
            return Err(PropertyError::Validation { name });
        }
        self.check_structural_cycle(metadata, object, &value)?;
        let owner = OwnerRef::new(object, property);
        metadata.attach(&mut value, owner);
        let mut coerced = metadata
            .coerce(self, object, value.clone())
            .map_err(|rejection| PropertyError::Coercion { name, rejection })?;
        self.check_structural_cycle(metadata, object, &coerced)?;
        metadata.attach(&mut coerced, owner);

        let old = self.resolve_erased(object, property)?;
        let redundant = !metadata.flags().contains(PropertyFlags::INHERITS)
            && coerced == value
            && metadata.literal_default() == Some(&value);
        if redundant {
            if let Some(store) = self.data_mut(object)?.store.as_mut() {
                store.clear_base(property);
            }
            tracing::trace!(object = ?object, property = name, "base value equals the default");
        } else {
            self.store_mut(object)?
                .set_base(property, value, coerced, source);
            tracing::trace!(object = ?object, property = name, ?source, "committed base value");
        }
        self.notify_if_changed(object, property, old)
    }

    /// Removes the base value, reverting to the inherited or default value.
    ///
    /// A factory default is produced afresh on the next access. Clearing a
    /// property without a base value does nothing.
    pub fn clear<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<T>(property.id())?;
        self.clear_erased(object, property.id())
    }

    pub(crate) fn clear_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<(), PropertyError> {
        let has_base = self
            .data(object)?
            .entry(property)
            .is_some_and(|e| e.base_value().is_some());
        if !has_base {
            return Ok(());
        }
        let old = self.resolve_erased(object, property)?;
        self.store_mut(object)?.clear_base(property);
        tracing::trace!(
            object = ?object,
            property = self.property_name(property),
            "cleared base value"
        );
        self.notify_if_changed(object, property, old)
    }

    /// Updates the base value in place through `f`.
    ///
    /// Starts from the stored base value, else the coerced inherited or default
    /// value (materializing a factory default). The result is written like
    /// [`set`](Self::set), so mutating a collection notifies exactly once.
    /// A materialized default stays marked [`BaseSource::Default`].
    pub fn modify<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), PropertyError> {
        let id = property.id();
        let name = self.registry.checked::<T>(id)?.name();

        let has_base = self
            .data(object)?
            .entry(id)
            .is_some_and(|e| e.base_value().is_some());
        if !has_base && self.fallback(self.data(object)?, id)?.is_none() {
            self.materialize(object, id)?;
        }

        let data = self.data(object)?;
        let entry = data.entry(id);
        let (current, source) = match entry.and_then(|e| e.base_source().zip(e.base_value())) {
            Some((BaseSource::Coerced, _)) => (
                entry
                    .and_then(ValueEntry::coerced_value)
                    .and_then(ErasedValue::get::<T>),
                BaseSource::Local,
            ),
            Some((source, value)) => (value.get::<T>(), source),
            None => {
                let coerced = self.coerce_fallback(object, id)?;
                let value = match &coerced {
                    Some(coerced) => Some(coerced),
                    None => self.fallback(data, id)?,
                };
                (value.and_then(ErasedValue::get::<T>), BaseSource::Local)
            }
        };
        let mut value = current.ok_or(PropertyError::TypeMismatch { name })?;
        f(&mut value);
        self.write_base(object, id, ErasedValue::new(value), source)
    }

    /// Re-runs coercion on the stored base and override values, or on the
    /// inherited or default value when the object has no base value of its
    /// own.
    ///
    /// Use this when a value the coercion reads (such as a sibling maximum)
    /// changed. Notifies if the effective value changed; a fallback that was
    /// never kept counts as its uncoerced value. If coercion rejects a value,
    /// nothing is updated.
    pub fn coerce_value<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<T>(property.id())?;
        self.coerce_erased(object, property.id())
    }

    pub(crate) fn coerce_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<(), PropertyError> {
        let registry = self.registry;
        let name = registry.registration(property)?.name();
        let data = self.data(object)?;
        let metadata = registry.erased_metadata(property, data.type_key)?;
        let entry = data.entry(property);
        let pinned = entry.is_some_and(ValueEntry::is_coerced_fallback);
        let base_raw = entry
            .filter(|e| !e.is_coerced_fallback())
            .and_then(ValueEntry::base_value)
            .cloned();
        let override_raw = entry.and_then(ValueEntry::override_raw).cloned();

        let owner = OwnerRef::new(object, property);
        let coerce = |raw: ErasedValue| {
            metadata
                .coerce(self, object, raw)
                .map(|mut coerced| {
                    metadata.attach(&mut coerced, owner);
                    coerced
                })
                .map_err(|rejection| PropertyError::Coercion { name, rejection })
        };
        let refresh_fallback = base_raw.is_none();
        let base = base_raw.map(&coerce).transpose()?;
        let overlay = override_raw.map(&coerce).transpose()?;
        let fallback = if refresh_fallback {
            self.coerce_fallback(object, property)?
        } else {
            None
        };

        let old = match self.lookup(object, property)?.cloned() {
            Some(value) => value,
            None => self.resolve_erased(object, property)?,
        };
        if let Some(entry) = self.data_mut(object)?.entry_mut(property) {
            if let (Some(coerced), Some(stored)) = (base, entry.base_mut()) {
                stored.set_coerced(coerced);
            }
            if let (Some(coerced), Some(stored)) = (overlay, entry.override_mut()) {
                stored.set_coerced(coerced);
            }
        }
        match fallback {
            Some(coerced) => self.pin_fallback(object, property, coerced)?,
            None if pinned => {
                self.store_mut(object)?.clear_base(property);
            }
            None => {}
        }
        self.notify_if_changed(object, property, old)
    }

    /// Dispatches a [`ChangeKind::Value`] notification if the effective value
    /// differs from `old`.
    pub(crate) fn notify_if_changed(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        old: ErasedValue,
    ) -> Result<(), PropertyError> {
        let new = self.resolve_erased(object, property)?;
        if old == new {
            return Ok(());
        }
        let flags = self.registry.flags(property, self.data(object)?.type_key);
        self.enqueue(Notification::new(
            object,
            property,
            old,
            new,
            ChangeKind::Value,
            flags,
        ));
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use crate::metadata::PropertyMetadataBuilder;
    use crate::store::OverrideState;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::Cell;

    #[test]
    fn objects_are_generational() {
        let mut registry = PropertyRegistry::new();
        let stop = registry.register_type("Stop", None).unwrap();
        let mut system = PropertySystem::new(&registry);

        let a = system.create_object(stop).unwrap();
        system.destroy_object(a).unwrap();
        let b = system.create_object(stop).unwrap();

        assert_eq!(a.idx(), b.idx());
        assert!(!system.is_alive(a));
        assert!(system.is_alive(b));
        assert_eq!(system.object_count(), 1);
        assert_eq!(
            system.destroy_object(a),
            Err(PropertyError::UnknownObject(a))
        );
    }

    #[test]
    fn create_object_checks_type() {
        let registry = PropertyRegistry::new();
        let mut system = PropertySystem::new(&registry);
        let bogus = TypeKey::new(3);
        assert_eq!(
            system.create_object(bogus),
            Err(PropertyError::UnknownType(bogus))
        );
    }

    #[test]
    fn store_is_created_lazily() {
        let mut registry = PropertyRegistry::new();
        let stop = registry.register_type("Stop", None).unwrap();
        let offset = registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(stop).unwrap();

        assert_eq!(system.get(a, offset).unwrap(), 0.0);
        assert!(system.store(a).unwrap().is_none());

        system.set(a, offset, 0.5).unwrap();
        assert_eq!(system.store(a).unwrap().map(PropertyStore::len), Some(1));
    }

    #[test]
    fn factory_default_materializes_once() {
        let calls = Rc::new(Cell::new(0));
        let calls_in_factory = calls.clone();
        let mut registry = PropertyRegistry::new();
        let brush = registry.register_type("Brush", None).unwrap();
        let stops = registry
            .register(
                brush,
                "Stops",
                PropertyMetadataBuilder::with_factory(move || {
                    calls_in_factory.set(calls_in_factory.get() + 1);
                    vec![0_u8]
                })
                .build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(brush).unwrap();

        assert_eq!(system.peek(a, stops).unwrap(), None);
        assert_eq!(system.get(a, stops).unwrap(), vec![0]);
        assert_eq!(system.get(a, stops).unwrap(), vec![0]);
        assert_eq!(calls.get(), 1);
        assert_eq!(
            system.entry(a, stops.id()).unwrap().unwrap().base_source(),
            Some(BaseSource::Default)
        );

        // Clearing a materialized default produces a fresh one later.
        system.clear(a, stops).unwrap();
        assert_eq!(system.get(a, stops).unwrap(), vec![0]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn validation_failure_leaves_store_unchanged() {
        let mut registry = PropertyRegistry::new();
        let stop = registry.register_type("Stop", None).unwrap();
        let offset = registry
            .register(
                stop,
                "Offset",
                PropertyMetadataBuilder::new(0.0_f64)
                    .validate(|v: &f64| v.is_finite())
                    .build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(stop).unwrap();

        assert_eq!(
            system.set(a, offset, f64::INFINITY),
            Err(PropertyError::Validation { name: "Offset" })
        );
        assert!(system.entry(a, offset.id()).unwrap().is_none());
    }

    #[test]
    fn wrong_typed_handle_is_rejected() {
        let mut registry = PropertyRegistry::new();
        let stop = registry.register_type("Stop", None).unwrap();
        let offset = registry
            .register(stop, "Offset", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(stop).unwrap();

        let wrong: Property<i32> = Property::from_id(offset.id());
        assert_eq!(
            system.set(a, wrong, 1),
            Err(PropertyError::TypeMismatch { name: "Offset" })
        );
        assert_eq!(
            system.set_erased(a, offset.id(), ErasedValue::new(1_i32)),
            Err(PropertyError::TypeMismatch { name: "Offset" })
        );
        system
            .set_erased(a, offset.id(), ErasedValue::new(0.25_f64))
            .unwrap();
        assert_eq!(system.get(a, offset).unwrap(), 0.25);
    }

    #[test]
    fn inheritance_walks_logical_parents() {
        let mut registry = PropertyRegistry::new();
        let element = registry.register_type("Element", None).unwrap();
        let font_size = registry
            .register(
                element,
                "FontSize",
                PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
            )
            .unwrap();
        let width = registry
            .register(element, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let root = system.create_object(element).unwrap();
        let child = system.create_object(element).unwrap();
        system.set_parent(child, Some(root)).unwrap();

        system.set(root, font_size, 20.0).unwrap();
        system.set(root, width, 100.0).unwrap();

        assert_eq!(system.get(child, font_size).unwrap(), 20.0);
        assert_eq!(system.get(child, width).unwrap(), 0.0);

        system.set(child, font_size, 9.0).unwrap();
        assert_eq!(system.get(child, font_size).unwrap(), 9.0);

        system.set_parent(child, None).unwrap();
        system.clear(child, font_size).unwrap();
        assert_eq!(system.get(child, font_size).unwrap(), 12.0);
        assert!(system.children(root).unwrap().is_empty());
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let mut registry = PropertyRegistry::new();
        let element = registry.register_type("Element", None).unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(element).unwrap();
        let b = system.create_object(element).unwrap();
        system.set_parent(b, Some(a)).unwrap();

        assert_eq!(
            system.set_parent(a, Some(b)),
            Err(PropertyError::ParentCycle { child: a })
        );
        assert_eq!(
            system.set_parent(a, Some(a)),
            Err(PropertyError::ParentCycle { child: a })
        );
        assert_eq!(system.parent(b).unwrap(), Some(a));
    }

    #[test]
    fn modify_starts_from_default() {
        let mut registry = PropertyRegistry::new();
        let brush = registry.register_type("Brush", None).unwrap();
        let tags = registry
            .register(brush, "Tags", PropertyMetadataBuilder::new(vec![1_u8]).build())
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let a = system.create_object(brush).unwrap();

        system.modify(a, tags, |t| t.push(2)).unwrap();
        assert_eq!(system.get(a, tags).unwrap(), vec![1, 2]);
        assert_eq!(
            system.entry(a, tags.id()).unwrap().unwrap().base_source(),
            Some(BaseSource::Local)
        );
    }

    #[test]
    fn coerce_value_reapplies_coercion() {
        let mut registry = PropertyRegistry::new();
        let range = registry.register_type("Range", None).unwrap();
        let maximum = registry
            .register(range, "Maximum", PropertyMetadataBuilder::new(10.0_f64).build())
            .unwrap();
        let value = registry
            .register(
                range,
                "Value",
                PropertyMetadataBuilder::new(0.0_f64)
                    .coerce_with(move |system, object, v: f64| {
                        let max = system
                            .peek(object, maximum)
                            .ok()
                            .flatten()
                            .unwrap_or(f64::MAX);
                        Ok(v.min(max))
                    })
                    .build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let r = system.create_object(range).unwrap();

        system.set(r, value, 8.0).unwrap();
        system.set(r, maximum, 5.0).unwrap();
        // Not yet re-coerced.
        assert_eq!(system.get(r, value).unwrap(), 8.0);

        system.coerce_value(r, value).unwrap();
        assert_eq!(system.get(r, value).unwrap(), 5.0);

        // The raw base value is kept.
        system.set(r, maximum, 20.0).unwrap();
        system.coerce_value(r, value).unwrap();
        assert_eq!(system.get(r, value).unwrap(), 8.0);
        assert_eq!(
            system.entry(r, value.id()).unwrap().unwrap().override_state(),
            OverrideState::Idle
        );
    }

    #[test]
    fn coerce_value_coerces_the_default() {
        let changes = Rc::new(Cell::new(0));
        let changes_in_cb = changes.clone();
        let mut registry = PropertyRegistry::new();
        let range = registry.register_type("Range", None).unwrap();
        let minimum = registry
            .register(range, "Minimum", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let value = registry
            .register(
                range,
                "Value",
                PropertyMetadataBuilder::new(0.0_f64)
                    .coerce_with(move |system, object, v: f64| {
                        let min = system.peek(object, minimum).ok().flatten().unwrap_or(0.0);
                        if min > 100.0 {
                            return Err(Rejection::new("minimum out of range"));
                        }
                        Ok(v.max(min))
                    })
                    .on_changed(move |_, _| {
                        changes_in_cb.set(changes_in_cb.get() + 1);
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let r = system.create_object(range).unwrap();

        system.set(r, minimum, 5.0).unwrap();
        assert_eq!(system.peek(r, value).unwrap(), Some(5.0));
        system.coerce_value(r, value).unwrap();
        assert_eq!(system.get(r, value).unwrap(), 5.0);
        assert_eq!(changes.get(), 1);
        let entry = system.entry(r, value.id()).unwrap().unwrap();
        assert_eq!(entry.base_source(), Some(BaseSource::Coerced));
        assert_eq!(entry.base_value(), Some(&ErasedValue::new(0.0_f64)));

        // Clearing drops the kept value; reads still coerce the default.
        system.clear(r, value).unwrap();
        assert!(system.entry(r, value.id()).unwrap().is_none());
        assert_eq!(system.get(r, value).unwrap(), 5.0);
        assert_eq!(changes.get(), 1);

        // `modify` starts from the coerced value and stores it as local.
        system.modify(r, value, |v| *v += 1.0).unwrap();
        assert_eq!(system.get(r, value).unwrap(), 6.0);
        assert_eq!(
            system.entry(r, value.id()).unwrap().unwrap().base_source(),
            Some(BaseSource::Local)
        );
        system.clear(r, value).unwrap();

        system.set(r, minimum, 0.0).unwrap();
        system.coerce_value(r, value).unwrap();
        assert_eq!(system.get(r, value).unwrap(), 0.0);
        assert!(system.entry(r, value.id()).unwrap().is_none());

        system.set(r, minimum, 200.0).unwrap();
        assert!(matches!(
            system.coerce_value(r, value),
            Err(PropertyError::Coercion { name: "Value", .. })
        ));
        assert!(system.entry(r, value.id()).unwrap().is_none());
        assert!(matches!(
            system.peek(r, value),
            Err(PropertyError::Coercion { name: "Value", .. })
        ));
    }

    #[test]
    fn inherited_values_are_coerced_per_object() {
        let mut registry = PropertyRegistry::new();
        let element = registry.register_type("Element", None).unwrap();
        let min_font = registry
            .register(element, "MinFontSize", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let font_size = registry
            .register(
                element,
                "FontSize",
                PropertyMetadataBuilder::new(12.0_f64)
                    .inherits(true)
                    .coerce_with(move |system, object, v: f64| {
                        let min = system.peek(object, min_font).ok().flatten().unwrap_or(0.0);
                        Ok(v.max(min))
                    })
                    .build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let root = system.create_object(element).unwrap();
        let child = system.create_object(element).unwrap();
        system.set_parent(child, Some(root)).unwrap();
        system.set(child, min_font, 10.0).unwrap();

        system.set(root, font_size, 4.0).unwrap();
        assert_eq!(system.get(root, font_size).unwrap(), 4.0);
        assert_eq!(system.get(child, font_size).unwrap(), 10.0);
        assert!(system.entry(child, font_size.id()).unwrap().unwrap().is_coerced_fallback());

        // A new inherited value replaces the kept one.
        system.set(root, font_size, 20.0).unwrap();
        assert!(system.entry(child, font_size.id()).unwrap().is_none());
        assert_eq!(system.get(child, font_size).unwrap(), 20.0);

        system.set(root, font_size, 6.0).unwrap();
        assert_eq!(system.get(child, font_size).unwrap(), 10.0);

        system.set_parent(child, None).unwrap();
        assert_eq!(system.get(child, font_size).unwrap(), 12.0);
    }

    #[test]
    fn writing_the_default_stores_nothing_unless_inherited() {
        let mut registry = PropertyRegistry::new();
        let element = registry.register_type("Element", None).unwrap();
        let width = registry
            .register(element, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
            .unwrap();
        let font_size = registry
            .register(
                element,
                "FontSize",
                PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
            )
            .unwrap();
        let mut system = PropertySystem::new(&registry);
        let root = system.create_object(element).unwrap();
        let child = system.create_object(element).unwrap();
        system.set_parent(child, Some(root)).unwrap();

        system.set(child, width, 0.0).unwrap();
        assert!(system.store(child).unwrap().is_none());
        system.set(child, width, 3.0).unwrap();
        system.set(child, width, 0.0).unwrap();
        assert!(system.entry(child, width.id()).unwrap().is_none());
        assert_eq!(system.get(child, width).unwrap(), 0.0);

        // An explicit default still shadows the inherited value.
        system.set(root, font_size, 16.0).unwrap();
        system.set(child, font_size, 12.0).unwrap();
        assert_eq!(system.get(child, font_size).unwrap(), 12.0);
        assert_eq!(
            system.entry(child, font_size.id()).unwrap().unwrap().base_source(),
            Some(BaseSource::Local)
        );
    }
}
