// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overrides and clone-on-animation.
//!
//! An override composes on top of the base value of one `(object, property)`
//! pair and is driven by an [`OverrideSource`], typically an animation clock.
//! The base value is never written by this module; removing the override makes
//! resolution return the current base value again, including writes made
//! while the override was active.
//!
//! ```text
//!  Idle ──install──▶ Overridden ──remove──▶ Releasing ──(dispatch done)──▶ Idle
//!                      ▲    │
//!                      └────┘ install (replace)
//! ```
//!
//! Animations that need to mutate an object in place first clone it with
//! [`PropertySystem::clone_for_animation`] and override the referencing
//! property with the clone ([`PropertySystem::install_clone_override`]); the
//! shared original is never touched.

use alloc::vec::Vec;

use crate::clone::CloneOnAnimation;
use crate::error::{OverrideStateError, PropertyError};
use crate::id::{ObjectId, OverrideSource, OwnerRef, Property, PropertyId};
use crate::metadata::PropertyFlags;
use crate::store::{OverrideState, ValueEntry};
use crate::system::PropertySystem;
use crate::value::{ErasedValue, PropertyValue};

fn state_error(name: &'static str, reason: OverrideStateError) -> PropertyError {
    PropertyError::InvalidOverrideState { name, reason }
}

impl PropertySystem<'_> {
    // =========================================================================
    // Overrides
    // =========================================================================

    /// Installs an override, replacing any override already installed.
    ///
    /// The value is validated and coerced like a base value. Fails with
    /// [`OverrideStateError::NotAnimatable`] if the property's metadata
    /// forbids overrides.
    pub fn install_override<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
        value: T,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<T>(property.id())?;
        self.install_override_erased(object, property.id(), ErasedValue::new(value), source)
    }

    pub(crate) fn install_override_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        mut value: ErasedValue,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        let registry = self.registry;
        let name = registry.registration(property)?.name();
        let metadata = registry.erased_metadata(property, self.data(object)?.type_key)?;
        if metadata.flags().contains(PropertyFlags::NOT_ANIMATABLE) {
            return Err(state_error(name, OverrideStateError::NotAnimatable));
        }
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
        self.store_mut(object)?
            .install_override(property, value, coerced, source);
        tracing::trace!(object = ?object, property = name, ?source, "installed override");
        self.notify_if_changed(object, property, old)
    }

    /// Removes the override installed by `source`.
    ///
    /// The slot moves to [`OverrideState::Releasing`] while change callbacks
    /// run, then is cleared. It is cleared before this returns even if a
    /// callback fails, unless a callback installed a new override.
    pub fn remove_override<T: PropertyValue>(
        &mut self,
        object: ObjectId,
        property: Property<T>,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<T>(property.id())?;
        self.remove_override_erased(object, property.id(), source)
    }

    pub(crate) fn remove_override_erased(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        let name = self.registry.registration(property)?.name();
        let entry = self.data(object)?.entry(property);
        match entry.map(ValueEntry::override_state).unwrap_or_default() {
            OverrideState::Idle => {
                return Err(state_error(name, OverrideStateError::NotInstalled));
            }
            OverrideState::Releasing => {
                return Err(state_error(name, OverrideStateError::Releasing));
            }
            OverrideState::Overridden => {}
        }
        if let Some(installed) = entry.and_then(ValueEntry::override_source)
            && installed != source
        {
            return Err(state_error(
                name,
                OverrideStateError::SourceMismatch {
                    installed,
                    requested: source,
                },
            ));
        }

        let old = self.resolve_erased(object, property)?;
        self.store_mut(object)?.begin_release(property);
        tracing::trace!(object = ?object, property = name, ?source, "releasing override");
        let result = self.notify_if_changed(object, property, old);

        if let Ok(data) = self.data_mut(object)
            && data
                .entry(property)
                .is_some_and(|e| e.override_state() == OverrideState::Releasing)
            && let Some(store) = data.store.as_mut()
        {
            store.clear_override(property);
        }
        result
    }

    /// Returns the override state of a property on an object.
    pub fn override_state(
        &self,
        object: ObjectId,
        property: PropertyId,
    ) -> Result<OverrideState, PropertyError> {
        self.registry.registration(property)?;
        Ok(self
            .data(object)?
            .entry(property)
            .map(ValueEntry::override_state)
            .unwrap_or_default())
    }

    /// Removes every override installed by `source`, on every object.
    ///
    /// Each removal notifies like [`remove_override`](Self::remove_override).
    /// All overrides are removed even if a callback fails; the first error is
    /// returned. Returns the number of overrides removed.
    pub fn remove_overrides_from(&mut self, source: OverrideSource) -> Result<usize, PropertyError> {
        let targets: Vec<(ObjectId, PropertyId)> = self
            .live_objects()
            .flat_map(|(object, data)| {
                data.store
                    .iter()
                    .flat_map(move |store| store.overrides_from(source).map(move |p| (object, p)))
            })
            .collect();

        let mut first_error = None;
        let mut removed = 0;
        for (object, property) in targets {
            // An earlier callback may already have removed or replaced it.
            let still_installed = self
                .data(object)
                .ok()
                .and_then(|d| d.entry(property))
                .is_some_and(|e| {
                    e.override_state() == OverrideState::Overridden
                        && e.override_source() == Some(source)
                });
            if !still_installed {
                continue;
            }
            removed += 1;
            if let Err(error) = self.remove_override_erased(object, property, source) {
                first_error.get_or_insert(error);
            }
        }
        tracing::debug!(?source, removed, "removed overrides from source");
        match first_error {
            Some(error) => Err(error),
            None => Ok(removed),
        }
    }

    // =========================================================================
    // Clone-on-animation
    // =========================================================================

    /// Produces an independent copy of `object` for an animation to mutate.
    ///
    /// The copy gets the object's base values (not its overrides), deep
    /// copies of objects held by [`children`](crate::PropertyMetadataBuilder::children)
    /// properties, and re-run attach callbacks, so collections point at the
    /// copy. It shares the original's logical parent and reports itself as a
    /// clone. An object held more than once is copied once. No notifications
    /// are sent.
    pub fn clone_for_animation(&mut self, object: ObjectId) -> Result<ObjectId, PropertyError> {
        let mut copies = Vec::new();
        self.clone_tree(object, &mut copies)
    }

    /// `copies` maps each original already copied in this pass to its copy.
    fn clone_tree(
        &mut self,
        object: ObjectId,
        copies: &mut Vec<(ObjectId, ObjectId)>,
    ) -> Result<ObjectId, PropertyError> {
        let registry = self.registry;
        let data = self.data(object)?;
        let type_key = data.type_key;
        let parent = data.parent;
        let store = data.store.as_ref().map(|store| store.clone_for_animation());

        let clone = self.alloc(type_key);
        copies.push((object, clone));
        let properties: Vec<PropertyId> =
            store.iter().flat_map(|s| s.property_ids()).collect();
        {
            let data = self.data_mut(clone)?;
            data.store = store;
            data.clone_of = Some(object);
            data.parent = parent;
        }
        if let Some(parent) = parent {
            self.data_mut(parent)?.children.push(clone);
        }

        for property in properties {
            let metadata = registry.erased_metadata(property, type_key)?;
            let owner = OwnerRef::new(clone, property);

            let mut mapping = Vec::new();
            if metadata.has_children() {
                let mut originals = Vec::new();
                if let Some(value) = self
                    .data(clone)?
                    .entry(property)
                    .and_then(ValueEntry::base_value)
                {
                    metadata.collect_children(value, &mut originals);
                }
                for child in originals {
                    if let Some(&(_, copy)) = copies.iter().find(|(from, _)| *from == child) {
                        mapping.push((child, copy));
                    } else if self.is_alive(child) {
                        let copy = self.clone_tree(child, copies)?;
                        self.data_mut(copy)?.structural_parent = Some(owner);
                        mapping.push((child, copy));
                    }
                }
            }

            if let Some(stored) = self
                .data_mut(clone)?
                .entry_mut(property)
                .and_then(ValueEntry::base_mut)
            {
                stored.for_each_mut(|value| {
                    if !mapping.is_empty() {
                        metadata.remap_children(value, &mut |id| {
                            mapping
                                .iter()
                                .find(|(from, _)| *from == id)
                                .map_or(id, |(_, to)| *to)
                        });
                    }
                    metadata.attach(value, owner);
                });
            }
        }

        tracing::debug!(original = ?object, clone = ?clone, "cloned object for animation");
        Ok(clone)
    }

    /// Returns `true` if `object` was produced by
    /// [`clone_for_animation`](Self::clone_for_animation).
    pub fn is_clone(&self, object: ObjectId) -> Result<bool, PropertyError> {
        Ok(self.data(object)?.clone_of.is_some())
    }

    /// Returns the object a clone was made from.
    pub fn original_of(&self, object: ObjectId) -> Result<Option<ObjectId>, PropertyError> {
        Ok(self.data(object)?.clone_of)
    }

    /// Returns `object` if it is already a clone, else a new clone of it.
    pub fn mutable_for_animation(&mut self, object: ObjectId) -> Result<ObjectId, PropertyError> {
        if self.is_clone(object)? {
            Ok(object)
        } else {
            self.clone_for_animation(object)
        }
    }

    /// Destroys a clone and the cloned objects it holds.
    ///
    /// Fails with [`OverrideStateError::NotAClone`] for originals, which are
    /// never destroyed by this call.
    pub fn discard_clone(&mut self, clone: ObjectId) -> Result<(), PropertyError> {
        let registry = self.registry;
        let data = self.data(clone)?;
        if data.clone_of.is_none() {
            return Err(state_error("", OverrideStateError::NotAClone(clone)));
        }

        let mut held = Vec::new();
        if let Some(store) = &data.store {
            for (property, entry) in store.iter() {
                let metadata = registry.erased_metadata(property, data.type_key)?;
                if let Some(value) = entry.base_value() {
                    metadata.collect_children(value, &mut held);
                }
            }
        }
        for child in held {
            let cloned_here = self.data(child).is_ok_and(|d| {
                d.clone_of.is_some() && d.structural_parent.is_some_and(|o| o.object == clone)
            });
            if cloned_here {
                self.discard_clone(child)?;
            }
        }

        self.destroy_object(clone)?;
        tracing::debug!(clone = ?clone, "discarded animation clone");
        Ok(())
    }

    /// Clones the object referenced by `property` and overrides the property
    /// with the clone.
    ///
    /// The original stays referenced by the base value and is never mutated.
    /// Returns the clone, which the animation may mutate freely until
    /// [`remove_clone_override`](Self::remove_clone_override).
    pub fn install_clone_override(
        &mut self,
        object: ObjectId,
        property: Property<Option<ObjectId>>,
        source: OverrideSource,
    ) -> Result<ObjectId, PropertyError> {
        let name = self.registry.checked::<Option<ObjectId>>(property.id())?.name();
        let target = self
            .get(object, property)?
            .ok_or_else(|| state_error(name, OverrideStateError::NothingToClone))?;
        let clone = self.mutable_for_animation(target)?;
        let created = clone != target;

        match self.install_override(object, property, Some(clone), source) {
            Ok(()) => Ok(clone),
            Err(error @ PropertyError::Callback { .. })
            | Err(error @ PropertyError::NotificationOverflow { .. }) => Err(error),
            Err(error) => {
                if created {
                    self.discard_clone(clone)?;
                }
                Err(error)
            }
        }
    }

    /// Removes an override installed by
    /// [`install_clone_override`](Self::install_clone_override) and discards
    /// the clone.
    ///
    /// A clone the base value still refers to, such as one that was already a
    /// clone when the override was installed, is kept.
    pub fn remove_clone_override(
        &mut self,
        object: ObjectId,
        property: Property<Option<ObjectId>>,
        source: OverrideSource,
    ) -> Result<(), PropertyError> {
        self.registry.checked::<Option<ObjectId>>(property.id())?;
        let installed = self
            .data(object)?
            .entry(property.id())
            .and_then(ValueEntry::override_raw)
            .and_then(|v| v.get::<Option<ObjectId>>())
            .flatten();

        let result = self.remove_override(object, property, source);
        if matches!(result, Err(PropertyError::InvalidOverrideState { .. })) {
            return result;
        }
        let base = self
            .data(object)?
            .entry(property.id())
            .and_then(ValueEntry::base_value)
            .and_then(|v| v.get::<Option<ObjectId>>())
            .flatten();
        if let Some(clone) = installed
            && base != Some(clone)
            && self.is_clone(clone).unwrap_or(false)
        {
            self.discard_clone(clone)?;
        }
        result
    }
}
