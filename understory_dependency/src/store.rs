// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object sparse property storage.
//!
//! This module provides [`PropertyStore`], the value store of one object, and
//! its [`ValueEntry`] records.
//!
//! # Implementation
//!
//! Following the `WinUI` approach, entries live in a sorted vector searched
//! with binary search rather than a hash map:
//!
//! - Contiguous memory with no hash buckets
//! - O(log n) lookup, which is fast for typical property counts (5-20)
//! - Inline storage for small property sets via `SmallVec`
//!
//! An entry exists only while the property has a base value (explicit, a
//! materialized factory default, or a fallback changed by coercion) or an
//! override. Absence means "use the inherited or default value".
//!
//! The store is plain data. Coercion, validation, and notification are
//! applied by [`PropertySystem`](crate::PropertySystem) before anything is
//! written here.

use smallvec::SmallVec;

use crate::clone::CloneOnAnimation;
use crate::id::{OverrideSource, Property, PropertyId};
use crate::value::ErasedValue;

/// Default inline capacity for property entries.
///
/// Most UI objects have fewer than 8 non-default properties set,
/// so this avoids heap allocation in the common case.
const INLINE_CAPACITY: usize = 8;

/// Where a base value came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BaseSource {
    /// Materialized from a factory default on first access.
    Default,
    /// Set explicitly.
    Local,
    /// An inherited or default value that coercion changed, kept so reads can
    /// borrow it. Dropped when the inherited value changes or the property is
    /// cleared.
    Coerced,
}

/// Override state of one `(object, property)` pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OverrideState {
    /// No override; resolution returns the base value.
    #[default]
    Idle,
    /// An override is installed and wins over the base value.
    Overridden,
    /// Removal is in progress; resolution already returns the base value.
    Releasing,
}

/// A candidate value together with its coerced form.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StoredValue {
    raw: ErasedValue,
    /// Only present when coercion produced a different value.
    coerced: Option<ErasedValue>,
}

impl StoredValue {
    pub(crate) fn new(raw: ErasedValue, coerced: ErasedValue) -> Self {
        let coerced = (coerced != raw).then_some(coerced);
        Self { raw, coerced }
    }

    pub(crate) fn raw(&self) -> &ErasedValue {
        &self.raw
    }

    /// Applies `f` to the raw value and the cached coerced value.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut ErasedValue)) {
        f(&mut self.raw);
        if let Some(coerced) = &mut self.coerced {
            f(coerced);
        }
    }

    pub(crate) fn effective(&self) -> &ErasedValue {
        self.coerced.as_ref().unwrap_or(&self.raw)
    }

    pub(crate) fn set_coerced(&mut self, coerced: ErasedValue) {
        self.coerced = (coerced != self.raw).then_some(coerced);
    }
}

#[derive(Clone, Debug)]
struct OverrideSlot {
    value: StoredValue,
    source: OverrideSource,
    releasing: bool,
}

/// Stored state of one property on one object.
///
/// The base value and the override slot are independent: installing or
/// removing an override never touches the base value.
#[derive(Clone, Debug)]
pub struct ValueEntry {
    base: Option<(StoredValue, BaseSource)>,
    overlay: Option<OverrideSlot>,
}

impl ValueEntry {
    const EMPTY: Self = Self {
        base: None,
        overlay: None,
    };

    fn is_empty(&self) -> bool {
        self.base.is_none() && self.overlay.is_none()
    }

    /// Returns the base value as written, before coercion.
    #[must_use]
    pub fn base_value(&self) -> Option<&ErasedValue> {
        self.base.as_ref().map(|(v, _)| v.raw())
    }

    /// Returns the coerced base value.
    #[must_use]
    pub fn coerced_value(&self) -> Option<&ErasedValue> {
        self.base.as_ref().map(|(v, _)| v.effective())
    }

    /// Returns where the base value came from.
    #[must_use]
    pub fn base_source(&self) -> Option<BaseSource> {
        self.base.as_ref().map(|(_, s)| *s)
    }

    /// Returns the coerced override value, including one being released.
    #[must_use]
    pub fn override_value(&self) -> Option<&ErasedValue> {
        self.overlay.as_ref().map(|o| o.value.effective())
    }

    /// Returns the source driving the override.
    #[must_use]
    pub fn override_source(&self) -> Option<OverrideSource> {
        self.overlay.as_ref().map(|o| o.source)
    }

    /// Returns the override state.
    #[must_use]
    pub fn override_state(&self) -> OverrideState {
        match &self.overlay {
            None => OverrideState::Idle,
            Some(o) if o.releasing => OverrideState::Releasing,
            Some(_) => OverrideState::Overridden,
        }
    }

    /// Returns the value this entry contributes to resolution: the active
    /// override, else the coerced base value.
    ///
    /// `None` means the entry holds no base value and no active override, so
    /// resolution falls through to inheritance or the default.
    #[must_use]
    pub fn effective(&self) -> Option<&ErasedValue> {
        match &self.overlay {
            Some(o) if !o.releasing => Some(o.value.effective()),
            _ => self.coerced_value(),
        }
    }

    /// Returns `true` if the base value is a coerced inherited or default
    /// value rather than one set on this object.
    #[must_use]
    pub fn is_coerced_fallback(&self) -> bool {
        self.base_source() == Some(BaseSource::Coerced)
    }

    /// The active override, else a base value that is not a coerced fallback.
    pub(crate) fn local_value(&self) -> Option<&ErasedValue> {
        match &self.overlay {
            Some(o) if !o.releasing => Some(o.value.effective()),
            _ => self
                .base
                .as_ref()
                .filter(|(_, source)| *source != BaseSource::Coerced)
                .map(|(v, _)| v.effective()),
        }
    }

    pub(crate) fn override_raw(&self) -> Option<&ErasedValue> {
        self.overlay.as_ref().map(|o| o.value.raw())
    }

    pub(crate) fn base_mut(&mut self) -> Option<&mut StoredValue> {
        self.base.as_mut().map(|(v, _)| v)
    }

    pub(crate) fn override_mut(&mut self) -> Option<&mut StoredValue> {
        self.overlay.as_mut().map(|o| &mut o.value)
    }
}

/// Per-object sparse storage for property values.
///
/// # Example
///
/// ```rust
/// use understory_dependency::{
///     BaseSource, ErasedValue, OverrideSource, OverrideState, PropertyId, PropertyStore,
/// };
///
/// let offset = PropertyId::new(0);
/// let mut store = PropertyStore::new();
/// assert!(store.entry(offset).is_none());
///
/// store.set_base(offset, ErasedValue::new(0.5_f64), ErasedValue::new(0.5_f64), BaseSource::Local);
/// store.install_override(offset, ErasedValue::new(0.9_f64), ErasedValue::new(0.9_f64), OverrideSource(1));
///
/// let entry = store.entry(offset).unwrap();
/// assert_eq!(entry.effective(), Some(&ErasedValue::new(0.9_f64)));
/// assert_eq!(entry.base_value(), Some(&ErasedValue::new(0.5_f64)));
/// assert_eq!(entry.override_state(), OverrideState::Overridden);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PropertyStore {
    /// Entries sorted by [`PropertyId`] for binary search lookup.
    entries: SmallVec<[(PropertyId, ValueEntry); INLINE_CAPACITY]>,
    is_clone: bool,
}

impl PropertyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no property has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of properties with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the property IDs that have entries, in ascending order.
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Iterates `(property, entry)` pairs in ascending property order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &ValueEntry)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Binary search for an entry by property ID.
    #[inline]
    fn find_entry(&self, id: PropertyId) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&id, |(pid, _)| *pid)
    }

    fn entry_or_insert(&mut self, id: PropertyId) -> &mut ValueEntry {
        let idx = match self.find_entry(id) {
            Ok(idx) => idx,
            Err(idx) => {
                self.entries.insert(idx, (id, ValueEntry::EMPTY));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    fn prune(&mut self, id: PropertyId) {
        if let Ok(idx) = self.find_entry(id)
            && self.entries[idx].1.is_empty()
        {
            self.entries.remove(idx);
        }
    }

    /// Returns the entry for a property.
    #[must_use]
    #[inline]
    pub fn entry(&self, id: PropertyId) -> Option<&ValueEntry> {
        self.find_entry(id).ok().map(|idx| &self.entries[idx].1)
    }

    pub(crate) fn entry_mut(&mut self, id: PropertyId) -> Option<&mut ValueEntry> {
        self.find_entry(id).ok().map(|idx| &mut self.entries[idx].1)
    }

    /// Returns the typed base value, before coercion.
    #[must_use]
    pub fn get_base<T: 'static>(&self, property: Property<T>) -> Option<&T> {
        self.entry(property.id())
            .and_then(ValueEntry::base_value)
            .and_then(ErasedValue::downcast_ref)
    }

    /// Returns the typed override value, if one is installed.
    #[must_use]
    pub fn get_override<T: 'static>(&self, property: Property<T>) -> Option<&T> {
        self.entry(property.id())
            .and_then(ValueEntry::override_value)
            .and_then(ErasedValue::downcast_ref)
    }

    /// Returns `true` if the property has a base value.
    #[must_use]
    pub fn has_base(&self, id: PropertyId) -> bool {
        self.entry(id).is_some_and(|e| e.base.is_some())
    }

    /// Stores a base value and its coerced form.
    pub fn set_base(
        &mut self,
        id: PropertyId,
        raw: ErasedValue,
        coerced: ErasedValue,
        source: BaseSource,
    ) {
        self.entry_or_insert(id).base = Some((StoredValue::new(raw, coerced), source));
    }

    /// Removes the base value, keeping any override.
    ///
    /// Returns the removed raw value.
    pub fn clear_base(&mut self, id: PropertyId) -> Option<ErasedValue> {
        let removed = self
            .entry_mut(id)
            .and_then(|e| e.base.take())
            .map(|(v, _)| v.raw);
        self.prune(id);
        removed
    }

    /// Installs or replaces the override, resetting any pending release.
    pub fn install_override(
        &mut self,
        id: PropertyId,
        raw: ErasedValue,
        coerced: ErasedValue,
        source: OverrideSource,
    ) {
        self.entry_or_insert(id).overlay = Some(OverrideSlot {
            value: StoredValue::new(raw, coerced),
            source,
            releasing: false,
        });
    }

    /// Moves an installed override to [`OverrideState::Releasing`].
    ///
    /// Returns `false` if no override is installed.
    pub fn begin_release(&mut self, id: PropertyId) -> bool {
        match self.entry_mut(id).and_then(|e| e.overlay.as_mut()) {
            Some(slot) => {
                slot.releasing = true;
                true
            }
            None => false,
        }
    }

    /// Removes the override slot.
    ///
    /// Returns the removed override's raw value.
    pub fn clear_override(&mut self, id: PropertyId) -> Option<ErasedValue> {
        let removed = self
            .entry_mut(id)
            .and_then(|e| e.overlay.take())
            .map(|o| o.value.raw);
        self.prune(id);
        removed
    }

    /// Returns the properties whose override was installed by `source`.
    pub fn overrides_from(&self, source: OverrideSource) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, e)| e.override_source() == Some(source))
            .map(|(id, _)| *id)
    }
}

impl CloneOnAnimation for PropertyStore {
    fn is_clone(&self) -> bool {
        self.is_clone
    }

    /// Copies every base value. Overrides belong to the original and are
    /// not copied.
    fn clone_for_animation(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, e)| e.base.is_some())
                .map(|(id, e)| {
                    (
                        *id,
                        ValueEntry {
                            base: e.base.clone(),
                            overlay: None,
                        },
                    )
                })
                .collect(),
            is_clone: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn erased(v: f64) -> ErasedValue {
        ErasedValue::new(v)
    }

    #[test]
    fn store_starts_empty() {
        let store = PropertyStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(!store.is_clone());
    }

    #[test]
    fn entries_are_sorted() {
        let mut store = PropertyStore::new();
        for i in [5_u16, 1, 3] {
            store.set_base(PropertyId::new(i), erased(0.0), erased(0.0), BaseSource::Local);
        }
        let ids: Vec<_> = store.property_ids().map(PropertyId::index).collect();
        assert_eq!(ids, [1, 3, 5]);
    }

    #[test]
    fn coerced_value_is_cached_only_when_different() {
        let id = PropertyId::new(0);
        let mut store = PropertyStore::new();

        store.set_base(id, erased(2.0), erased(1.0), BaseSource::Local);
        let entry = store.entry(id).unwrap();
        assert_eq!(entry.base_value(), Some(&erased(2.0)));
        assert_eq!(entry.coerced_value(), Some(&erased(1.0)));

        store.set_base(id, erased(0.5), erased(0.5), BaseSource::Local);
        let entry = store.entry(id).unwrap();
        assert!(entry.base.as_ref().unwrap().0.coerced.is_none());
        assert_eq!(entry.effective(), Some(&erased(0.5)));
    }

    #[test]
    fn override_does_not_touch_base() {
        let id = PropertyId::new(0);
        let source = OverrideSource(7);
        let mut store = PropertyStore::new();

        store.set_base(id, erased(0.5), erased(0.5), BaseSource::Local);
        store.install_override(id, erased(0.9), erased(0.9), source);
        assert_eq!(store.entry(id).unwrap().effective(), Some(&erased(0.9)));

        store.set_base(id, erased(0.2), erased(0.2), BaseSource::Local);
        assert_eq!(store.entry(id).unwrap().effective(), Some(&erased(0.9)));

        assert!(store.begin_release(id));
        let entry = store.entry(id).unwrap();
        assert_eq!(entry.override_state(), OverrideState::Releasing);
        assert_eq!(entry.effective(), Some(&erased(0.2)));

        assert_eq!(store.clear_override(id), Some(erased(0.9)));
        let entry = store.entry(id).unwrap();
        assert_eq!(entry.override_state(), OverrideState::Idle);
        assert_eq!(entry.effective(), Some(&erased(0.2)));
    }

    #[test]
    fn override_only_entry_is_pruned_when_cleared() {
        let id = PropertyId::new(3);
        let mut store = PropertyStore::new();
        store.install_override(id, erased(1.0), erased(1.0), OverrideSource(1));
        assert_eq!(store.entry(id).unwrap().base_value(), None);
        assert_eq!(store.clear_override(id), Some(erased(1.0)));
        assert!(store.entry(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_base_keeps_override() {
        let id = PropertyId::new(0);
        let mut store = PropertyStore::new();
        store.set_base(id, erased(1.0), erased(1.0), BaseSource::Default);
        store.install_override(id, erased(2.0), erased(2.0), OverrideSource(1));

        assert_eq!(store.clear_base(id), Some(erased(1.0)));
        assert!(!store.has_base(id));
        assert_eq!(store.entry(id).unwrap().effective(), Some(&erased(2.0)));
        assert_eq!(store.clear_base(id), None);
    }

    #[test]
    fn coerced_fallback_is_not_a_local_value() {
        let id = PropertyId::new(0);
        let mut store = PropertyStore::new();
        store.set_base(id, erased(0.0), erased(5.0), BaseSource::Coerced);

        let entry = store.entry(id).unwrap();
        assert!(entry.is_coerced_fallback());
        assert_eq!(entry.effective(), Some(&erased(5.0)));
        assert_eq!(entry.local_value(), None);

        store.install_override(id, erased(7.0), erased(7.0), OverrideSource(1));
        assert_eq!(store.entry(id).unwrap().local_value(), Some(&erased(7.0)));
    }

    #[test]
    fn begin_release_without_override() {
        let mut store = PropertyStore::new();
        assert!(!store.begin_release(PropertyId::new(0)));
    }

    #[test]
    fn overrides_from_filters_by_source() {
        let mut store = PropertyStore::new();
        store.install_override(PropertyId::new(0), erased(1.0), erased(1.0), OverrideSource(1));
        store.install_override(PropertyId::new(1), erased(1.0), erased(1.0), OverrideSource(2));
        store.install_override(PropertyId::new(2), erased(1.0), erased(1.0), OverrideSource(1));

        let ids: Vec<_> = store.overrides_from(OverrideSource(1)).collect();
        assert_eq!(ids, [PropertyId::new(0), PropertyId::new(2)]);
    }

    #[test]
    fn typed_accessors() {
        let width: Property<f64> = Property::from_id(PropertyId::new(0));
        let mut store = PropertyStore::new();
        store.set_base(width.id(), erased(3.0), erased(3.0), BaseSource::Local);
        assert_eq!(store.get_base(width), Some(&3.0));
        assert_eq!(store.get_override(width), None);

        let wrong: Property<i32> = Property::from_id(width.id());
        assert_eq!(store.get_base(wrong), None);
    }

    #[test]
    fn animation_clone_drops_overrides() {
        let a = PropertyId::new(0);
        let b = PropertyId::new(1);
        let mut store = PropertyStore::new();
        store.set_base(a, erased(1.0), erased(1.0), BaseSource::Local);
        store.install_override(a, erased(5.0), erased(5.0), OverrideSource(1));
        store.install_override(b, erased(5.0), erased(5.0), OverrideSource(1));

        let mut clone = store.clone_for_animation();
        assert!(clone.is_clone());
        assert_eq!(clone.len(), 1);
        assert_eq!(clone.entry(a).unwrap().effective(), Some(&erased(1.0)));

        clone.set_base(a, erased(9.0), erased(9.0), BaseSource::Local);
        assert_eq!(store.entry(a).unwrap().base_value(), Some(&erased(1.0)));
    }
}
