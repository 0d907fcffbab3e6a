// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collection-valued properties and structural children.

use alloc::vec::Vec;
use core::fmt;

use crate::clone::CloneOnAnimation;
use crate::id::{ObjectId, OwnerRef};

/// Values that hold other property-bearing objects.
///
/// Registering a property with
/// [`PropertyMetadataBuilder::children`](crate::PropertyMetadataBuilder::children)
/// makes the system re-parent these objects under the owning property, route
/// their changes to it, and deep-copy them when the owner is cloned for
/// animation.
pub trait ChildObjects {
    /// Appends the objects held by this value to `out`.
    fn collect_children(&self, out: &mut Vec<ObjectId>);

    /// Replaces every held object with `map(object)`.
    fn remap_children(&mut self, map: &mut dyn FnMut(ObjectId) -> ObjectId);
}

impl ChildObjects for ObjectId {
    fn collect_children(&self, out: &mut Vec<ObjectId>) {
        out.push(*self);
    }

    fn remap_children(&mut self, map: &mut dyn FnMut(ObjectId) -> ObjectId) {
        *self = map(*self);
    }
}

impl ChildObjects for Option<ObjectId> {
    fn collect_children(&self, out: &mut Vec<ObjectId>) {
        out.extend(*self);
    }

    fn remap_children(&mut self, map: &mut dyn FnMut(ObjectId) -> ObjectId) {
        if let Some(id) = self {
            *id = map(*id);
        }
    }
}

impl ChildObjects for PropertyCollection<ObjectId> {
    fn collect_children(&self, out: &mut Vec<ObjectId>) {
        out.extend_from_slice(&self.items);
    }

    fn remap_children(&mut self, map: &mut dyn FnMut(ObjectId) -> ObjectId) {
        for id in &mut self.items {
            *id = map(*id);
        }
    }
}

/// An ordered collection stored as a property value.
///
/// The collection keeps a non-owning [`OwnerRef`] to the `(object, property)`
/// that holds it, set by [`attach`](Self::attach), typically from the
/// property's attach callback. The reference never keeps the owner alive; it
/// only names whom to notify through
/// [`PropertySystem::invalidate_owner`](crate::PropertySystem::invalidate_owner).
///
/// Equality compares items only, so re-attaching a collection is not a change.
///
/// ```rust
/// use understory_dependency::PropertyCollection;
///
/// let mut stops: PropertyCollection<f64> = PropertyCollection::new();
/// stops.push(0.0);
/// stops.push(1.0);
/// assert_eq!(stops.len(), 2);
/// assert!(stops.owner().is_none());
/// ```
#[derive(Clone)]
pub struct PropertyCollection<T> {
    items: Vec<T>,
    owner: Option<OwnerRef>,
    is_clone: bool,
}

impl<T> PropertyCollection<T> {
    /// Creates an empty, unattached collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            owner: None,
            is_clone: false,
        }
    }

    /// Returns the `(object, property)` currently holding this collection.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> Option<OwnerRef> {
        self.owner
    }

    /// Records the `(object, property)` holding this collection.
    pub fn attach(&mut self, owner: OwnerRef) {
        self.owner = Some(owner);
    }

    /// Forgets the owner.
    pub fn detach(&mut self) {
        self.owner = None;
    }

    /// Returns the number of items.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the collection holds no items.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Returns the items as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Iterates the items in order.
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Appends an item.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Inserts an item at `index`, shifting later items.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, item: T) {
        self.items.insert(index, item);
    }

    /// Removes and returns the item at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Keeps only the items matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }
}

impl<T> Default for PropertyCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for PropertyCollection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: fmt::Debug> fmt::Debug for PropertyCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCollection")
            .field("items", &self.items)
            .field("owner", &self.owner)
            .field("is_clone", &self.is_clone)
            .finish()
    }
}

impl<T> FromIterator<T> for PropertyCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            owner: None,
            is_clone: false,
        }
    }
}

impl<T> Extend<T> for PropertyCollection<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<'a, T> IntoIterator for &'a PropertyCollection<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Clone> CloneOnAnimation for PropertyCollection<T> {
    fn is_clone(&self) -> bool {
        self.is_clone
    }

    /// Copies the items. The copy is unattached until the clone's owner
    /// attaches it.
    fn clone_for_animation(&self) -> Self {
        Self {
            items: self.items.clone(),
            owner: None,
            is_clone: true,
        }
    }
}
