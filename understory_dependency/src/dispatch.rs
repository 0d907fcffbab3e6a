// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notification dispatch.
//!
//! Every effective-value change becomes a [`Notification`] appended to the
//! system's queue. The queue is drained in FIFO order by the outermost write;
//! writes made by callbacks commit immediately and their notifications run
//! after the current one is fully dispatched.
//!
//! For each notification, in order:
//!
//! 1. the property's change callbacks (inherited metadata first, then
//!    subtype overrides),
//! 2. owner-type hooks, most-derived type first,
//! 3. structural propagation: children held by the old and new values are
//!    re-parented, and if the object is itself held by another object's
//!    property, a [`ChangeKind::SubProperty`] notification is queued there,
//! 4. inheritance propagation to logical children that store no value of
//!    their own ([`ChangeKind::Inherited`]).
//!
//! A callback error, or exceeding
//! [`DispatchConfig::max_notifications`](crate::DispatchConfig::max_notifications),
//! aborts the drain: queued notifications are discarded and the error is
//! returned to the outermost caller. Values committed so far stay committed.

use alloc::vec::Vec;
use core::fmt;

use crate::error::PropertyError;
use crate::id::{ObjectId, OwnerRef, Property, PropertyId};
use crate::metadata::PropertyFlags;
use crate::registry::ErasedMetadata;
use crate::store::ValueEntry;
use crate::system::PropertySystem;
use crate::value::ErasedValue;

/// What caused a notification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// The object's own effective value changed, or the owner was explicitly
    /// invalidated.
    Value,
    /// A property of an object held by this property's value changed.
    ///
    /// Old and new values are the same holder value.
    SubProperty {
        /// The held object whose property changed.
        child: ObjectId,
        /// The property that changed on `child`.
        property: PropertyId,
    },
    /// The value inherited from a logical ancestor changed.
    Inherited,
}

/// A queued or dispatching change of one property on one object.
#[derive(Clone, Debug)]
pub struct Notification {
    object: ObjectId,
    property: PropertyId,
    old: ErasedValue,
    new: ErasedValue,
    kind: ChangeKind,
    flags: PropertyFlags,
}

impl Notification {
    pub(crate) fn new(
        object: ObjectId,
        property: PropertyId,
        old: ErasedValue,
        new: ErasedValue,
        kind: ChangeKind,
        flags: PropertyFlags,
    ) -> Self {
        Self {
            object,
            property,
            old,
            new,
            kind,
            flags,
        }
    }

    /// Returns the object whose property changed.
    #[must_use]
    #[inline]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Returns the property that changed.
    #[must_use]
    #[inline]
    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// Returns the effective value before the change.
    #[must_use]
    #[inline]
    pub fn old_value(&self) -> &ErasedValue {
        &self.old
    }

    /// Returns the effective value after the change.
    #[must_use]
    #[inline]
    pub fn new_value(&self) -> &ErasedValue {
        &self.new
    }

    /// Returns what caused the change.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns the flags of the property as seen by the object's type.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }
}

/// Typed view of a [`Notification`] passed to change callbacks.
pub struct PropertyChange<'a, T> {
    /// The object whose property changed.
    pub object: ObjectId,
    /// The property that changed.
    pub property: Property<T>,
    /// Effective value before the change.
    pub old: &'a T,
    /// Effective value after the change.
    pub new: &'a T,
    /// What caused the change.
    pub kind: ChangeKind,
}

impl<T: fmt::Debug> fmt::Debug for PropertyChange<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyChange")
            .field("object", &self.object)
            .field("property", &self.property)
            .field("old", self.old)
            .field("new", self.new)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PropertySystem<'_> {
    pub(crate) fn enqueue(&mut self, notification: Notification) {
        self.queue.push_back(notification);
    }

    /// Returns `true` while notifications are being dispatched.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.draining
    }

    /// Drains the queue unless an outer call is already draining it.
    pub(crate) fn drain(&mut self) -> Result<(), PropertyError> {
        if self.draining {
            return Ok(());
        }
        self.draining = true;
        let result = self.drain_queue();
        self.draining = false;

        if let Err(error) = &result {
            let discarded = self.queue.len();
            self.queue.clear();
            tracing::debug!(%error, discarded, "notification drain aborted");
        }
        result
    }

    fn drain_queue(&mut self) -> Result<(), PropertyError> {
        let limit = self.config.max_notifications;
        let mut dispatched = 0_usize;
        while let Some(notification) = self.queue.pop_front() {
            dispatched += 1;
            if dispatched > limit {
                return Err(PropertyError::NotificationOverflow { limit });
            }
            self.dispatch_one(&notification)?;
        }
        Ok(())
    }

    fn dispatch_one(&mut self, notification: &Notification) -> Result<(), PropertyError> {
        let registry = self.registry;
        let object = notification.object;
        let property = notification.property;
        // The object may have been destroyed since the change was queued.
        let Ok(data) = self.data(object) else {
            return Ok(());
        };
        let type_key = data.type_key;
        let metadata = registry.erased_metadata(property, type_key)?;
        tracing::trace!(
            object = ?object,
            property = self.property_name(property),
            kind = ?notification.kind,
            "dispatching change"
        );

        metadata.notify(self, notification)?;
        for hook in registry.type_hooks(type_key) {
            hook(self, notification)?;
        }

        let sub_property = matches!(notification.kind, ChangeKind::SubProperty { .. });
        let owner = OwnerRef::new(object, property);
        if !sub_property {
            self.reparent_children(metadata, owner, Some(&notification.old), &notification.new);
        }

        let Ok(data) = self.data(object) else {
            return Ok(());
        };
        let holder = data.structural_parent;
        let children = if metadata.flags().contains(PropertyFlags::INHERITS) && !sub_property {
            data.children.clone()
        } else {
            Vec::new()
        };

        let pending = match holder {
            Some(holder) => match self.data(holder.object) {
                Ok(holder_data) => self
                    .lookup(holder.object, holder.property)?
                    .map(|current| {
                        let flags = registry.flags(holder.property, holder_data.type_key);
                        (holder, current.clone(), flags)
                    }),
                Err(_) => None,
            },
            None => None,
        };
        if let Some((holder, current, flags)) = pending {
            self.enqueue(Notification::new(
                holder.object,
                holder.property,
                current.clone(),
                current,
                ChangeKind::SubProperty {
                    child: object,
                    property,
                },
                flags,
            ));
        }

        for child in children {
            let Ok(child_data) = self.data(child) else {
                continue;
            };
            let flags = registry.flags(property, child_data.type_key);
            if !flags.contains(PropertyFlags::INHERITS) {
                continue;
            }
            let entry = child_data.entry(property);
            let shadowed = entry.and_then(ValueEntry::local_value).is_some();
            // A coerced copy of the old inherited value is stale now.
            if entry.is_some_and(ValueEntry::is_coerced_fallback) {
                self.store_mut(child)?.clear_base(property);
            }
            if shadowed {
                continue;
            }
            self.enqueue(Notification::new(
                child,
                property,
                notification.old.clone(),
                notification.new.clone(),
                ChangeKind::Inherited,
                flags,
            ));
        }
        Ok(())
    }

    /// Moves structural ownership from the children of `old` to those of `new`.
    pub(crate) fn reparent_children(
        &mut self,
        metadata: &dyn ErasedMetadata,
        owner: OwnerRef,
        old: Option<&ErasedValue>,
        new: &ErasedValue,
    ) {
        if !metadata.has_children() {
            return;
        }
        let mut before = Vec::new();
        if let Some(old) = old {
            metadata.collect_children(old, &mut before);
        }
        let mut after = Vec::new();
        metadata.collect_children(new, &mut after);

        for child in before.iter().filter(|c| !after.contains(c)) {
            if let Ok(data) = self.data_mut(*child)
                && data.structural_parent == Some(owner)
            {
                data.structural_parent = None;
            }
        }
        for child in after.into_iter().filter(|c| *c != owner.object) {
            if let Ok(data) = self.data_mut(child) {
                data.structural_parent = Some(owner);
            }
        }
    }

    // =========================================================================
    // Structural relations
    // =========================================================================

    /// Notifies `owner` as if its value had been set.
    ///
    /// Collections mutated outside [`modify`](Self::modify) call this with
    /// their [`owner`](crate::PropertyCollection::owner) so that the change
    /// reaches the owner's callbacks. The notification has
    /// [`ChangeKind::Value`] with equal old and new values.
    pub fn invalidate_owner(&mut self, owner: OwnerRef) -> Result<(), PropertyError> {
        let registry = self.registry;
        registry.registration(owner.property)?;
        let type_key = self.data(owner.object)?.type_key;
        let current = self.resolve_erased(owner.object, owner.property)?;
        let flags = registry.flags(owner.property, type_key);
        self.enqueue(Notification::new(
            owner.object,
            owner.property,
            current.clone(),
            current,
            ChangeKind::Value,
            flags,
        ));
        self.drain()
    }

    /// Declares that `child` is held by `owner`, so that changes to `child`'s
    /// properties are reported on `owner` as [`ChangeKind::SubProperty`].
    ///
    /// Properties registered with
    /// [`children`](crate::PropertyMetadataBuilder::children) maintain this
    /// relation automatically. A child has at most one owner; declaring a new
    /// one replaces the previous.
    pub fn declare_dependent(
        &mut self,
        child: ObjectId,
        owner: OwnerRef,
    ) -> Result<(), PropertyError> {
        self.registry.registration(owner.property)?;
        self.data(child)?;
        let mut next = Some(owner.object);
        while let Some(current) = next {
            if current == child {
                return Err(PropertyError::ParentCycle { child });
            }
            next = self.data(current)?.structural_parent.map(|o| o.object);
        }
        self.data_mut(child)?.structural_parent = Some(owner);
        Ok(())
    }

    /// Fails if `value` holds `object` or one of the objects structurally
    /// holding it.
    pub(crate) fn check_structural_cycle(
        &self,
        metadata: &dyn ErasedMetadata,
        object: ObjectId,
        value: &ErasedValue,
    ) -> Result<(), PropertyError> {
        if !metadata.has_children() {
            return Ok(());
        }
        let mut held = Vec::new();
        metadata.collect_children(value, &mut held);
        for child in held {
            let mut next = Some(object);
            while let Some(current) = next {
                if current == child {
                    return Err(PropertyError::ParentCycle { child });
                }
                next = self
                    .data(current)
                    .ok()
                    .and_then(|data| data.structural_parent)
                    .map(|holder| holder.object);
            }
        }
        Ok(())
    }

    /// Removes the relation declared by [`declare_dependent`](Self::declare_dependent).
    ///
    /// Returns `false` if `child` was not held by `owner`.
    pub fn remove_dependent(
        &mut self,
        child: ObjectId,
        owner: OwnerRef,
    ) -> Result<bool, PropertyError> {
        let data = self.data_mut(child)?;
        if data.structural_parent == Some(owner) {
            data.structural_parent = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Returns the `(object, property)` holding `object`, if any.
    pub fn structural_parent(&self, object: ObjectId) -> Result<Option<OwnerRef>, PropertyError> {
        Ok(self.data(object)?.structural_parent)
    }
}
