// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Every failure is local and recoverable: it is returned to the immediate
//! caller and leaves the engine in a consistent state.

use alloc::borrow::Cow;
use thiserror::Error;

use crate::id::{ObjectId, OverrideSource, PropertyId, TypeKey};

/// Reason given by a coercion callback for rejecting a candidate value.
///
/// ```rust
/// use understory_dependency::Rejection;
///
/// let rejection = Rejection::new("offset must be finite");
/// assert_eq!(rejection.reason(), "offset must be finite");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejection {
    reason: Cow<'static, str>,
}

impl Rejection {
    /// Creates a rejection with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason text.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Why an override operation was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OverrideStateError {
    /// The property metadata carries
    /// [`PropertyFlags::NOT_ANIMATABLE`](crate::PropertyFlags::NOT_ANIMATABLE).
    #[error("the property cannot be animated")]
    NotAnimatable,
    /// No override is installed.
    #[error("no override is installed")]
    NotInstalled,
    /// The override is already being released.
    #[error("the override is already being released")]
    Releasing,
    /// The override was installed by a different source.
    #[error("override installed by {installed:?}, not {requested:?}")]
    SourceMismatch {
        /// The source that installed the current override.
        installed: OverrideSource,
        /// The source named by the caller.
        requested: OverrideSource,
    },
    /// The object is an original, not a clone.
    #[error("{0:?} is not an animation clone")]
    NotAClone(ObjectId),
    /// The property holds no object to clone.
    #[error("the property does not reference an object")]
    NothingToClone,
}

/// Errors produced by the registry and the property system.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PropertyError {
    /// A property with the same `(owner type, name)` identity, or a metadata
    /// override for the same `(property, type)`, already exists.
    #[error("`{owner}.{name}` is already registered")]
    DuplicateRegistration {
        /// Name of the owner type.
        owner: &'static str,
        /// Name of the property.
        name: &'static str,
    },
    /// An owner type with this name already exists.
    #[error("owner type `{0}` is already registered")]
    DuplicateType(&'static str),
    /// The type key does not belong to the registry.
    #[error("{0} is not a registered owner type")]
    UnknownType(TypeKey),
    /// The property id does not belong to the registry.
    #[error("{0} is not registered")]
    UnknownProperty(PropertyId),
    /// The typed handle does not match the registered value type.
    #[error("`{name}` does not hold values of the requested type")]
    TypeMismatch {
        /// Name of the property.
        name: &'static str,
    },
    /// Metadata was overridden on a type that does not derive from the owner.
    #[error("metadata for `{name}` can only be overridden on a subtype of its owner, not {owner_type}")]
    UnrelatedType {
        /// Name of the property.
        name: &'static str,
        /// The type the override targeted.
        owner_type: TypeKey,
    },
    /// The object id is stale or was never allocated.
    #[error("{0:?} does not refer to a live object")]
    UnknownObject(ObjectId),
    /// The requested parent is the object itself or one of its descendants,
    /// or a value would hold an object that already holds its owner.
    #[error("{child:?} cannot become a descendant of itself")]
    ParentCycle {
        /// The object being re-parented.
        child: ObjectId,
    },
    /// The validation predicate rejected a value.
    #[error("value rejected by validation of `{name}`")]
    Validation {
        /// Name of the property.
        name: &'static str,
    },
    /// The coercion callback rejected a value. Stored state is unchanged.
    #[error("coercion of `{name}` failed: {rejection}")]
    Coercion {
        /// Name of the property.
        name: &'static str,
        /// The rejection returned by the callback.
        rejection: Rejection,
    },
    /// An override operation does not fit the current override state.
    #[error("invalid override state for `{name}`: {reason}")]
    InvalidOverrideState {
        /// Name of the property (empty for object-level clone operations).
        name: &'static str,
        /// What was wrong.
        reason: OverrideStateError,
    },
    /// A change callback or type hook failed. The triggering value stays committed.
    #[error("change callback for `{name}` failed: {message}")]
    Callback {
        /// Name of the property whose callback failed.
        name: &'static str,
        /// Message supplied by the callback.
        message: Cow<'static, str>,
    },
    /// One drain dispatched more notifications than allowed by
    /// [`DispatchConfig::max_notifications`](crate::DispatchConfig::max_notifications).
    #[error("more than {limit} notifications were dispatched in one drain")]
    NotificationOverflow {
        /// The configured limit.
        limit: usize,
    },
}

impl PropertyError {
    /// Builds a [`PropertyError::Callback`] for use inside change callbacks.
    #[must_use]
    pub fn callback(name: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Callback {
            name,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn rejection_display() {
        let rejection = Rejection::new("negative");
        assert_eq!(rejection.to_string(), "negative");
    }

    #[test]
    fn coercion_error_display() {
        let error = PropertyError::Coercion {
            name: "Offset",
            rejection: Rejection::new("not finite"),
        };
        assert_eq!(error.to_string(), "coercion of `Offset` failed: not finite");
    }

    #[test]
    fn duplicate_registration_display() {
        let error = PropertyError::DuplicateRegistration {
            owner: "Stop",
            name: "Offset",
        };
        assert_eq!(error.to_string(), "`Stop.Offset` is already registered");
    }

    #[test]
    fn override_state_display() {
        let error = PropertyError::InvalidOverrideState {
            name: "Opacity",
            reason: OverrideStateError::NotInstalled,
        };
        assert_eq!(
            error.to_string(),
            "invalid override state for `Opacity`: no override is installed"
        );
    }

    #[test]
    fn callback_helper() {
        let error = PropertyError::callback("Stops", "boom");
        assert!(matches!(error, PropertyError::Callback { name: "Stops", .. }));
    }
}
