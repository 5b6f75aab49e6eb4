//! Strong type definitions for tweetwatch.
//!
//! Identifiers handed out by the remote service are opaque strings wrapped in
//! newtypes so they cannot be mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

opaque_id! {
    /// Stable identifier of a tracked account, assigned by the remote service.
    EntityId
}

opaque_id! {
    /// Identifier the remote service assigns to a filter rule.
    RuleId
}

opaque_id! {
    /// Identifier of a single post on the stream.
    EventId
}

/// An account handle, e.g. `jack` in `@jack`.
///
/// Only ASCII letters, digits and underscores are accepted, which keeps
/// handles free of the ` OR ` separator used in rule expressions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Parse a handle, accepting an optional leading `@`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref().trim();
        let raw = raw.strip_prefix('@').unwrap_or(raw);

        if raw.is_empty() {
            return Err(ValidationError::EmptyHandle);
        }
        if let Some(ch) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(ValidationError::InvalidHandleChar {
                handle: raw.to_string(),
                ch,
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// The handle without the leading `@`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes (handles are ASCII).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a parsed handle.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(@{})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Handle {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Handle::new(raw)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl std::str::FromStr for Handle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::new(s)
    }
}

/// A subscription: which account to watch and what to ask about its posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Display and rule alias.
    pub handle: Handle,
    /// Stable identity.
    pub id: EntityId,
    /// The matching criterion handed to the classifier.
    pub question: String,
}

impl TrackedEntity {
    pub fn new(handle: Handle, id: EntityId, question: impl Into<String>) -> Self {
        Self {
            handle,
            id,
            question: question.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_strips_at() {
        let handle = Handle::new("@jack").unwrap();
        assert_eq!(handle.as_str(), "jack");
        assert_eq!(handle.to_string(), "jack");
    }

    #[test]
    fn test_handle_rejects_separator_chars() {
        let result = Handle::new("ann OR bob");
        assert!(matches!(
            result,
            Err(ValidationError::InvalidHandleChar { ch: ' ', .. })
        ));
        assert!(matches!(Handle::new("from:ann"), Err(ValidationError::InvalidHandleChar { ch: ':', .. })));
    }

    #[test]
    fn test_handle_rejects_empty() {
        assert_eq!(Handle::new(""), Err(ValidationError::EmptyHandle));
        assert_eq!(Handle::new("@"), Err(ValidationError::EmptyHandle));
    }

    #[test]
    fn test_handle_serde_validates() {
        let ok: Handle = serde_json::from_str("\"carlos_long_name\"").unwrap();
        assert_eq!(ok.as_str(), "carlos_long_name");

        let bad: Result<Handle, _> = serde_json::from_str("\"not a handle\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_opaque_id_display() {
        let id = EntityId::new("783214");
        assert_eq!(id.to_string(), "783214");
        assert_eq!(format!("{:?}", id), "EntityId(783214)");
        assert_eq!(RuleId::from("17").as_str(), "17");
    }
}
