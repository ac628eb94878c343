//! Identifier newtypes shared across messages, correlation entries and
//! protocols.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

macro_rules! uuid_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(MessageId, "Unique identifier for a `Message`.");
uuid_newtype!(
    RequestId,
    "Correlation key tying a `capability_request` to its eventual response."
);
uuid_newtype!(ProtocolId, "Unique identifier for a registered `Protocol`.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn request_id_from_uuid_roundtrips() {
        let uuid = Uuid::new_v4();
        let id = RequestId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn protocol_id_default_is_v4() {
        let id = ProtocolId::default();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn display_contains_hyphens() {
        let id = MessageId::new();
        assert!(format!("{id}").contains('-'));
    }
}
