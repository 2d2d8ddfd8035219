//! Connector Framework ID types
//!
//! Newtype wrappers for type-safe identifiers shared by the gateway and the
//! provisioning engine.

/// Declare a UUID-backed identifier newtype.
///
/// The expansion refers to `serde` and `uuid` by absolute path, so crates
/// using the macro need both as dependencies.
#[macro_export]
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }

            /// Parse from a string representation.
            pub fn parse(s: &str) -> Result<Self, ::uuid::Error> {
                Ok(Self(::uuid::Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a connected target system.
    SystemId
);

uuid_id!(
    /// Identifier of a system mapping (the attribute mapping set of a system).
    MappingId
);

uuid_id!(
    /// Identifier of a single attribute mapping inside a system mapping.
    AttributeMappingId
);

uuid_id!(
    /// Identifier of a provisioning operation.
    OperationId
);

uuid_id!(
    /// Identifier of a provisioning batch.
    BatchId
);
