use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest identifier accepted, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 128;

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), TypeError> {
    let reject = |reason| {
        Err(TypeError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason,
        })
    };
    if value.is_empty() {
        return reject("must not be empty");
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return reject("longer than 128 bytes");
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return reject("contains whitespace or control characters");
    }
    Ok(())
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                validate_identifier($kind, &value)?;
                Ok(Self(value))
            }

            /// The identifier as a string slice.
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

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Opaque identifier of a case. All evidence of a case shares one chain.
    CaseId,
    "case"
);

string_identifier!(
    /// Opaque identifier of a single evidence item, globally unique.
    EvidenceId,
    "evidence"
);

/// Durable identifier assigned to a record at write time (UUID v7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Generate a new time-ordered record ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.short_id())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers() {
        assert_eq!(CaseId::new("CASE-2024-001").unwrap().as_str(), "CASE-2024-001");
        assert!(EvidenceId::new("1b9d6bcd-bbfd-4b2d-9b5d-ab8dfbbd4bed").is_ok());
    }

    #[test]
    fn empty_identifier_rejected() {
        let err = CaseId::new("").unwrap_err();
        assert!(matches!(err, TypeError::InvalidIdentifier { kind: "case", .. }));
    }

    #[test]
    fn whitespace_rejected() {
        assert!(EvidenceId::new("ev 1").is_err());
        assert!(EvidenceId::new("ev\n1").is_err());
    }

    #[test]
    fn overlong_rejected() {
        assert!(CaseId::new("c".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(CaseId::new("c".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<EvidenceId>("\"\"").is_err());
        let id: EvidenceId = serde_json::from_str("\"ev-1\"").unwrap();
        assert_eq!(id.to_string(), "ev-1");
    }

    #[test]
    fn record_ids_are_unique() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
        assert_eq!(a.short_id().len(), 8);
    }
}
