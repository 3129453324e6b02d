//! Strongly typed identifiers and the optimistic-concurrency [`Version`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct ParseIdError(String);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError(format!("{s}: {e}")))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Identity of an organizer (resolved by the auth collaborator)
    OrganizerId
);
uuid_id!(
    /// Identity of a participant (resolved by the auth collaborator)
    ParticipantId
);
uuid_id!(
    /// Unique identifier for a team
    TeamId
);
uuid_id!(
    /// Unique identifier for a merchandise order
    OrderId
);
uuid_id!(
    /// Unique identifier for a registration record
    RegistrationId
);

/// Human-readable ticket identifier, e.g. `FEL-7KQ2M9XRTA`.
///
/// Minted by [`crate::ticket::TicketIssuer`]; global uniqueness is enforced by
/// the storage layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wrap an existing ticket identifier (e.g. loaded from storage).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ticket identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short shareable code that lets a participant join a team.
///
/// Codes are case-insensitive on input; [`InviteCode::parse`] normalizes to
/// uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Wrap a code minted by the issuer or loaded from storage.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Normalize user input (trim, uppercase).
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the input is empty after trimming.
    pub fn parse(input: &str) -> Result<Self, ParseIdError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseIdError("invite code cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row version for optimistic concurrency control.
///
/// Every persisted event carries a version that increments on each write.
/// Writers pass the version they read; the store rejects the write with
/// [`crate::store::StoreError::ConcurrencyConflict`] if the row moved on.
///
/// # Examples
///
/// ```
/// use felicity_core::ids::Version;
///
/// let v1 = Version::INITIAL.next();
/// assert_eq!(v1, Version::new(2));
/// assert_eq!(v1.value(), 2);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly inserted row.
    pub const INITIAL: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
