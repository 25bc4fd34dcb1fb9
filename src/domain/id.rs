use std::{fmt, num::NonZeroU64, str::FromStr};

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a valid record identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid identifier '{0}': must be a positive integer")]
pub struct InvalidIdError(String);

impl InvalidIdError {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// The smallest identifier, used for the first record of a kind.
            pub const MIN: Self = Self(NonZeroU64::MIN);

            /// Returns the numeric value of the identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0.get()
            }

            /// Returns the identifier following this one, if it does not
            /// overflow.
            #[must_use]
            pub fn next(self) -> Option<Self> {
                self.0.checked_add(1).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<NonZeroU64>()
                    .map(Self)
                    .map_err(|_| InvalidIdError(s.to_string()))
            }
        }

        impl TryFrom<u64> for $name {
            type Error = InvalidIdError;

            fn try_from(value: u64) -> Result<Self, Self::Error> {
                NonZeroU64::new(value)
                    .map(Self)
                    .ok_or_else(|| InvalidIdError(value.to_string()))
            }
        }
    };
}

record_id!(
    /// Identifier of a network unit.
    ///
    /// Unit identifiers are positive integers. They are assigned once, when
    /// the unit is created, and never change afterwards.
    UnitId
);

record_id!(
    /// Identifier of a product record.
    ProductId
);
