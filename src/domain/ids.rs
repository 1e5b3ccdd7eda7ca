//! Type-safe numeric identifiers.
//!
//! Every persisted entity is keyed by a `BIGINT`. Each key gets its own
//! newtype so a product id cannot be passed where a variant id is expected.
//! Identifiers arriving as strings (path segments, snapshot fields) go
//! through [`FromStr`], which rejects non-numeric and negative input with
//! [`PipelineError::Validation`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_key(s, $label).map(Self)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a node in the category tree.
    CategoryId,
    "category id"
);
numeric_id!(
    /// Identifier of a catalog product (the source site's product id).
    ProductId,
    "product id"
);
numeric_id!(
    /// Identifier of a product variant (the source site's variant id).
    VariantId,
    "variant id"
);
numeric_id!(
    /// Identifier of a stored notification preference.
    PreferenceId,
    "preference id"
);
numeric_id!(
    /// Identifier of a stored notification.
    NotificationId,
    "notification id"
);

fn parse_key(raw: &str, label: &str) -> Result<i64, PipelineError> {
    let trimmed = raw.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| PipelineError::Validation(format!("{label} `{raw}` is not numeric")))?;
    if value < 0 {
        return Err(PipelineError::Validation(format!(
            "{label} `{raw}` must not be negative"
        )));
    }
    Ok(value)
}
