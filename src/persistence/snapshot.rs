//! Snapshots
//!
//! The JSON document persisted for a [`CartState`]. Snapshots are decoded leniently (older
//! shapes and missing optional fields still load) and then validated before they may
//! replace live state.
//!
//! Browser clients persisted through redux-persist, which writes every top-level value as
//! a JSON string next to a `_persist` marker. Such documents are unwrapped before decoding.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    carts::{CartState, UserCart, UserId},
    coupons::{AppliedCoupon, CouponError},
    entries::{EntryError, ItemId},
};

/// Current snapshot schema. Snapshots without a schema number are treated as version 0.
pub const SCHEMA_VERSION: u32 = 1;

/// Top-level snapshot fields that can be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedField {
    /// The cart table
    Carts,

    /// The active user
    CurrentUserId,
}

/// Which top-level fields are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedFields {
    carts: bool,
    current_user_id: bool,
}

impl PersistedFields {
    /// Persist everything.
    pub const ALL: Self = Self {
        carts: true,
        current_user_id: true,
    };

    /// Persist only the listed fields.
    pub fn whitelist(fields: &[PersistedField]) -> Self {
        Self {
            carts: fields.contains(&PersistedField::Carts),
            current_user_id: fields.contains(&PersistedField::CurrentUserId),
        }
    }

    /// Whether `field` is written.
    pub fn includes(&self, field: PersistedField) -> bool {
        match field {
            PersistedField::Carts => self.carts,
            PersistedField::CurrentUserId => self.current_user_id,
        }
    }
}

impl Default for PersistedFields {
    fn default() -> Self {
        Self::ALL
    }
}

/// Snapshot errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The document is not valid JSON or has an unknown shape.
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot was written by a newer schema.
    #[error("snapshot schema {found} is newer than supported schema {supported}")]
    UnsupportedSchema {
        /// Schema number in the snapshot
        found: u32,
        /// Highest schema this build reads
        supported: u32,
    },

    /// The snapshot decoded but breaks cart invariants.
    #[error(transparent)]
    Rejected(#[from] SnapshotRejected),
}

/// One invariant violation found in a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotIssue {
    /// A cart is keyed by an empty user id.
    #[error("cart keyed by a blank user id")]
    BlankUserId,

    /// An entry breaks an entry invariant.
    #[error("cart for {user}, item {item}: {source}")]
    InvalidEntry {
        /// Cart owner
        user: UserId,
        /// Offending item
        item: ItemId,
        /// What is wrong with it
        source: EntryError,
    },

    /// The same item id appears twice in one cart.
    #[error("cart for {user} lists item {item} more than once")]
    DuplicateItem {
        /// Cart owner
        user: UserId,
        /// Repeated item
        item: ItemId,
    },

    /// The applied coupon is malformed.
    #[error("cart for {user}: {source}")]
    InvalidCoupon {
        /// Cart owner
        user: UserId,
        /// What is wrong with the coupon
        source: CouponError,
    },
}

/// A snapshot that failed validation, with every issue found.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("snapshot rejected with {} issue(s)", .issues.len())]
pub struct SnapshotRejected {
    /// All issues, in discovery order
    pub issues: SmallVec<[SnapshotIssue; 4]>,
}

/// Persisted form of a [`CartState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema the snapshot was written with
    #[serde(default)]
    pub schema_version: u32,

    /// Cart table, absent when not persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carts: Option<FxHashMap<UserId, UserCart>>,

    /// Active user, absent when not persisted or unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_id: Option<UserId>,
}

impl Snapshot {
    /// Capture the persisted subset of `state`.
    pub fn capture(state: &CartState, fields: PersistedFields) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            carts: fields
                .includes(PersistedField::Carts)
                .then(|| state.carts().clone()),
            current_user_id: if fields.includes(PersistedField::CurrentUserId) {
                state.current_user_id().cloned()
            } else {
                None
            },
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON snapshot without validating cart invariants.
    ///
    /// Unknown top-level keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] for malformed input and
    /// [`SnapshotError::UnsupportedSchema`] for snapshots from a newer schema.
    pub fn decode(raw: &str) -> Result<Self, SnapshotError> {
        let mut document: Value = serde_json::from_str(raw)?;

        unwrap_persist_envelope(&mut document)?;

        let snapshot: Snapshot = serde_json::from_value(document)?;

        if snapshot.schema_version > SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema {
                found: snapshot.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        Ok(snapshot)
    }

    /// Check every cart invariant and build the state the snapshot describes.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotRejected`] listing every issue found.
    pub fn validate(self) -> Result<CartState, SnapshotRejected> {
        let carts = self.carts.unwrap_or_default();

        let mut issues = SmallVec::<[SnapshotIssue; 4]>::new();

        for (user, cart) in &carts {
            collect_cart_issues(user, cart, &mut issues);
        }

        if self.current_user_id.as_ref().is_some_and(UserId::is_blank) {
            issues.push(SnapshotIssue::BlankUserId);
        }

        if issues.is_empty() {
            Ok(CartState::from_parts(carts, self.current_user_id))
        } else {
            Err(SnapshotRejected { issues })
        }
    }
}

/// Parse the string-encoded top-level values of a redux-persist document in place.
///
/// Documents without a string `_persist` marker are left alone.
fn unwrap_persist_envelope(document: &mut Value) -> Result<(), serde_json::Error> {
    let Value::Object(fields) = document else {
        return Ok(());
    };

    if !fields.get("_persist").is_some_and(Value::is_string) {
        return Ok(());
    }

    for field in fields.values_mut() {
        if let Value::String(encoded) = field {
            let decoded: Value = serde_json::from_str(encoded)?;

            *field = decoded;
        }
    }

    Ok(())
}

fn collect_cart_issues(user: &UserId, cart: &UserCart, issues: &mut SmallVec<[SnapshotIssue; 4]>) {
    if user.is_blank() {
        issues.push(SnapshotIssue::BlankUserId);
    }

    let mut seen = FxHashSet::default();

    for entry in cart.items() {
        if let Err(source) = entry.validate() {
            issues.push(SnapshotIssue::InvalidEntry {
                user: user.clone(),
                item: entry.id,
                source,
            });
        }

        if !seen.insert(entry.id) {
            issues.push(SnapshotIssue::DuplicateItem {
                user: user.clone(),
                item: entry.id,
            });
        }
    }

    if let Some(Err(source)) = cart.applied_coupon().map(AppliedCoupon::validate) {
        issues.push(SnapshotIssue::InvalidCoupon {
            user: user.clone(),
            source,
        });
    }
}
