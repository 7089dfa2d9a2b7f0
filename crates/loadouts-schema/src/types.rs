//! Identifier types shared by every loadouts crate.
//!
//! String identifiers serialize as plain strings. Owner and user identities
//! are UUIDs; the nil UUID is reserved for the shared global owner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Category key inside a loadout, e.g. `primary` or `tactical`.
    SlotType
);

string_newtype!(
    /// Key of an attachment slot, e.g. `optic`.
    AttachmentKey
);

string_newtype!(
    /// Catalog identifier of an attachment.
    AttachmentId
);

string_newtype!(
    /// Reference to a catalog entry or to a locally configured custom item.
    ItemRef
);

string_newtype!(
    /// Catalog category label, e.g. `rifle`.
    Category
);

string_newtype!(
    /// Material/kind of a concrete item stack.
    ItemKind
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("slot number must be between 1 and {max}, got '{0}'", max = SlotNumber::MAX)]
    InvalidSlot(String),
    #[error("invalid owner id '{0}', expected a UUID or 'global'")]
    InvalidOwner(String),
}

/// A real user of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdError::InvalidOwner(s.to_owned()))
    }
}

/// Owner of a stored loadout: a user, or the reserved global owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// The shared owner every user can apply from.
    pub const GLOBAL: OwnerId = OwnerId(Uuid::nil());

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_global(&self) -> bool {
        self.0.is_nil()
    }

    /// Human-facing label: `global` for the shared owner, the UUID otherwise.
    pub fn label(&self) -> String {
        if self.is_global() {
            "global".to_owned()
        } else {
            self.0.to_string()
        }
    }
}

impl From<UserId> for OwnerId {
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}

/// Always the hyphenated UUID; this is the stored form.
impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("global") {
            return Ok(Self::GLOBAL);
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| IdError::InvalidOwner(s.to_owned()))
    }
}

/// One of the five numbered loadout slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotNumber(u8);

impl SlotNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(n: u8) -> Result<Self, IdError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(IdError::InvalidSlot(n.to_string()))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every slot, in ascending order.
    pub fn all() -> impl Iterator<Item = SlotNumber> {
        (Self::MIN..=Self::MAX).map(SlotNumber)
    }

    /// The stored `slot_name` column value.
    pub fn slot_name(self) -> String {
        self.0.to_string()
    }
}

impl TryFrom<u8> for SlotNumber {
    type Error = IdError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<SlotNumber> for u8 {
    fn from(slot: SlotNumber) -> Self {
        slot.0
    }
}

impl fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SlotNumber {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| IdError::InvalidSlot(s.to_owned()))?;
        Self::new(n)
    }
}

/// Whether an edit targets the user's own slots or the shared global ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Personal,
    Global,
}

impl Scope {
    pub fn owner_for(self, user: UserId) -> OwnerId {
        match self {
            Scope::Personal => OwnerId::from(user),
            Scope::Global => OwnerId::GLOBAL,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Personal => write!(f, "personal"),
            Scope::Global => write!(f, "global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_type_display_and_eq() {
        let slot = SlotType::new("primary");
        assert_eq!(slot.to_string(), "primary");
        assert_eq!(slot, "primary");
        assert_eq!(slot.as_str(), "primary");
    }

    #[test]
    fn item_ref_serializes_as_plain_string() {
        let item = ItemRef::from("RifleX");
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, "\"RifleX\"");
        let back: ItemRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn slot_number_bounds() {
        assert!(SlotNumber::new(0).is_err());
        assert!(SlotNumber::new(1).is_ok());
        assert!(SlotNumber::new(5).is_ok());
        assert!(SlotNumber::new(6).is_err());
        assert_eq!(SlotNumber::all().count(), 5);
    }

    #[test]
    fn slot_number_parse_rejects_garbage() {
        assert_eq!("3".parse::<SlotNumber>().unwrap().get(), 3);
        assert!(matches!(
            "seven".parse::<SlotNumber>(),
            Err(IdError::InvalidSlot(_))
        ));
        assert!("9".parse::<SlotNumber>().is_err());
    }

    #[test]
    fn slot_number_deserialize_validates() {
        assert!(serde_json::from_str::<SlotNumber>("4").is_ok());
        assert!(serde_json::from_str::<SlotNumber>("8").is_err());
    }

    #[test]
    fn global_owner_is_nil_uuid() {
        assert!(OwnerId::GLOBAL.is_global());
        assert_eq!(
            OwnerId::GLOBAL.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(OwnerId::GLOBAL.label(), "global");
        assert_eq!("GLOBAL".parse::<OwnerId>().unwrap(), OwnerId::GLOBAL);
    }

    #[test]
    fn owner_from_user_keeps_uuid() {
        let user = UserId::random();
        let owner = OwnerId::from(user);
        assert_eq!(owner.as_uuid(), user.as_uuid());
        assert!(!owner.is_global());
        assert_eq!(owner.to_string().parse::<OwnerId>().unwrap(), owner);
    }

    #[test]
    fn owner_parse_rejects_garbage() {
        assert!(matches!(
            "not-a-uuid".parse::<OwnerId>(),
            Err(IdError::InvalidOwner(_))
        ));
    }

    #[test]
    fn scope_maps_to_owner() {
        let user = UserId::random();
        assert_eq!(Scope::Personal.owner_for(user), OwnerId::from(user));
        assert_eq!(Scope::Global.owner_for(user), OwnerId::GLOBAL);
    }
}
