use crate::item::ItemStack;
use crate::types::{AttachmentId, AttachmentKey, Category, ItemRef, OwnerId, SlotNumber, SlotType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current time truncated to the millisecond precision the stores keep.
pub fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub const MAX_NAME_CHARS: usize = 32;

/// The trimmed display name, or `None` if it is empty or too long.
pub fn normalize_name(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty() && name.chars().count() <= MAX_NAME_CHARS).then_some(name)
}

/// The item chosen for one slot-type of a loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub slot_type: SlotType,
    pub item_ref: ItemRef,
    /// `None` for custom items.
    pub category: Option<Category>,
    pub is_catalog_item: bool,
    /// Precomputed at selection time; 0 for anything without ammo.
    pub ammo_amount: u32,
}

impl SlotAssignment {
    pub fn catalog(
        slot_type: SlotType,
        item_ref: ItemRef,
        category: Option<Category>,
        ammo_amount: u32,
    ) -> Self {
        Self {
            slot_type,
            item_ref,
            category,
            is_catalog_item: true,
            ammo_amount,
        }
    }

    pub fn custom(slot_type: SlotType, item_ref: ItemRef) -> Self {
        Self {
            slot_type,
            item_ref,
            category: None,
            is_catalog_item: false,
            ammo_amount: 0,
        }
    }
}

/// A saved loadout, identified by `(owner, slot)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub owner: OwnerId,
    pub slot: SlotNumber,
    #[serde(default)]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub assignments: BTreeMap<SlotType, SlotAssignment>,
    #[serde(default)]
    pub attachments: BTreeMap<AttachmentKey, AttachmentId>,
    /// Indexed like [`Inventory::to_final_items`](crate::Inventory::to_final_items):
    /// main positions, then equipped, then the off-hand. `None` marks an
    /// empty position.
    #[serde(default)]
    pub final_items: Vec<Option<ItemStack>>,
}

impl Loadout {
    pub fn new(owner: OwnerId, slot: SlotNumber) -> Self {
        let now = now_millis();
        Self {
            owner,
            slot,
            display_name: None,
            created_at: now,
            updated_at: now,
            assignments: BTreeMap::new(),
            attachments: BTreeMap::new(),
            final_items: Vec::new(),
        }
    }

    /// True when there is at least one item to apply.
    pub fn has_final_items(&self) -> bool {
        self.final_items.iter().any(Option::is_some)
    }

    /// Placeholders exist only as selections and must never be applied.
    pub fn is_placeholder(&self) -> bool {
        !self.has_final_items()
    }

    pub fn set_assignment(&mut self, assignment: SlotAssignment) {
        self.assignments
            .insert(assignment.slot_type.clone(), assignment);
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    /// Display name, or `Slot <n>` when none is set.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Slot {}", self.slot),
        }
    }

    /// Number of non-empty final item positions.
    pub fn item_count(&self) -> usize {
        self.final_items.iter().flatten().count()
    }
}
