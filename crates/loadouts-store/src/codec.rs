//! Row <-> entity conversion shared by the SQL backends.
//!
//! Item blobs are the JSON form of `ItemStack`. A blob that fails to decode
//! costs only its own position: it is logged and left empty.

use crate::StoreError;
use loadouts_schema::{
    from_millis, AttachmentId, AttachmentKey, ItemStack, Loadout, OwnerId, SlotAssignment,
    SlotNumber, FINAL_ITEMS_SIZE,
};
use std::collections::BTreeMap;
use tracing::warn;

/// Dependent tables, in the order they are cleared on save and delete.
pub(crate) const DEPENDENT_TABLES: [&str; 3] =
    ["slot_assignments", "attachment_selections", "final_items"];

pub fn encode_item(item: &ItemStack) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(item)?)
}

pub fn decode_item(blob: &[u8]) -> Result<ItemStack, StoreError> {
    Ok(serde_json::from_slice(blob)?)
}

/// `(index, blob)` pairs for every occupied position.
pub(crate) fn encode_items(items: &[Option<ItemStack>]) -> Result<Vec<(i64, Vec<u8>)>, StoreError> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| item.as_ref().map(|item| (index as i64, item)))
        .map(|(index, item)| Ok((index, encode_item(item)?)))
        .collect()
}

/// Rebuild the sparse item sequence. Gaps and undecodable blobs become `None`;
/// positions outside `0..FINAL_ITEMS_SIZE` are dropped.
pub(crate) fn hydrate_items(
    rows: Vec<(i64, Vec<u8>)>,
    owner: OwnerId,
    slot: SlotNumber,
) -> Vec<Option<ItemStack>> {
    let positioned: Vec<(usize, Vec<u8>)> = rows
        .into_iter()
        .filter_map(|(index, blob)| match usize::try_from(index) {
            Ok(position) if position < FINAL_ITEMS_SIZE => Some((position, blob)),
            _ => {
                warn!("skipping item with out-of-range index {index} in loadout {owner}/{slot}");
                None
            }
        })
        .collect();
    let len = positioned
        .iter()
        .map(|(position, _)| *position)
        .max()
        .map_or(0, |max| max + 1);
    let mut items = vec![None; len];
    for (position, blob) in positioned {
        match decode_item(&blob) {
            Ok(item) => items[position] = Some(item),
            Err(e) => {
                warn!("failed to decode item {position} of loadout {owner}/{slot}: {e}");
            }
        }
    }
    items
}

pub(crate) fn parse_owner(raw: &str) -> Result<OwnerId, StoreError> {
    raw.parse().map_err(|_| StoreError::Corrupt {
        table: "loadouts",
        detail: format!("invalid owner '{raw}'"),
    })
}

pub(crate) fn parse_slot(raw: &str) -> Result<SlotNumber, StoreError> {
    raw.parse().map_err(|_| StoreError::Corrupt {
        table: "loadouts",
        detail: format!("invalid slot_name '{raw}'"),
    })
}

/// The `loadouts` row of a stored loadout.
pub(crate) struct LoadoutHeader {
    pub id: i64,
    pub owner: OwnerId,
    pub slot: SlotNumber,
    pub display_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub(crate) struct AssignmentRow {
    pub slot_type: String,
    pub item_ref: String,
    pub category: Option<String>,
    pub is_catalog_item: bool,
    pub ammo_amount: i64,
}

impl AssignmentRow {
    fn into_assignment(self) -> SlotAssignment {
        SlotAssignment {
            slot_type: self.slot_type.into(),
            item_ref: self.item_ref.into(),
            category: self.category.map(Into::into),
            is_catalog_item: self.is_catalog_item,
            ammo_amount: u32::try_from(self.ammo_amount).unwrap_or(0),
        }
    }
}

pub(crate) fn assemble(
    header: LoadoutHeader,
    assignments: Vec<AssignmentRow>,
    attachments: Vec<(String, String)>,
    items: Vec<(i64, Vec<u8>)>,
) -> Loadout {
    let assignments: BTreeMap<_, _> = assignments
        .into_iter()
        .map(AssignmentRow::into_assignment)
        .map(|a| (a.slot_type.clone(), a))
        .collect();
    let attachments: BTreeMap<AttachmentKey, AttachmentId> = attachments
        .into_iter()
        .map(|(key, id)| (key.into(), id.into()))
        .collect();
    Loadout {
        owner: header.owner,
        slot: header.slot,
        display_name: header.display_name,
        created_at: from_millis(header.created_at),
        updated_at: from_millis(header.updated_at),
        assignments,
        attachments,
        final_items: hydrate_items(items, header.owner, header.slot),
    }
}
