//! Item stacks and the inventory they live in.
//!
//! An [`ItemStack`] is an immutable value: every "change" builds a new stack,
//! and copying one into a backup or out of storage is a plain `clone`. Nothing
//! can alias a stack held by someone else.

use crate::types::ItemKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_STACK: u32 = 64;

/// Main inventory positions; the first [`HOTBAR_SIZE`] are the hotbar.
pub const MAIN_SIZE: usize = 36;
pub const HOTBAR_SIZE: usize = 9;
pub const EQUIPPED_SIZE: usize = 4;
/// Final-item index of the off-hand. Main positions come first, then the
/// equipped positions, then this one.
pub const OFFHAND_INDEX: usize = MAIN_SIZE + EQUIPPED_SIZE;
/// Length of a full final-item snapshot.
pub const FINAL_ITEMS_SIZE: usize = OFFHAND_INDEX + 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    kind: ItemKind,
    amount: u32,
    max_stack: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
}

impl ItemStack {
    pub fn new(kind: impl Into<ItemKind>, amount: u32) -> Self {
        Self {
            kind: kind.into(),
            amount: amount.max(1),
            max_stack: DEFAULT_MAX_STACK,
            display_name: None,
            tags: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_amount(&self, amount: u32) -> Self {
        Self {
            amount: amount.max(1),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack.max(1);
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn max_stack(&self) -> u32 {
        self.max_stack
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Same item apart from the amount, so the two can share a stack.
    pub fn is_similar(&self, other: &ItemStack) -> bool {
        self.kind == other.kind
            && self.max_stack == other.max_stack
            && self.display_name == other.display_name
            && self.tags == other.tags
    }

    /// Split `total` units of `template` into full stacks plus a remainder.
    pub fn split_into_stacks(template: &ItemStack, total: u32) -> Vec<ItemStack> {
        let mut stacks = Vec::new();
        let mut remaining = total;
        while remaining > 0 {
            let take = remaining.min(template.max_stack);
            stacks.push(template.with_amount(take));
            remaining -= take;
        }
        stacks
    }
}

/// A user's live inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    main: Vec<Option<ItemStack>>,
    equipped: Vec<Option<ItemStack>>,
    offhand: Option<ItemStack>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            main: vec![None; MAIN_SIZE],
            equipped: vec![None; EQUIPPED_SIZE],
            offhand: None,
        }
    }

    /// Number of main positions.
    pub fn size(&self) -> usize {
        self.main.len()
    }

    pub fn contents(&self) -> &[Option<ItemStack>] {
        &self.main
    }

    pub fn equipped(&self) -> &[Option<ItemStack>] {
        &self.equipped
    }

    pub fn offhand(&self) -> Option<&ItemStack> {
        self.offhand.as_ref()
    }

    pub fn get(&self, index: usize) -> Option<&ItemStack> {
        self.main.get(index).and_then(Option::as_ref)
    }

    /// Place `item` at `index`. Returns `false` when the index is out of range.
    pub fn set(&mut self, index: usize, item: Option<ItemStack>) -> bool {
        match self.main.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn set_equipped(&mut self, index: usize, item: Option<ItemStack>) -> bool {
        match self.equipped.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn set_offhand(&mut self, item: Option<ItemStack>) {
        self.offhand = item;
    }

    /// Empty every position, including equipped items and the off-hand.
    pub fn clear(&mut self) {
        self.main.iter_mut().for_each(|slot| *slot = None);
        self.equipped.iter_mut().for_each(|slot| *slot = None);
        self.offhand = None;
    }

    pub fn is_empty(&self) -> bool {
        self.main.iter().all(Option::is_none)
            && self.equipped.iter().all(Option::is_none)
            && self.offhand.is_none()
    }

    /// Add `item`, topping up similar stacks before taking empty positions.
    ///
    /// Returns whatever did not fit.
    pub fn add_item(&mut self, item: ItemStack) -> Option<ItemStack> {
        let mut remaining = item.amount();

        for existing in self.main.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if !existing.is_similar(&item) {
                continue;
            }
            let space = existing.max_stack().saturating_sub(existing.amount());
            if space == 0 {
                continue;
            }
            let moved = space.min(remaining);
            *existing = existing.with_amount(existing.amount() + moved);
            remaining -= moved;
        }

        for slot in &mut self.main {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let placed = remaining.min(item.max_stack());
                *slot = Some(item.with_amount(placed));
                remaining -= placed;
            }
        }

        if remaining == 0 {
            None
        } else {
            Some(item.with_amount(remaining))
        }
    }

    /// Flat snapshot of every position: main, then equipped, then off-hand.
    pub fn to_final_items(&self) -> Vec<Option<ItemStack>> {
        let mut items = Vec::with_capacity(FINAL_ITEMS_SIZE);
        items.extend(self.main.iter().cloned());
        items.extend(self.equipped.iter().cloned());
        items.push(self.offhand.clone());
        items
    }

    /// Inverse of [`Inventory::to_final_items`]. Positions past the
    /// off-hand are ignored; a shorter snapshot leaves the rest empty.
    pub fn from_final_items(items: &[Option<ItemStack>]) -> Self {
        let mut inventory = Self::new();
        for (index, item) in items.iter().enumerate().take(FINAL_ITEMS_SIZE) {
            let Some(item) = item else { continue };
            match index {
                i if i < MAIN_SIZE => {
                    inventory.main[i] = Some(item.clone());
                }
                OFFHAND_INDEX => inventory.offhand = Some(item.clone()),
                i => inventory.equipped[i - MAIN_SIZE] = Some(item.clone()),
            }
        }
        inventory
    }

    /// Total amount of `kind` across the main positions.
    pub fn count_of(&self, kind: &str) -> u32 {
        self.main
            .iter()
            .flatten()
            .filter(|stack| stack.kind() == kind)
            .map(ItemStack::amount)
            .sum()
    }

    /// First main position holding `kind`.
    pub fn position_of(&self, kind: &str) -> Option<usize> {
        self.main
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|stack| stack.kind() == kind))
    }
}
