//! Turning working selections into concrete items and laying them out in
//! the staging inventory.

use crate::catalog::{AttachmentFactory, Catalog};
use loadouts_schema::{
    AttachmentId, AttachmentKey, Inventory, ItemStack, LoadoutsConfig, SlotAssignment, SlotType,
    HOTBAR_SIZE,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Materialized selections, grouped by how they are placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedItems {
    pub weapons: Vec<ItemStack>,
    pub ammo: Vec<ItemStack>,
    pub consumables: Vec<ItemStack>,
    pub custom: Vec<ItemStack>,
    pub attachments: Vec<ItemStack>,
}

impl StagedItems {
    pub fn len(&self) -> usize {
        self.weapons.len()
            + self.ammo.len()
            + self.consumables.len()
            + self.custom.len()
            + self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub placed: usize,
    /// Stacks that did not fit, wholly or partly.
    pub dropped: usize,
}

pub fn materialize(
    selections: &BTreeMap<SlotType, SlotAssignment>,
    attachments: &BTreeMap<AttachmentKey, AttachmentId>,
    config: &LoadoutsConfig,
    catalog: &dyn Catalog,
    factory: &dyn AttachmentFactory,
) -> StagedItems {
    let mut staged = StagedItems::default();

    for assignment in selections.values() {
        let item_ref = &assignment.item_ref;
        if !assignment.is_catalog_item {
            let Some(custom) = config.custom_items.get(item_ref) else {
                warn!("custom item '{item_ref}' is no longer configured, skipping");
                continue;
            };
            let mut template = ItemStack::new(custom.material.clone(), 1);
            if let Some(name) = &custom.display_name {
                template = template.with_display_name(name.clone());
            }
            staged
                .custom
                .extend(ItemStack::split_into_stacks(&template, custom.amount.max(1)));
        } else if catalog.has_ammo_config(item_ref) {
            let Some(weapon) = catalog.generate_item(item_ref) else {
                warn!("catalog cannot generate '{item_ref}', skipping");
                continue;
            };
            staged.weapons.push(weapon);
            if assignment.ammo_amount > 0 {
                staged
                    .ammo
                    .extend(catalog.generate_ammo(item_ref, assignment.ammo_amount));
            }
        } else {
            let amount = config.item_amount(item_ref, assignment.category.as_ref());
            let stacks = catalog.generate_consumables(item_ref, amount);
            if stacks.is_empty() {
                warn!("catalog cannot generate '{item_ref}', skipping");
            }
            staged.consumables.extend(stacks);
        }
    }

    for (key, id) in attachments {
        match factory.create(id) {
            Some(item) => staged.attachments.push(item),
            None => debug!("no item for attachment '{id}' in {key}"),
        }
    }

    staged
}

/// Weapons, then consumables, then custom items take free hotbar positions
/// in order; everything else is added wherever it fits.
pub fn place(staged: &StagedItems, inventory: &mut Inventory) -> Placement {
    let mut placement = Placement::default();
    let mut next_hotbar = 0;

    let hotbar_items = staged
        .weapons
        .iter()
        .chain(&staged.consumables)
        .chain(&staged.custom);
    for item in hotbar_items {
        while next_hotbar < HOTBAR_SIZE && inventory.get(next_hotbar).is_some() {
            next_hotbar += 1;
        }
        if next_hotbar < HOTBAR_SIZE {
            inventory.set(next_hotbar, Some(item.clone()));
            next_hotbar += 1;
            placement.placed += 1;
        } else {
            add_or_drop(inventory, item, &mut placement);
        }
    }

    for item in staged.ammo.iter().chain(&staged.attachments) {
        add_or_drop(inventory, item, &mut placement);
    }

    placement
}

fn add_or_drop(inventory: &mut Inventory, item: &ItemStack, placement: &mut Placement) {
    match inventory.add_item(item.clone()) {
        None => placement.placed += 1,
        Some(leftover) => {
            warn!(
                "no room for {} x{}, dropping it",
                leftover.kind(),
                leftover.amount()
            );
            placement.dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NoAttachments, StaticCatalog};
    use loadouts_schema::{parse_config_str, MAIN_SIZE};

    fn config() -> LoadoutsConfig {
        parse_config_str(
            r#"
[ammo_multipliers]
default = 4
[item_amounts]
default = 1
bandage = 5
[slots.primary]
allowed_categories = ["rifle"]
[slots.medical]
allowed_categories = ["medical"]
[slots.tactical]
allowed_categories = []
[custom_items.medkit]
slot_type = "tactical"
display_name = "Medkit"
material = "golden_apple"
amount = 2
"#,
        )
        .unwrap()
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_item("RifleX", "rifle", "crossbow")
            .with_magazine("RifleX", 30, "arrow")
            .with_item("bandage", "medical", "paper")
            .with_attachment("red_dot", "scopes", "spyglass")
    }

    fn selections() -> BTreeMap<SlotType, SlotAssignment> {
        [
            SlotAssignment::catalog("primary".into(), "RifleX".into(), Some("rifle".into()), 120),
            SlotAssignment::catalog("medical".into(), "bandage".into(), Some("medical".into()), 0),
            SlotAssignment::custom("tactical".into(), "medkit".into()),
        ]
        .into_iter()
        .map(|a| (a.slot_type.clone(), a))
        .collect()
    }

    #[test]
    fn materialize_groups_by_kind() {
        let c = catalog();
        let factory = crate::catalog::resolve_attachment_factory(&c);
        let attachments = BTreeMap::from([(AttachmentKey::from("optic"), AttachmentId::from("red_dot"))]);
        let staged = materialize(&selections(), &attachments, &config(), &c, factory.as_ref());

        assert_eq!(staged.weapons.len(), 1);
        assert_eq!(staged.ammo.iter().map(ItemStack::amount).sum::<u32>(), 120);
        assert_eq!(staged.consumables.len(), 1);
        assert_eq!(staged.consumables[0].amount(), 5);
        assert_eq!(staged.custom[0].display_name(), Some("Medkit"));
        assert_eq!(staged.custom[0].amount(), 2);
        assert_eq!(staged.attachments[0].kind(), "spyglass");
    }

    #[test]
    fn missing_attachment_factory_yields_nothing() {
        let attachments = BTreeMap::from([(AttachmentKey::from("optic"), AttachmentId::from("red_dot"))]);
        let staged = materialize(&BTreeMap::new(), &attachments, &config(), &catalog(), &NoAttachments);
        assert!(staged.is_empty());
    }

    #[test]
    fn unconfigured_custom_item_is_skipped() {
        let selections = BTreeMap::from([(
            SlotType::from("tactical"),
            SlotAssignment::custom("tactical".into(), "ghost".into()),
        )]);
        let staged = materialize(&selections, &BTreeMap::new(), &config(), &catalog(), &NoAttachments);
        assert!(staged.is_empty());
    }

    #[test]
    fn hotbar_order_is_weapons_consumables_custom() {
        let c = catalog();
        let staged = materialize(&selections(), &BTreeMap::new(), &config(), &c, &NoAttachments);
        let mut inventory = Inventory::new();
        let placement = place(&staged, &mut inventory);

        assert_eq!(inventory.get(0).unwrap().kind(), "crossbow");
        assert_eq!(inventory.get(1).unwrap().kind(), "paper");
        assert_eq!(inventory.get(2).unwrap().kind(), "golden_apple");
        assert_eq!(inventory.count_of("arrow"), 120);
        assert_eq!(inventory.position_of("arrow"), Some(3));
        assert_eq!(placement.dropped, 0);
        assert_eq!(placement.placed, staged.len());
    }

    #[test]
    fn hotbar_overflow_goes_to_main_inventory() {
        let staged = StagedItems {
            weapons: (0..11).map(|i| ItemStack::new(format!("gun{i}"), 1)).collect(),
            ..StagedItems::default()
        };
        let mut inventory = Inventory::new();
        place(&staged, &mut inventory);
        assert_eq!(inventory.get(8).unwrap().kind(), "gun8");
        assert_eq!(inventory.get(9).unwrap().kind(), "gun9");
        assert_eq!(inventory.get(10).unwrap().kind(), "gun10");
    }

    #[test]
    fn items_that_do_not_fit_are_dropped() {
        let staged = StagedItems {
            ammo: (0..MAIN_SIZE + 2)
                .map(|i| ItemStack::new(format!("ammo{i}"), 1))
                .collect(),
            ..StagedItems::default()
        };
        let mut inventory = Inventory::new();
        let placement = place(&staged, &mut inventory);
        assert_eq!(placement.placed, MAIN_SIZE);
        assert_eq!(placement.dropped, 2);
    }
}
