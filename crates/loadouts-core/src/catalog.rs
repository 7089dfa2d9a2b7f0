//! The item catalog seam.
//!
//! Hosts plug their item system in through `Catalog`. Attachment generation
//! is an optional extra capability: `resolve_attachment_factory` looks it up
//! once and falls back to `NoAttachments`.

use loadouts_schema::{AttachmentId, Category, ConfigError, ItemKind, ItemRef, ItemStack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Tag set on every item a catalog generates, holding its catalog id.
pub const ITEM_REF_TAG: &str = "loadout_item";

pub trait Catalog: Send + Sync {
    fn category_of(&self, item: &ItemRef) -> Option<Category>;

    /// A single instance of `item`, or `None` when the catalog lacks it.
    fn generate_item(&self, item: &ItemRef) -> Option<ItemStack>;

    /// Rounds per magazine; 0 when the item takes no ammo.
    fn magazine_size(&self, item: &ItemRef) -> u32;

    /// Items of `category`, in listing order.
    fn items_in_category(&self, category: &Category) -> Vec<ItemRef>;

    fn has_ammo_config(&self, item: &ItemRef) -> bool;

    /// `total` rounds of ammo for `item`, split into stacks.
    fn generate_ammo(&self, item: &ItemRef, total: u32) -> Vec<ItemStack>;

    fn generate_consumables(&self, item: &ItemRef, amount: u32) -> Vec<ItemStack> {
        self.generate_item(item)
            .map(|template| ItemStack::split_into_stacks(&template, amount.max(1)))
            .unwrap_or_default()
    }

    /// Attachments of any of `categories`, sorted by id.
    fn attachments_in_categories(&self, _categories: &[Category]) -> Vec<AttachmentId> {
        Vec::new()
    }

    fn attachment_factory(&self) -> Option<Arc<dyn AttachmentFactory>> {
        None
    }
}

/// Optional capability that turns attachment ids into items.
pub trait AttachmentFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, attachment: &AttachmentId) -> Option<ItemStack>;
}

/// Fallback factory: produces nothing and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAttachments;

impl AttachmentFactory for NoAttachments {
    fn name(&self) -> &'static str {
        "none"
    }

    fn create(&self, _attachment: &AttachmentId) -> Option<ItemStack> {
        None
    }
}

pub fn resolve_attachment_factory(catalog: &dyn Catalog) -> Arc<dyn AttachmentFactory> {
    if let Some(factory) = catalog.attachment_factory() {
        debug!("attachment factory: {}", factory.name());
        factory
    } else {
        info!("no attachment factory available, attachments will be skipped");
        Arc::new(NoAttachments)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    pub category: Category,
    pub material: ItemKind,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub magazine_size: u32,
    #[serde(default)]
    pub ammo: Option<ItemKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentEntry {
    pub category: Category,
    pub material: ItemKind,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Table-driven catalog, built in code or parsed from TOML:
///
/// ```toml
/// [items.RifleX]
/// category = "rifle"
/// material = "crossbow"
/// magazine_size = 30
/// ammo = "arrow"
///
/// [attachments.red_dot]
/// category = "scopes"
/// material = "spyglass"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticCatalog {
    #[serde(default)]
    items: BTreeMap<ItemRef, CatalogEntry>,
    #[serde(default)]
    attachments: BTreeMap<AttachmentId, AttachmentEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    #[must_use]
    pub fn with_item(
        mut self,
        id: impl Into<ItemRef>,
        category: impl Into<Category>,
        material: impl Into<ItemKind>,
    ) -> Self {
        self.items.insert(
            id.into(),
            CatalogEntry {
                category: category.into(),
                material: material.into(),
                display_name: None,
                magazine_size: 0,
                ammo: None,
            },
        );
        self
    }

    /// Give an already added item a magazine. Unknown ids are ignored.
    #[must_use]
    pub fn with_magazine(mut self, id: &str, magazine_size: u32, ammo: impl Into<ItemKind>) -> Self {
        if let Some(entry) = self.items.get_mut(&ItemRef::from(id)) {
            entry.magazine_size = magazine_size;
            entry.ammo = Some(ammo.into());
        }
        self
    }

    #[must_use]
    pub fn with_attachment(
        mut self,
        id: impl Into<AttachmentId>,
        category: impl Into<Category>,
        material: impl Into<ItemKind>,
    ) -> Self {
        self.attachments.insert(
            id.into(),
            AttachmentEntry {
                category: category.into(),
                material: material.into(),
                display_name: None,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn category_of(&self, item: &ItemRef) -> Option<Category> {
        self.items.get(item).map(|entry| entry.category.clone())
    }

    fn generate_item(&self, item: &ItemRef) -> Option<ItemStack> {
        let entry = self.items.get(item)?;
        let stack = ItemStack::new(entry.material.clone(), 1).with_tag(ITEM_REF_TAG, item.as_str());
        Some(match &entry.display_name {
            Some(name) => stack.with_display_name(name.clone()),
            None => stack,
        })
    }

    fn magazine_size(&self, item: &ItemRef) -> u32 {
        self.items.get(item).map_or(0, |entry| entry.magazine_size)
    }

    fn items_in_category(&self, category: &Category) -> Vec<ItemRef> {
        self.items
            .iter()
            .filter(|(_, entry)| entry.category == *category)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn has_ammo_config(&self, item: &ItemRef) -> bool {
        self.items
            .get(item)
            .is_some_and(|entry| entry.magazine_size > 0 && entry.ammo.is_some())
    }

    fn generate_ammo(&self, item: &ItemRef, total: u32) -> Vec<ItemStack> {
        match self.items.get(item).and_then(|entry| entry.ammo.clone()) {
            Some(ammo) if total > 0 => ItemStack::split_into_stacks(&ItemStack::new(ammo, 1), total),
            _ => Vec::new(),
        }
    }

    fn attachments_in_categories(&self, categories: &[Category]) -> Vec<AttachmentId> {
        self.attachments
            .iter()
            .filter(|(_, entry)| categories.contains(&entry.category))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn attachment_factory(&self) -> Option<Arc<dyn AttachmentFactory>> {
        if self.attachments.is_empty() {
            return None;
        }
        Some(Arc::new(StaticAttachments {
            entries: self.attachments.clone(),
        }))
    }
}

struct StaticAttachments {
    entries: BTreeMap<AttachmentId, AttachmentEntry>,
}

impl AttachmentFactory for StaticAttachments {
    fn name(&self) -> &'static str {
        "static"
    }

    fn create(&self, attachment: &AttachmentId) -> Option<ItemStack> {
        let entry = self.entries.get(attachment)?;
        let stack = ItemStack::new(entry.material.clone(), 1)
            .with_tag(ITEM_REF_TAG, attachment.as_str());
        Some(match &entry.display_name {
            Some(name) => stack.with_display_name(name.clone()),
            None => stack,
        })
    }
}
