use crate::types::{AttachmentKey, Category, ItemKind, ItemRef, SlotNumber, SlotType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_AMMO_MULTIPLIER: u32 = 4;
pub const DEFAULT_ITEM_AMOUNT: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("config error: menu.items_per_page must be greater than 0")]
    InvalidItemsPerPage,
    #[error("config error: max_loadouts must be between 1 and 5, got {0}")]
    InvalidMaxLoadouts(u8),
    #[error("config error: custom item '{item}' references unknown slot '{slot_type}'")]
    UnknownCustomItemSlot { item: String, slot_type: String },
    #[error("config error: database.mysql.pool_size must be greater than 0")]
    InvalidPoolSize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoadoutsConfig {
    #[serde(default = "default_max_loadouts")]
    pub max_loadouts: u8,
    #[serde(default)]
    pub database: DatabaseSection,
    /// Per-category ammo multiplier; the `default` key is the fallback.
    #[serde(default)]
    pub ammo_multipliers: AmountTable,
    /// Per-item, then per-category stack amount for consumables.
    #[serde(default)]
    pub item_amounts: AmountTable,
    #[serde(default)]
    pub slots: BTreeMap<SlotType, SlotSection>,
    #[serde(default)]
    pub attachment_slots: BTreeMap<AttachmentKey, AttachmentSlotSection>,
    #[serde(default)]
    pub custom_items: BTreeMap<ItemRef, CustomItemSection>,
    #[serde(default)]
    pub menu: MenuSection,
    #[serde(default)]
    pub confirm: ConfirmSection,
    #[serde(default)]
    pub journal: JournalSection,
}

impl Default for LoadoutsConfig {
    fn default() -> Self {
        Self {
            max_loadouts: default_max_loadouts(),
            database: DatabaseSection::default(),
            ammo_multipliers: AmountTable::default(),
            item_amounts: AmountTable::default(),
            slots: BTreeMap::new(),
            attachment_slots: BTreeMap::new(),
            custom_items: BTreeMap::new(),
            menu: MenuSection::default(),
            confirm: ConfirmSection::default(),
            journal: JournalSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    #[serde(default)]
    pub backend: DatabaseBackend,
    #[serde(default)]
    pub sqlite: SqliteSection,
    #[serde(default)]
    pub mysql: MysqlSection,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    #[default]
    Mysql,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
            DatabaseBackend::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SqliteSection {
    #[serde(default = "default_sqlite_file")]
    pub file: PathBuf,
}

impl Default for SqliteSection {
    fn default() -> Self {
        Self {
            file: default_sqlite_file(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MysqlSection {
    #[serde(default = "default_mysql_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default = "default_mysql_database")]
    pub database: String,
    #[serde(default = "default_mysql_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for MysqlSection {
    fn default() -> Self {
        Self {
            host: default_mysql_host(),
            port: default_mysql_port(),
            database: default_mysql_database(),
            username: default_mysql_username(),
            password: String::new(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl fmt::Debug for MysqlSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl MysqlSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Lookup table keyed by item id or category, with a `default` entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AmountTable(BTreeMap<String, u32>);

impl AmountTable {
    pub fn get(&self, key: &str) -> Option<u32> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: u32) {
        self.0.insert(key.into(), value);
    }

    fn default_or(&self, fallback: u32) -> u32 {
        self.get("default").unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SlotSection {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub allowed_categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AttachmentSlotSection {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CustomItemSection {
    #[serde(default = "default_custom_slot")]
    pub slot_type: SlotType,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_material")]
    pub material: ItemKind,
    #[serde(default = "default_item_amount")]
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MenuSection {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
}

impl Default for MenuSection {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfirmSection {
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,
}

impl Default for ConfirmSection {
    fn default() -> Self {
        Self {
            delete_timeout_secs: default_delete_timeout_secs(),
        }
    }
}

impl ConfirmSection {
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JournalSection {
    /// Crash journal directory. Relative paths resolve against the data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl LoadoutsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.menu.items_per_page == 0 {
            return Err(ConfigError::InvalidItemsPerPage);
        }
        if !(1..=SlotNumber::MAX).contains(&self.max_loadouts) {
            return Err(ConfigError::InvalidMaxLoadouts(self.max_loadouts));
        }
        if self.database.mysql.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        for (item, custom) in &self.custom_items {
            if !self.slots.contains_key(&custom.slot_type) {
                return Err(ConfigError::UnknownCustomItemSlot {
                    item: item.to_string(),
                    slot_type: custom.slot_type.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Category multiplier, falling back to `default`, then 4.
    pub fn ammo_multiplier(&self, category: Option<&Category>) -> u32 {
        category
            .and_then(|c| self.ammo_multipliers.get(c))
            .unwrap_or_else(|| self.ammo_multipliers.default_or(DEFAULT_AMMO_MULTIPLIER))
    }

    /// Item-specific amount, then the category's, then `default`, then 1.
    pub fn item_amount(&self, item: &ItemRef, category: Option<&Category>) -> u32 {
        self.item_amounts
            .get(item)
            .or_else(|| category.and_then(|c| self.item_amounts.get(c)))
            .unwrap_or_else(|| self.item_amounts.default_or(DEFAULT_ITEM_AMOUNT))
    }

    pub fn slot(&self, slot_type: &SlotType) -> Option<&SlotSection> {
        self.slots.get(slot_type)
    }

    pub fn slot_display_name(&self, slot_type: &SlotType) -> String {
        self.slots
            .get(slot_type)
            .and_then(|s| s.display_name.clone())
            .unwrap_or_else(|| slot_type.to_string())
    }

    pub fn attachment_slot(&self, key: &AttachmentKey) -> Option<&AttachmentSlotSection> {
        self.attachment_slots.get(key)
    }

    /// Custom items bound to `slot_type`, in key order.
    pub fn custom_items_for<'a>(
        &'a self,
        slot_type: &'a SlotType,
    ) -> impl Iterator<Item = (&'a ItemRef, &'a CustomItemSection)> + 'a {
        self.custom_items
            .iter()
            .filter(move |(_, custom)| custom.slot_type == *slot_type)
    }
}

/// A commented starting point for new installations.
pub const STARTER_CONFIG: &str = r#"max_loadouts = 5

[database]
backend = "sqlite"

[database.sqlite]
file = "loadouts.db"

[ammo_multipliers]
default = 4

[item_amounts]
default = 1

[slots.primary]
display_name = "Primary"
allowed_categories = ["rifle", "smg"]

[slots.secondary]
display_name = "Secondary"
allowed_categories = ["pistol"]

[slots.tactical]
display_name = "Tactical"
allowed_categories = ["grenade"]

[attachment_slots.optic]
display_name = "Optic"
categories = ["scopes"]

[custom_items.medkit]
slot_type = "tactical"
display_name = "Medkit"
material = "golden_apple"
amount = 1

[menu]
items_per_page = 45

[confirm]
delete_timeout_secs = 10

[journal]
dir = "journal"
"#;

fn default_max_loadouts() -> u8 {
    SlotNumber::MAX
}

fn default_sqlite_file() -> PathBuf {
    PathBuf::from("loadouts.db")
}

fn default_mysql_host() -> String {
    "localhost".to_owned()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_database() -> String {
    "loadouts".to_owned()
}

fn default_mysql_username() -> String {
    "root".to_owned()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_custom_slot() -> SlotType {
    SlotType::from("tactical")
}

fn default_material() -> ItemKind {
    ItemKind::from("stone")
}

fn default_item_amount() -> u32 {
    DEFAULT_ITEM_AMOUNT
}

fn default_items_per_page() -> usize {
    45
}

fn default_delete_timeout_secs() -> u64 {
    10
}

pub fn parse_config_str(input: &str) -> Result<LoadoutsConfig, ConfigError> {
    let config: LoadoutsConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<LoadoutsConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
