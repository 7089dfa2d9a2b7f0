//! Shared data model for loadouts.
//!
//! Identifier newtypes (`OwnerId`, `SlotNumber`, `SlotType`, ...), immutable
//! item values and the `Inventory` they sit in, the `Loadout` entity with its
//! `SlotAssignment`s, and the TOML configuration model (`LoadoutsConfig`).

pub mod config;
pub mod item;
pub mod loadout;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, AmountTable, AttachmentSlotSection, ConfigError,
    CustomItemSection, DatabaseBackend, DatabaseSection, LoadoutsConfig, MysqlSection,
    SlotSection, SqliteSection, STARTER_CONFIG,
};
pub use item::{
    Inventory, ItemStack, EQUIPPED_SIZE, FINAL_ITEMS_SIZE, HOTBAR_SIZE, MAIN_SIZE, OFFHAND_INDEX,
};
pub use loadout::{
    from_millis, normalize_name, now_millis, Loadout, SlotAssignment, MAX_NAME_CHARS,
};
pub use types::{
    AttachmentId, AttachmentKey, Category, IdError, ItemKind, ItemRef, OwnerId, Scope,
    SlotNumber, SlotType, UserId,
};
