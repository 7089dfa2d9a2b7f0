//! The seam to the embedding game server.

use loadouts_schema::{Inventory, Scope, SlotNumber, UserId};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Player-facing operations the core needs from its host.
pub trait PlayerHost {
    /// Snapshot of the user's live inventory, `None` when they are offline.
    fn inventory(&self, user: UserId) -> Option<Inventory>;

    /// Replace the user's live inventory. Returns `false` when they are offline.
    fn set_inventory(&mut self, user: UserId, inventory: Inventory) -> bool;

    /// Reset health, hunger, potion effects and burning.
    fn restore_vitals(&mut self, user: UserId);

    fn notify(&mut self, user: UserId, notice: Notice);

    fn is_online(&self, user: UserId) -> bool;

    fn open_apply_menu(&mut self, _user: UserId, _forced: bool) {}

    fn close_menu(&mut self, _user: UserId) {}
}

/// Messages for a user. `Display` gives the default wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    EditStarted { slot: SlotNumber, scope: Scope },
    ItemsStaged { placed: usize, dropped: usize },
    EditEnded { saved: bool },
    SaveInProgress,
    EditCancelled { reason: String },
    NotEditing,
    AlreadyEditing,
    NothingSelected,
    Applied { label: String },
    NothingSaved { slot: SlotNumber },
    RefusedWhileEditing,
    ConfirmDelete { slot: SlotNumber, timeout_secs: u64 },
    Deleted { slot: SlotNumber },
    DeleteFailed { slot: SlotNumber },
    Renamed { slot: SlotNumber, name: String },
    RenameFailed { slot: SlotNumber },
    InvalidName,
    RestoredAfterCrash,
    Blocked { reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EditStarted { slot, scope } => {
                write!(f, "Editing {scope} loadout slot {slot}. Use /loadout save or /loadout cancel when done.")
            }
            Notice::ItemsStaged { placed, dropped: 0 } => {
                write!(f, "{placed} items staged. Arrange them, then /loadout save.")
            }
            Notice::ItemsStaged { placed, dropped } => write!(
                f,
                "{placed} items staged, {dropped} did not fit. Arrange them, then /loadout save."
            ),
            Notice::EditEnded { saved: true } => {
                write!(f, "Loadout saved. Your inventory has been restored.")
            }
            Notice::EditEnded { saved: false } => {
                write!(f, "Saving the loadout failed. Your inventory has been restored.")
            }
            Notice::SaveInProgress => write!(f, "Your loadout is still being saved."),
            Notice::EditCancelled { reason } => {
                write!(f, "Edit cancelled ({reason}). Your inventory has been restored.")
            }
            Notice::NotEditing => write!(f, "You are not editing a loadout."),
            Notice::AlreadyEditing => write!(f, "You are already editing a loadout."),
            Notice::NothingSelected => write!(f, "Select at least one item first."),
            Notice::Applied { label } => write!(f, "Applied loadout '{label}'."),
            Notice::NothingSaved { slot } => write!(f, "Nothing is saved in slot {slot}."),
            Notice::RefusedWhileEditing => {
                write!(f, "Finish or cancel your edit before applying a loadout.")
            }
            Notice::ConfirmDelete { slot, timeout_secs } => write!(
                f,
                "Run the delete again within {timeout_secs}s to delete slot {slot}."
            ),
            Notice::Deleted { slot } => write!(f, "Deleted loadout slot {slot}."),
            Notice::DeleteFailed { slot } => write!(f, "Could not delete loadout slot {slot}."),
            Notice::Renamed { slot, name } => write!(f, "Slot {slot} is now '{name}'."),
            Notice::RenameFailed { slot } => write!(f, "Could not rename loadout slot {slot}."),
            Notice::InvalidName => write!(f, "Names must be 1 to 32 characters."),
            Notice::RestoredAfterCrash => {
                write!(f, "Your inventory from an interrupted edit has been restored.")
            }
            Notice::Blocked { reason } => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerKind {
    /// The user's own inventory screen.
    Personal,
    /// The crafting grid attached to the personal inventory.
    Crafting,
    Other(String),
}

/// Something a user tries to do, checked against edit mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    DropItem,
    PickupItem,
    OpenContainer(ContainerKind),
    /// Full command line including the leading slash.
    Command(String),
    MoveItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(String),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// In-process host keeping inventories in maps. Records every notice, vitals
/// reset and menu change so callers can inspect them.
#[derive(Debug, Default)]
pub struct MemoryHost {
    online: HashSet<UserId>,
    inventories: HashMap<UserId, Inventory>,
    notices: HashMap<UserId, Vec<Notice>>,
    vitals_restored: Vec<UserId>,
    menus: HashMap<UserId, bool>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, user: UserId, inventory: Inventory) {
        self.online.insert(user);
        self.inventories.insert(user, inventory);
    }

    /// The user goes offline; their inventory stays where it is.
    pub fn leave(&mut self, user: UserId) {
        self.online.remove(&user);
        self.menus.remove(&user);
    }

    pub fn inventory_of(&self, user: UserId) -> Option<&Inventory> {
        self.inventories.get(&user)
    }

    pub fn inventory_mut(&mut self, user: UserId) -> Option<&mut Inventory> {
        self.inventories.get_mut(&user)
    }

    pub fn notices(&self, user: UserId) -> &[Notice] {
        self.notices.get(&user).map_or(&[], Vec::as_slice)
    }

    pub fn last_notice(&self, user: UserId) -> Option<&Notice> {
        self.notices(user).last()
    }

    pub fn vitals_restored(&self, user: UserId) -> usize {
        self.vitals_restored.iter().filter(|u| **u == user).count()
    }

    /// `Some(forced)` while an apply menu is open for `user`.
    pub fn open_menu(&self, user: UserId) -> Option<bool> {
        self.menus.get(&user).copied()
    }
}

impl PlayerHost for MemoryHost {
    fn inventory(&self, user: UserId) -> Option<Inventory> {
        if !self.online.contains(&user) {
            return None;
        }
        self.inventories.get(&user).cloned()
    }

    fn set_inventory(&mut self, user: UserId, inventory: Inventory) -> bool {
        if !self.online.contains(&user) {
            return false;
        }
        self.inventories.insert(user, inventory);
        true
    }

    fn restore_vitals(&mut self, user: UserId) {
        self.vitals_restored.push(user);
    }

    fn notify(&mut self, user: UserId, notice: Notice) {
        self.notices.entry(user).or_default().push(notice);
    }

    fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    fn open_apply_menu(&mut self, user: UserId, forced: bool) {
        if self.online.contains(&user) {
            self.menus.insert(user, forced);
        }
    }

    fn close_menu(&mut self, user: UserId) {
        self.menus.remove(&user);
    }
}
