//! Exclusive ownership of a user's live inventory during edit mode.
//!
//! Entering edit mode moves the whole inventory into an `InventoryBackup`
//! and leaves an empty staging area. Every exit path (save, cancel,
//! disconnect, shutdown) puts the backup back verbatim. Nothing in here
//! persists loadouts.

use crate::host::{ContainerKind, Interaction, Notice, PlayerHost, Verdict};
use crate::journal::BackupJournal;
use crate::CoreError;
use chrono::{DateTime, Utc};
use loadouts_schema::{now_millis, Inventory, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const ALLOWED_COMMANDS: [&str; 2] = ["/loadout save", "/loadout cancel"];

/// Snapshot of everything a user carried when edit mode began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBackup {
    pub user: UserId,
    pub inventory: Inventory,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EditGuard {
    backups: HashMap<UserId, InventoryBackup>,
    journal: Option<BackupJournal>,
    /// Backups that could not be put back yet: journal leftovers from a
    /// crashed run, or users who went offline before the restore.
    orphans: HashMap<UserId, InventoryBackup>,
}

impl EditGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror backups into `journal` and pick up whatever a previous run left.
    pub fn with_journal(journal: BackupJournal) -> Result<Self, CoreError> {
        let orphans = journal
            .list_orphans()?
            .into_iter()
            .map(|backup| (backup.user, backup))
            .collect();
        Ok(Self {
            backups: HashMap::new(),
            journal: Some(journal),
            orphans,
        })
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.backups.contains_key(&user)
    }

    pub fn active_count(&self) -> usize {
        self.backups.len()
    }

    pub fn has_orphan(&self, user: UserId) -> bool {
        self.orphans.contains_key(&user)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn start_edit_mode(
        &mut self,
        host: &mut impl PlayerHost,
        user: UserId,
    ) -> Result<(), CoreError> {
        if self.is_active(user) {
            return Err(CoreError::AlreadyEditing(user));
        }
        // An unrestored backup would be overwritten by the new one.
        self.restore_orphan_on_join(host, user);

        let inventory = host.inventory(user).ok_or(CoreError::UserOffline)?;
        let backup = InventoryBackup {
            user,
            inventory,
            taken_at: now_millis(),
        };
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(&backup) {
                warn!("failed to journal inventory backup for {user}: {e}");
            }
        }
        if !host.set_inventory(user, Inventory::new()) {
            self.clear_journal(user);
            return Err(CoreError::UserOffline);
        }
        self.backups.insert(user, backup);
        info!("edit mode started for {user}");
        Ok(())
    }

    /// Put the original inventory back after a save attempt.
    pub fn end_edit_mode(
        &mut self,
        host: &mut impl PlayerHost,
        user: UserId,
        success: bool,
    ) -> Result<(), CoreError> {
        let backup = self.backups.remove(&user).ok_or(CoreError::NotEditing)?;
        if self.restore(host, backup) {
            host.notify(user, Notice::EditEnded { saved: success });
        }
        info!("edit mode ended for {user} (saved: {success})");
        Ok(())
    }

    pub fn cancel_edit_mode(
        &mut self,
        host: &mut impl PlayerHost,
        user: UserId,
        reason: &str,
    ) -> Result<(), CoreError> {
        let backup = self.backups.remove(&user).ok_or(CoreError::NotEditing)?;
        if self.restore(host, backup) {
            host.notify(
                user,
                Notice::EditCancelled {
                    reason: reason.to_owned(),
                },
            );
        }
        info!("edit mode cancelled for {user}: {reason}");
        Ok(())
    }

    /// Whether `interaction` may go ahead. Users not in edit mode are never
    /// restricted.
    pub fn check(&self, user: UserId, interaction: &Interaction) -> Verdict {
        if !self.is_active(user) {
            return Verdict::Allow;
        }
        match interaction {
            Interaction::MoveItem
            | Interaction::OpenContainer(ContainerKind::Personal | ContainerKind::Crafting) => {
                Verdict::Allow
            }
            Interaction::DropItem => {
                Verdict::Deny("You cannot drop items while editing a loadout.".to_owned())
            }
            Interaction::PickupItem => {
                Verdict::Deny("You cannot pick up items while editing a loadout.".to_owned())
            }
            Interaction::OpenContainer(ContainerKind::Other(kind)) => {
                debug!("blocked {user} from opening {kind} during edit mode");
                Verdict::Deny("You cannot open other inventories while editing a loadout.".to_owned())
            }
            Interaction::Command(line) => {
                let line = line.trim().to_lowercase();
                if ALLOWED_COMMANDS.iter().any(|c| line.starts_with(c)) {
                    Verdict::Allow
                } else {
                    Verdict::Deny(
                        "Only /loadout save and /loadout cancel work while editing.".to_owned(),
                    )
                }
            }
        }
    }

    /// Implicit cancel for a user who is leaving. Returns whether they were
    /// in edit mode.
    pub fn on_disconnect(&mut self, host: &mut impl PlayerHost, user: UserId) -> bool {
        let Some(backup) = self.backups.remove(&user) else {
            return false;
        };
        self.restore(host, backup);
        info!("restored inventory of disconnecting user {user}");
        true
    }

    /// Force every active edit back to its original inventory. Returns the
    /// number of users restored.
    pub fn on_shutdown(&mut self, host: &mut impl PlayerHost) -> usize {
        let backups: Vec<InventoryBackup> = self.backups.drain().map(|(_, b)| b).collect();
        let mut restored = 0;
        for backup in backups {
            let user = backup.user;
            if self.restore(host, backup) {
                host.notify(
                    user,
                    Notice::EditCancelled {
                        reason: "server shutting down".to_owned(),
                    },
                );
                restored += 1;
            }
        }
        if restored > 0 {
            info!("restored {restored} inventories on shutdown");
        }
        self.orphans.clear();
        restored
    }

    /// Give a joining user back a backup left over from an unfinished edit.
    pub fn restore_orphan_on_join(&mut self, host: &mut impl PlayerHost, user: UserId) -> bool {
        let Some(orphan) = self.orphans.remove(&user) else {
            return false;
        };
        if self.restore(host, orphan) {
            host.notify(user, Notice::RestoredAfterCrash);
            info!("restored orphaned inventory backup for {user}");
            true
        } else {
            false
        }
    }

    /// Returns `false` when the user is offline; the backup then waits as an
    /// orphan and stays journaled.
    fn restore(&mut self, host: &mut impl PlayerHost, backup: InventoryBackup) -> bool {
        let user = backup.user;
        if host.set_inventory(user, backup.inventory.clone()) {
            self.clear_journal(user);
            true
        } else {
            warn!("{user} is offline, keeping their inventory backup until they return");
            self.orphans.insert(user, backup);
            false
        }
    }

    fn clear_journal(&self, user: UserId) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.clear(user) {
                warn!("failed to clear journal entry for {user}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use loadouts_schema::ItemStack;

    fn loaded_inventory() -> Inventory {
        let mut inventory = Inventory::new();
        inventory.set(0, Some(ItemStack::new("diamond_sword", 1).with_display_name("Edge")));
        inventory.set(20, Some(ItemStack::new("bread", 12)));
        inventory.set_equipped(3, Some(ItemStack::new("iron_helmet", 1)));
        inventory.set_offhand(Some(ItemStack::new("shield", 1)));
        inventory
    }

    fn setup() -> (MemoryHost, EditGuard, UserId) {
        let mut host = MemoryHost::new();
        let user = UserId::random();
        host.join(user, loaded_inventory());
        (host, EditGuard::new(), user)
    }

    #[test]
    fn start_clears_inventory_to_staging_area() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        assert!(guard.is_active(user));
        assert!(host.inventory_of(user).unwrap().is_empty());
    }

    #[test]
    fn cancel_restores_identical_inventory() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();

        let staging = host.inventory_mut(user).unwrap();
        staging.set(0, Some(ItemStack::new("tnt", 64)));
        staging.add_item(ItemStack::new("arrow", 200));
        staging.set_offhand(Some(ItemStack::new("torch", 3)));

        guard.cancel_edit_mode(&mut host, user, "test").unwrap();
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
        assert!(!guard.is_active(user));
        assert!(matches!(
            host.last_notice(user),
            Some(Notice::EditCancelled { .. })
        ));
    }

    #[test]
    fn end_restores_regardless_of_outcome() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        guard.end_edit_mode(&mut host, user, false).unwrap();
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
        assert_eq!(
            host.last_notice(user),
            Some(&Notice::EditEnded { saved: false })
        );
    }

    #[test]
    fn double_start_is_rejected_and_keeps_backup() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        host.inventory_mut(user)
            .unwrap()
            .set(5, Some(ItemStack::new("tnt", 1)));

        let err = guard.start_edit_mode(&mut host, user).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyEditing(u) if u == user));

        guard.cancel_edit_mode(&mut host, user, "test").unwrap();
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
    }

    #[test]
    fn ending_without_edit_mode_is_an_error() {
        let (mut host, mut guard, user) = setup();
        assert!(matches!(
            guard.end_edit_mode(&mut host, user, true),
            Err(CoreError::NotEditing)
        ));
    }

    #[test]
    fn offline_user_cannot_start() {
        let mut host = MemoryHost::new();
        let mut guard = EditGuard::new();
        assert!(matches!(
            guard.start_edit_mode(&mut host, UserId::random()),
            Err(CoreError::UserOffline)
        ));
    }

    #[test]
    fn restrictions_apply_only_in_edit_mode() {
        let (mut host, mut guard, user) = setup();
        assert!(guard.check(user, &Interaction::DropItem).is_allowed());

        guard.start_edit_mode(&mut host, user).unwrap();
        assert!(!guard.check(user, &Interaction::DropItem).is_allowed());
        assert!(!guard.check(user, &Interaction::PickupItem).is_allowed());
        assert!(guard.check(user, &Interaction::MoveItem).is_allowed());
        assert!(guard
            .check(user, &Interaction::OpenContainer(ContainerKind::Personal))
            .is_allowed());
        assert!(guard
            .check(user, &Interaction::OpenContainer(ContainerKind::Crafting))
            .is_allowed());
        assert!(!guard
            .check(
                user,
                &Interaction::OpenContainer(ContainerKind::Other("chest".to_owned()))
            )
            .is_allowed());
    }

    #[test]
    fn only_save_and_cancel_commands_pass() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        let verdict = |line: &str| guard.check(user, &Interaction::Command(line.to_owned()));

        assert!(verdict("/loadout save").is_allowed());
        assert!(verdict("/LOADOUT Cancel now").is_allowed());
        assert!(!verdict("/loadout apply 1").is_allowed());
        assert!(!verdict("/spawn").is_allowed());
    }

    #[test]
    fn disconnect_restores_and_clears() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        assert!(guard.on_disconnect(&mut host, user));
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
        assert!(!guard.is_active(user));
        assert!(!guard.on_disconnect(&mut host, user));
    }

    #[test]
    fn shutdown_restores_everyone() {
        let (mut host, mut guard, a) = setup();
        let b = UserId::random();
        host.join(b, loaded_inventory());
        guard.start_edit_mode(&mut host, a).unwrap();
        guard.start_edit_mode(&mut host, b).unwrap();

        assert_eq!(guard.on_shutdown(&mut host), 2);
        assert_eq!(guard.active_count(), 0);
        assert_eq!(host.inventory_of(a).unwrap(), &loaded_inventory());
        assert_eq!(host.inventory_of(b).unwrap(), &loaded_inventory());
    }

    #[test]
    fn offline_restore_waits_for_rejoin() {
        let (mut host, mut guard, user) = setup();
        guard.start_edit_mode(&mut host, user).unwrap();
        host.leave(user);

        guard.cancel_edit_mode(&mut host, user, "gone").unwrap();
        assert!(guard.has_orphan(user));

        host.join(user, Inventory::new());
        assert!(guard.restore_orphan_on_join(&mut host, user));
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
        assert_eq!(host.last_notice(user), Some(&Notice::RestoredAfterCrash));
    }

    #[test]
    fn journal_orphans_survive_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let journal_dir = dir.path().join("journal");
        let (mut host, _, user) = setup();

        {
            let mut guard = EditGuard::with_journal(BackupJournal::open(&journal_dir).unwrap()).unwrap();
            guard.start_edit_mode(&mut host, user).unwrap();
            // Process dies here: the guard is dropped without restoring.
        }
        assert!(host.inventory_of(user).unwrap().is_empty());

        let mut guard = EditGuard::with_journal(BackupJournal::open(&journal_dir).unwrap()).unwrap();
        assert_eq!(guard.orphan_count(), 1);
        assert!(guard.restore_orphan_on_join(&mut host, user));
        assert_eq!(host.inventory_of(user).unwrap(), &loaded_inventory());
        assert!(BackupJournal::inspect(&journal_dir).unwrap().entries.is_empty());
    }

    #[test]
    fn completed_edit_leaves_no_journal_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal_dir = dir.path().join("journal");
        let (mut host, _, user) = setup();
        let mut guard = EditGuard::with_journal(BackupJournal::open(&journal_dir).unwrap()).unwrap();

        guard.start_edit_mode(&mut host, user).unwrap();
        assert_eq!(BackupJournal::inspect(&journal_dir).unwrap().entries, vec![user]);
        guard.end_edit_mode(&mut host, user, true).unwrap();
        assert!(BackupJournal::inspect(&journal_dir).unwrap().entries.is_empty());
    }
}
