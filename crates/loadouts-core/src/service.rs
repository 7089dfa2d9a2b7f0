//! The command surface hosts drive: wizard events, save, cancel, apply,
//! delete, rename and listing, plus the join/disconnect/shutdown hooks.
//!
//! Everything here runs on the host loop. Writes go through the registry's
//! blocking pool and their follow-ups (restoring inventories, messages) run
//! when `tick` or `shutdown` drains them.

use crate::catalog::{resolve_attachment_factory, AttachmentFactory, Catalog};
use crate::confirm::PendingConfirmations;
use crate::guard::EditGuard;
use crate::host::{Interaction, Notice, PlayerHost, Verdict};
use crate::journal::BackupJournal;
use crate::lifecycle::WizardState;
use crate::registry::{LoadoutRegistry, WriteOutcome, WriteTicket};
use crate::session::{EditSession, EditTarget};
use crate::staging::{materialize, place, Placement};
use crate::wizard::{self, Effect, PageView, WizardContext, WizardEvent};
use crate::CoreError;
use chrono::{DateTime, Utc};
use loadouts_schema::{
    normalize_name, Inventory, Loadout, LoadoutsConfig, OwnerId, Scope, SlotNumber, UserId,
};
use loadouts_store::open_repository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// One row of a loadout listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadoutSummary {
    pub slot: SlotNumber,
    pub label: String,
    pub item_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Loadout> for LoadoutSummary {
    fn from(loadout: &Loadout) -> Self {
        Self {
            slot: loadout.slot,
            label: loadout.label(),
            item_count: loadout.item_count(),
            updated_at: loadout.updated_at,
        }
    }
}

/// What to do once a queued write comes back.
#[derive(Debug)]
enum Continuation {
    EndEdit { user: UserId },
    Delete { user: UserId, slot: SlotNumber },
    Rename { user: UserId, slot: SlotNumber, name: String },
}

pub struct LoadoutService<H: PlayerHost> {
    config: LoadoutsConfig,
    host: H,
    catalog: Arc<dyn Catalog>,
    factory: Arc<dyn AttachmentFactory>,
    registry: LoadoutRegistry,
    guard: EditGuard,
    confirmations: PendingConfirmations,
    continuations: HashMap<u64, Continuation>,
    /// Users whose apply menu reopens until they apply something.
    forced_menus: HashSet<UserId>,
}

impl<H: PlayerHost> LoadoutService<H> {
    pub fn new(
        config: LoadoutsConfig,
        host: H,
        catalog: Arc<dyn Catalog>,
        registry: LoadoutRegistry,
        guard: EditGuard,
    ) -> Self {
        let factory = resolve_attachment_factory(catalog.as_ref());
        let confirmations = PendingConfirmations::new(config.confirm.delete_timeout());
        Self {
            config,
            host,
            catalog,
            factory,
            registry,
            guard,
            confirmations,
            continuations: HashMap::new(),
            forced_menus: HashSet::new(),
        }
    }

    /// Open the configured repository and crash journal and build the service.
    ///
    /// Fails when storage is unreachable; the host should then run without
    /// loadouts rather than degraded.
    pub fn start(
        config: LoadoutsConfig,
        host: H,
        catalog: Arc<dyn Catalog>,
        handle: Handle,
        base_dir: &Path,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let repo = open_repository(&config.database, base_dir).inspect_err(|e| {
            error!("loadouts disabled, repository unavailable: {e}");
        })?;

        let guard = match &config.journal.dir {
            Some(dir) => {
                let dir = if dir.is_absolute() {
                    dir.clone()
                } else {
                    base_dir.join(dir)
                };
                let guard = EditGuard::with_journal(BackupJournal::open(&dir)?)?;
                if guard.orphan_count() > 0 {
                    info!(
                        "{} inventory backups from an interrupted run are waiting for their users",
                        guard.orphan_count()
                    );
                }
                guard
            }
            None => EditGuard::new(),
        };

        let registry = LoadoutRegistry::new(repo, handle);
        Ok(Self::new(config, host, catalog, registry, guard))
    }

    pub fn config(&self) -> &LoadoutsConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &LoadoutRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LoadoutRegistry {
        &mut self.registry
    }

    pub fn guard(&self) -> &EditGuard {
        &self.guard
    }

    pub fn session(&self, user: UserId) -> Option<&EditSession> {
        self.registry.session(user)
    }

    pub fn page_view(&self, user: UserId) -> Option<PageView> {
        let session = self.registry.session(user)?;
        let ctx = WizardContext {
            config: &self.config,
            catalog: self.catalog.as_ref(),
        };
        wizard::page_view(session, &ctx)
    }

    /// Feed a menu event into the user's wizard.
    ///
    /// `PickSlot` opens a session when there is none; any other event needs
    /// one already.
    pub fn dispatch(&mut self, user: UserId, event: WizardEvent) -> Result<Effect, CoreError> {
        let session = if matches!(event, WizardEvent::PickSlot { .. }) {
            self.registry.start_session(user)
        } else {
            self.registry.session_mut(user).ok_or(CoreError::NoSession)?
        };
        let ctx = WizardContext {
            config: &self.config,
            catalog: self.catalog.as_ref(),
        };
        let effect = match wizard::dispatch(session, event, &ctx) {
            Ok(effect) => effect,
            Err(CoreError::NothingSelected) => {
                self.host.notify(user, Notice::NothingSelected);
                return Err(CoreError::NothingSelected);
            }
            Err(e) => return Err(e),
        };

        match effect {
            Effect::None => {}
            Effect::Rehydrate { owner, slot } => {
                if let Some(stored) = self.registry.get_loadout(owner, slot) {
                    if let Some(session) = self.registry.session_mut(user) {
                        session.load_from(&stored);
                    }
                    debug!("rehydrated selections of {user} from {owner}/{slot}");
                }
            }
            Effect::Stage => {
                if let Err(e) = self.stage(user) {
                    if let Some(session) = self.registry.session_mut(user) {
                        session.state = WizardState::CategoryOpen;
                    }
                    if matches!(e, CoreError::AlreadyEditing(_)) {
                        self.host.notify(user, Notice::AlreadyEditing);
                    }
                    return Err(e);
                }
            }
            Effect::EndSession => {
                self.registry.end_session(user);
            }
        }
        Ok(effect)
    }

    fn stage(&mut self, user: UserId) -> Result<Placement, CoreError> {
        let session = self.registry.session(user).ok_or(CoreError::NoSession)?;
        let target = session.target.ok_or(CoreError::NoSession)?;
        let staged = materialize(
            &session.selections,
            &session.attachments,
            &self.config,
            self.catalog.as_ref(),
            self.factory.as_ref(),
        );

        self.guard.start_edit_mode(&mut self.host, user)?;
        let mut inventory = self.host.inventory(user).unwrap_or_else(Inventory::new);
        let placement = place(&staged, &mut inventory);
        self.host.set_inventory(user, inventory);

        self.host.notify(
            user,
            Notice::EditStarted {
                slot: target.slot,
                scope: target.scope,
            },
        );
        self.host.notify(
            user,
            Notice::ItemsStaged {
                placed: placement.placed,
                dropped: placement.dropped,
            },
        );
        Ok(placement)
    }

    /// Persist the staged inventory as the target loadout's final items.
    ///
    /// The session ends right away; edit mode ends once the write completes.
    /// While that write is in flight, further saves are refused.
    pub fn save(&mut self, user: UserId) -> Result<WriteTicket, CoreError> {
        if self.save_pending(user) {
            self.host.notify(user, Notice::SaveInProgress);
            return Err(CoreError::SaveInProgress);
        }
        if !self.guard.is_active(user) {
            self.host.notify(user, Notice::NotEditing);
            return Err(CoreError::NotEditing);
        }
        let Some(target) = self.registry.session(user).and_then(|s| s.target) else {
            self.registry.end_session(user);
            self.guard
                .cancel_edit_mode(&mut self.host, user, "edit session lost")?;
            return Err(CoreError::NoSession);
        };
        let staged = self.host.inventory(user).ok_or(CoreError::UserOffline)?;
        let session = self.registry.end_session(user).ok_or(CoreError::NoSession)?;

        let owner = target.owner_for(user);
        let mut loadout = self
            .registry
            .get_loadout(owner, target.slot)
            .map_or_else(|| Loadout::new(owner, target.slot), |l| (*l).clone());
        session.merge_into(&mut loadout);
        loadout.final_items = staged.to_final_items();
        loadout.touch();

        if owner.is_global() {
            info!("{user} saved global loadout slot {}", target.slot);
        } else {
            debug!("{user} saved loadout slot {}", target.slot);
        }
        let ticket = self.registry.save_loadout_async(loadout);
        self.continuations
            .insert(ticket.id(), Continuation::EndEdit { user });
        Ok(ticket)
    }

    fn save_pending(&self, user: UserId) -> bool {
        self.continuations
            .values()
            .any(|c| matches!(c, Continuation::EndEdit { user: u } if *u == user))
    }

    /// Leave edit mode without persisting anything.
    ///
    /// With `silent`, a user who is not editing gets no message and no error.
    pub fn cancel(&mut self, user: UserId, silent: bool) -> Result<(), CoreError> {
        if self.save_pending(user) {
            if silent {
                return Ok(());
            }
            self.host.notify(user, Notice::SaveInProgress);
            return Err(CoreError::SaveInProgress);
        }
        self.registry.end_session(user);
        if !self.guard.is_active(user) {
            if silent {
                return Ok(());
            }
            self.host.notify(user, Notice::NotEditing);
            return Err(CoreError::NotEditing);
        }
        self.guard.cancel_edit_mode(&mut self.host, user, "cancelled")
    }

    /// Replace the user's inventory with a stored loadout. Returns whether
    /// anything was applied.
    pub fn apply(&mut self, user: UserId, slot: SlotNumber, scope: Scope) -> Result<bool, CoreError> {
        if self.guard.is_active(user) {
            self.host.notify(user, Notice::RefusedWhileEditing);
            return Ok(false);
        }
        let owner = scope.owner_for(user);
        let Some(loadout) = self
            .registry
            .get_loadout(owner, slot)
            .filter(|l| !l.is_placeholder())
        else {
            self.host.notify(user, Notice::NothingSaved { slot });
            return Ok(false);
        };

        let inventory = Inventory::from_final_items(&loadout.final_items);
        if !self.host.set_inventory(user, inventory) {
            return Err(CoreError::UserOffline);
        }
        self.host.restore_vitals(user);
        self.forced_menus.remove(&user);
        self.host.close_menu(user);
        self.host.notify(
            user,
            Notice::Applied {
                label: loadout.label(),
            },
        );
        debug!("{user} applied {owner}/{slot}");
        Ok(true)
    }

    /// Show the apply menu. A forced menu keeps coming back until the user
    /// applies a loadout.
    pub fn open_apply_menu(&mut self, user: UserId, forced: bool) {
        if forced {
            self.forced_menus.insert(user);
        }
        self.host.open_apply_menu(user, forced);
    }

    /// The user closed the apply menu. Returns whether it was reopened.
    pub fn close_apply_menu(&mut self, user: UserId) -> bool {
        if self.forced_menus.contains(&user) {
            self.host.open_apply_menu(user, true);
            true
        } else {
            false
        }
    }

    pub fn request_delete(
        &mut self,
        user: UserId,
        slot: SlotNumber,
        scope: Scope,
    ) -> Option<WriteTicket> {
        self.request_delete_at(user, slot, scope, Instant::now())
    }

    /// First call asks for confirmation, a matching call before the prompt
    /// expires queues the delete.
    pub fn request_delete_at(
        &mut self,
        user: UserId,
        slot: SlotNumber,
        scope: Scope,
        now: Instant,
    ) -> Option<WriteTicket> {
        let target = EditTarget::new(slot, scope);
        let owner = target.owner_for(user);
        if self.confirmations.confirm(user, target, now) {
            let ticket = self.registry.delete_loadout_async(owner, slot);
            self.continuations
                .insert(ticket.id(), Continuation::Delete { user, slot });
            return Some(ticket);
        }
        if self.registry.get_loadout(owner, slot).is_none() {
            self.host.notify(user, Notice::NothingSaved { slot });
            return None;
        }
        self.confirmations.request(user, target, now);
        self.host.notify(
            user,
            Notice::ConfirmDelete {
                slot,
                timeout_secs: self.confirmations.timeout().as_secs(),
            },
        );
        None
    }

    /// Set a stored loadout's display name.
    pub fn rename(
        &mut self,
        user: UserId,
        slot: SlotNumber,
        scope: Scope,
        name: &str,
    ) -> Option<WriteTicket> {
        let Some(name) = normalize_name(name) else {
            self.host.notify(user, Notice::InvalidName);
            return None;
        };
        let owner = scope.owner_for(user);
        let Some(existing) = self.registry.get_loadout(owner, slot) else {
            self.host.notify(user, Notice::NothingSaved { slot });
            return None;
        };
        let mut loadout = (*existing).clone();
        loadout.display_name = Some(name.to_owned());
        loadout.touch();
        let ticket = self.registry.save_loadout_async(loadout);
        self.continuations.insert(
            ticket.id(),
            Continuation::Rename {
                user,
                slot,
                name: name.to_owned(),
            },
        );
        Some(ticket)
    }

    /// Applicable loadouts in the configured slot range.
    pub fn list(&mut self, user: UserId, scope: Scope) -> Vec<LoadoutSummary> {
        let max = self.config.max_loadouts;
        self.registry
            .loadouts_for(scope.owner_for(user))
            .iter()
            .filter(|l| l.slot.get() <= max && !l.is_placeholder())
            .map(|l| LoadoutSummary::from(l.as_ref()))
            .collect()
    }

    pub fn loadout_count(&mut self, user: UserId, scope: Scope) -> usize {
        self.registry.loadout_count(scope.owner_for(user))
    }

    /// Screen an interaction against edit mode, telling the user when it is
    /// blocked.
    pub fn check(&mut self, user: UserId, interaction: &Interaction) -> Verdict {
        let verdict = self.guard.check(user, interaction);
        if let Verdict::Deny(reason) = &verdict {
            self.host.notify(
                user,
                Notice::Blocked {
                    reason: reason.clone(),
                },
            );
        }
        verdict
    }

    /// Returns whether an orphaned backup was restored.
    pub fn on_join(&mut self, user: UserId) -> bool {
        self.guard.restore_orphan_on_join(&mut self.host, user)
    }

    pub fn on_disconnect(&mut self, user: UserId) {
        if self.guard.on_disconnect(&mut self.host, user) {
            debug!("cancelled edit of disconnecting user {user}");
        }
        self.registry.end_session(user);
        self.registry.clear_cache(OwnerId::from(user));
        self.confirmations.forget(user);
        self.forced_menus.remove(&user);
    }

    /// Swap in a new configuration. Cached loadouts are dropped; sessions
    /// and edits in progress carry on.
    pub fn reload(&mut self, config: LoadoutsConfig) -> Result<(), CoreError> {
        config.validate()?;
        self.confirmations
            .set_timeout(config.confirm.delete_timeout());
        self.config = config;
        self.registry.clear_all_caches();
        info!("loadouts configuration reloaded");
        Ok(())
    }

    pub fn tick(&mut self) -> Vec<WriteOutcome> {
        self.tick_at(Instant::now())
    }

    /// Apply finished writes, run their follow-ups and expire stale
    /// delete prompts.
    pub fn tick_at(&mut self, now: Instant) -> Vec<WriteOutcome> {
        let outcomes = self.registry.drain_completions();
        for outcome in &outcomes {
            self.finish(outcome);
        }
        let expired = self.confirmations.purge_expired(now);
        if expired > 0 {
            debug!("{expired} delete confirmations expired");
        }
        outcomes
    }

    /// Wait for queued writes, then put every inventory back and drop all
    /// sessions. Returns the number of edits forcibly restored.
    pub async fn shutdown(&mut self) -> usize {
        let outcomes = self.registry.settle().await;
        for outcome in &outcomes {
            self.finish(outcome);
        }
        let restored = self.guard.on_shutdown(&mut self.host);
        for user in self.registry.session_users() {
            self.registry.end_session(user);
        }
        self.forced_menus.clear();
        info!("loadouts shut down ({restored} edits restored)");
        restored
    }

    fn finish(&mut self, outcome: &WriteOutcome) {
        let Some(continuation) = self.continuations.remove(&outcome.id) else {
            return;
        };
        match continuation {
            Continuation::EndEdit { user } => {
                if !outcome.success {
                    warn!(
                        "saving loadout {}/{} for {user} failed",
                        outcome.owner, outcome.slot
                    );
                }
                if let Err(e) = self
                    .guard
                    .end_edit_mode(&mut self.host, user, outcome.success)
                {
                    // Cancelled or disconnected while the write was running.
                    debug!("edit of {user} already ended: {e}");
                }
            }
            Continuation::Delete { user, slot } => {
                let notice = if outcome.success {
                    Notice::Deleted { slot }
                } else {
                    Notice::DeleteFailed { slot }
                };
                self.host.notify(user, notice);
            }
            Continuation::Rename { user, slot, name } => {
                let notice = if outcome.success {
                    Notice::Renamed { slot, name }
                } else {
                    Notice::RenameFailed { slot }
                };
                self.host.notify(user, notice);
            }
        }
    }
}
