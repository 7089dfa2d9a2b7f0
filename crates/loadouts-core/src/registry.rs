//! Read-through loadout cache, edit sessions and off-loop writes.
//!
//! The registry is owned by the host loop. Repository writes run on tokio's
//! blocking pool; their results come back over a channel and are applied to
//! the cache only when the loop calls `drain_completions` or `settle`.

use crate::session::EditSession;
use loadouts_schema::{Loadout, OwnerId, SlotNumber, UserId};
use loadouts_store::LoadoutRepository;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Save,
    Delete,
}

/// A finished write as seen by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub id: u64,
    pub kind: WriteKind,
    pub owner: OwnerId,
    pub slot: SlotNumber,
    /// For deletes, `false` also when nothing was stored.
    pub success: bool,
}

struct Completion {
    outcome: WriteOutcome,
    /// The written loadout, present after a successful save.
    saved: Option<Loadout>,
}

/// Resolves to whether a queued write succeeded.
///
/// The cache reflects the write once the loop has drained it.
#[derive(Debug)]
pub struct WriteTicket {
    id: u64,
    rx: oneshot::Receiver<bool>,
}

impl WriteTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for WriteTicket {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.unwrap_or(false))
    }
}

pub struct LoadoutRegistry {
    repo: Arc<dyn LoadoutRepository>,
    handle: Handle,
    cache: HashMap<OwnerId, HashMap<SlotNumber, Arc<Loadout>>>,
    /// Owners whose every slot has been looked up since the last eviction.
    complete: HashSet<OwnerId>,
    sessions: HashMap<UserId, EditSession>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    next_write: u64,
    in_flight: usize,
}

impl LoadoutRegistry {
    pub fn new(repo: Arc<dyn LoadoutRepository>, handle: Handle) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            repo,
            handle,
            cache: HashMap::new(),
            complete: HashSet::new(),
            sessions: HashMap::new(),
            completions_tx,
            completions_rx,
            next_write: 0,
            in_flight: 0,
        }
    }

    pub fn repository(&self) -> &Arc<dyn LoadoutRepository> {
        &self.repo
    }

    /// Cached loadout, or a synchronous repository lookup on a miss.
    ///
    /// Only hits are cached. Repository errors are logged and read as absent.
    pub fn get_loadout(&mut self, owner: OwnerId, slot: SlotNumber) -> Option<Arc<Loadout>> {
        if let Some(hit) = self.cache.get(&owner).and_then(|slots| slots.get(&slot)) {
            return Some(Arc::clone(hit));
        }
        match self.repo.get(owner, slot) {
            Ok(Some(loadout)) => {
                let loadout = Arc::new(loadout);
                self.cache
                    .entry(owner)
                    .or_default()
                    .insert(slot, Arc::clone(&loadout));
                Some(loadout)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("failed to load loadout {owner}/{slot}: {e}");
                None
            }
        }
    }

    /// Stored loadouts of `owner`, by slot.
    pub fn loadouts_for(&mut self, owner: OwnerId) -> Vec<Arc<Loadout>> {
        let loadouts = SlotNumber::all()
            .filter_map(|slot| self.get_loadout(owner, slot))
            .collect();
        self.complete.insert(owner);
        loadouts
    }

    /// Number of applicable (non-placeholder) loadouts of `owner`.
    pub fn loadout_count(&mut self, owner: OwnerId) -> usize {
        if self.complete.contains(&owner) {
            return self
                .cache
                .get(&owner)
                .map_or(0, |slots| slots.values().filter(|l| l.has_final_items()).count());
        }
        match self.repo.count_for_owner(owner) {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to count loadouts of {owner}: {e}");
                0
            }
        }
    }

    pub fn save_loadout_async(&mut self, loadout: Loadout) -> WriteTicket {
        let owner = loadout.owner;
        let slot = loadout.slot;
        self.spawn_write(WriteKind::Save, owner, slot, move |repo| {
            repo.save(&loadout).map(|()| (true, Some(loadout)))
        })
    }

    pub fn delete_loadout_async(&mut self, owner: OwnerId, slot: SlotNumber) -> WriteTicket {
        self.spawn_write(WriteKind::Delete, owner, slot, move |repo| {
            repo.delete(owner, slot).map(|existed| (existed, None))
        })
    }

    fn spawn_write<F>(
        &mut self,
        kind: WriteKind,
        owner: OwnerId,
        slot: SlotNumber,
        write: F,
    ) -> WriteTicket
    where
        F: FnOnce(&dyn LoadoutRepository) -> Result<(bool, Option<Loadout>), loadouts_store::StoreError>
            + Send
            + 'static,
    {
        self.next_write += 1;
        self.in_flight += 1;
        let id = self.next_write;
        let repo = Arc::clone(&self.repo);
        let completions = self.completions_tx.clone();
        let (ticket_tx, ticket_rx) = oneshot::channel();

        self.handle.spawn_blocking(move || {
            let (success, saved) = match catch_unwind(AssertUnwindSafe(|| write(repo.as_ref()))) {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!("{kind:?} of loadout {owner}/{slot} failed: {e}");
                    (false, None)
                }
                Err(_) => {
                    warn!("{kind:?} of loadout {owner}/{slot} panicked");
                    (false, None)
                }
            };
            let outcome = WriteOutcome {
                id,
                kind,
                owner,
                slot,
                success,
            };
            // The loop may already be gone during shutdown.
            let _ = completions.send(Completion { outcome, saved });
            let _ = ticket_tx.send(success);
        });

        WriteTicket { id, rx: ticket_rx }
    }

    /// Writes queued but not yet applied.
    pub fn pending_writes(&self) -> usize {
        self.in_flight
    }

    /// Apply every write that has finished so far.
    pub fn drain_completions(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            outcomes.push(self.apply(completion));
        }
        outcomes
    }

    /// Wait for every queued write and apply them all.
    pub async fn settle(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = self.drain_completions();
        while self.in_flight > 0 {
            match self.completions_rx.recv().await {
                Some(completion) => outcomes.push(self.apply(completion)),
                None => break,
            }
        }
        outcomes
    }

    fn apply(&mut self, completion: Completion) -> WriteOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion { outcome, saved } = completion;
        match (outcome.kind, saved) {
            (WriteKind::Save, Some(loadout)) => {
                self.cache
                    .entry(outcome.owner)
                    .or_default()
                    .insert(outcome.slot, Arc::new(loadout));
                debug!("cached saved loadout {}/{}", outcome.owner, outcome.slot);
            }
            (WriteKind::Delete, _) if outcome.success => {
                if let Some(slots) = self.cache.get_mut(&outcome.owner) {
                    slots.remove(&outcome.slot);
                }
                debug!("evicted deleted loadout {}/{}", outcome.owner, outcome.slot);
            }
            _ => {}
        }
        outcome
    }

    /// The user's session, created empty if there is none.
    pub fn start_session(&mut self, user: UserId) -> &mut EditSession {
        self.sessions
            .entry(user)
            .or_insert_with(|| EditSession::new(user))
    }

    pub fn session(&self, user: UserId) -> Option<&EditSession> {
        self.sessions.get(&user)
    }

    pub fn session_mut(&mut self, user: UserId) -> Option<&mut EditSession> {
        self.sessions.get_mut(&user)
    }

    pub fn end_session(&mut self, user: UserId) -> Option<EditSession> {
        self.sessions.remove(&user)
    }

    pub fn has_session(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    pub fn session_users(&self) -> Vec<UserId> {
        self.sessions.keys().copied().collect()
    }

    pub fn clear_cache(&mut self, owner: OwnerId) {
        self.cache.remove(&owner);
        self.complete.remove(&owner);
    }

    /// Drop every cached loadout. Sessions are kept.
    pub fn clear_all_caches(&mut self) {
        self.cache.clear();
        self.complete.clear();
    }

    pub fn is_cached(&self, owner: OwnerId, slot: SlotNumber) -> bool {
        self.cache
            .get(&owner)
            .is_some_and(|slots| slots.contains_key(&slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadouts_schema::ItemStack;
    use loadouts_store::{SqliteRepository, StoreError};

    struct FailingRepository;

    impl LoadoutRepository for FailingRepository {
        fn backend_name(&self) -> &'static str {
            "failing"
        }
        fn save(&self, _: &Loadout) -> Result<(), StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
        fn get(&self, _: OwnerId, _: SlotNumber) -> Result<Option<Loadout>, StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
        fn delete(&self, _: OwnerId, _: SlotNumber) -> Result<bool, StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
        fn count_for_owner(&self, _: OwnerId) -> Result<usize, StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
        fn list_for_owner(&self, _: OwnerId) -> Result<Vec<Loadout>, StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
        fn list_owners(&self) -> Result<Vec<OwnerId>, StoreError> {
            Err(StoreError::Runtime("injected".to_owned()))
        }
    }

    fn slot(n: u8) -> SlotNumber {
        SlotNumber::new(n).unwrap()
    }

    fn sqlite_registry() -> LoadoutRegistry {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        LoadoutRegistry::new(repo, Handle::current())
    }

    fn loadout(owner: OwnerId, n: u8) -> Loadout {
        let mut loadout = Loadout::new(owner, slot(n));
        loadout.final_items = vec![Some(ItemStack::new("sword", 1))];
        loadout
    }

    #[tokio::test]
    async fn save_updates_cache_after_drain() {
        let mut registry = sqlite_registry();
        let owner = OwnerId::GLOBAL;

        let ticket = registry.save_loadout_async(loadout(owner, 1));
        assert!(ticket.await);
        assert!(!registry.is_cached(owner, slot(1)));

        let outcomes = registry.drain_completions();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert!(registry.is_cached(owner, slot(1)));
        assert_eq!(registry.pending_writes(), 0);
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let mut registry = sqlite_registry();
        assert!(registry.get_loadout(OwnerId::GLOBAL, slot(2)).is_none());
        assert!(!registry.is_cached(OwnerId::GLOBAL, slot(2)));
    }

    #[tokio::test]
    async fn read_through_populates_cache() {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        repo.save(&loadout(OwnerId::GLOBAL, 3)).unwrap();
        let mut registry = LoadoutRegistry::new(repo, Handle::current());

        assert!(registry.get_loadout(OwnerId::GLOBAL, slot(3)).is_some());
        assert!(registry.is_cached(OwnerId::GLOBAL, slot(3)));
    }

    #[tokio::test]
    async fn failed_save_leaves_cache_untouched() {
        let mut registry = LoadoutRegistry::new(Arc::new(FailingRepository), Handle::current());
        let ticket = registry.save_loadout_async(loadout(OwnerId::GLOBAL, 1));
        assert!(!ticket.await);

        let outcomes = registry.settle().await;
        assert!(!outcomes[0].success);
        assert!(!registry.is_cached(OwnerId::GLOBAL, slot(1)));
    }

    #[tokio::test]
    async fn repository_errors_read_as_absent() {
        let mut registry = LoadoutRegistry::new(Arc::new(FailingRepository), Handle::current());
        assert!(registry.get_loadout(OwnerId::GLOBAL, slot(1)).is_none());
        assert_eq!(registry.loadout_count(OwnerId::GLOBAL), 0);
    }

    #[tokio::test]
    async fn delete_evicts_and_reports_absence() {
        let mut registry = sqlite_registry();
        let owner = OwnerId::GLOBAL;
        registry.save_loadout_async(loadout(owner, 3));
        registry.settle().await;
        assert!(registry.is_cached(owner, slot(3)));

        assert!(registry.delete_loadout_async(owner, slot(3)).await);
        registry.settle().await;
        assert!(!registry.is_cached(owner, slot(3)));
        assert!(registry.get_loadout(owner, slot(3)).is_none());

        assert!(!registry.delete_loadout_async(owner, slot(3)).await);
    }

    #[tokio::test]
    async fn count_uses_cache_once_owner_is_fully_loaded() {
        let mut registry = sqlite_registry();
        let owner = OwnerId::from(UserId::random());
        registry.save_loadout_async(loadout(owner, 1));
        registry.save_loadout_async(Loadout::new(owner, slot(2)));
        registry.settle().await;

        assert_eq!(registry.loadout_count(owner), 1);
        assert_eq!(registry.loadouts_for(owner).len(), 2);
        assert_eq!(registry.loadout_count(owner), 1);
    }

    #[tokio::test]
    async fn clear_all_caches_keeps_sessions() {
        let mut registry = sqlite_registry();
        let user = UserId::random();
        registry.start_session(user);
        registry.save_loadout_async(loadout(OwnerId::GLOBAL, 1));
        registry.settle().await;

        registry.clear_all_caches();
        assert!(!registry.is_cached(OwnerId::GLOBAL, slot(1)));
        assert!(registry.has_session(user));
    }

    #[tokio::test]
    async fn start_session_returns_existing() {
        let mut registry = sqlite_registry();
        let user = UserId::random();
        registry.start_session(user).page = 3;
        assert_eq!(registry.start_session(user).page, 3);
        assert!(registry.end_session(user).is_some());
        assert!(!registry.has_session(user));
    }
}
