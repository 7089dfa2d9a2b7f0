//! Loadout editing and application.
//!
//! The pieces, leaves first:
//! - `EditGuard` owns a user's live inventory while they edit: it keeps a
//!   backup, hands out an empty staging area and always puts the original
//!   back, optionally mirrored to a crash `BackupJournal`.
//! - `LoadoutRegistry` caches loadouts, tracks `EditSession`s and runs
//!   repository writes on the blocking pool.
//! - The selection wizard (`lifecycle`, `wizard`, `staging`) turns menu
//!   events into working selections and materializes them through a
//!   `Catalog`.
//! - `LoadoutService` wires all of the above to a `PlayerHost`.

pub mod catalog;
pub mod concurrency;
pub mod confirm;
pub mod guard;
pub mod host;
pub mod journal;
pub mod lifecycle;
pub mod registry;
pub mod service;
pub mod session;
pub mod staging;
pub mod wizard;

pub use catalog::{
    resolve_attachment_factory, AttachmentFactory, Catalog, NoAttachments, StaticCatalog,
};
pub use concurrency::{install_signal_handler, request_shutdown, shutdown_requested, JournalLock};
pub use confirm::PendingConfirmations;
pub use guard::{EditGuard, InventoryBackup};
pub use host::{ContainerKind, Interaction, MemoryHost, Notice, PlayerHost, Verdict};
pub use journal::{BackupJournal, JournalReport};
pub use lifecycle::{validate_transition, WizardState};
pub use registry::{LoadoutRegistry, WriteKind, WriteOutcome, WriteTicket};
pub use service::{LoadoutService, LoadoutSummary};
pub use session::{Cursor, EditSession, EditTarget};
pub use staging::{materialize, place, Placement, StagedItems};
pub use wizard::{dispatch, page_view, Effect, PageEntry, PageView, WizardContext, WizardEvent};

use loadouts_schema::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid wizard transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("user {0} is already in edit mode")]
    AlreadyEditing(UserId),
    #[error("user is not in edit mode")]
    NotEditing,
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("no active edit session")]
    NoSession,
    #[error("user is not online")]
    UserOffline,
    #[error("nothing selected")]
    NothingSelected,
    #[error("'{0}' is not listed here")]
    NotListed(String),
    #[error("journal error: {0}")]
    Journal(String),
    #[error("store error: {0}")]
    Store(#[from] loadouts_store::StoreError),
    #[error(transparent)]
    Config(#[from] loadouts_schema::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
