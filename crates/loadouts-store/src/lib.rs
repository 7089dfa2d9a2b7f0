//! Durable loadout storage.
//!
//! `LoadoutRepository` is the backend-neutral contract: transactional
//! full-replace `save`, point `get`, cascading `delete` and per-owner counts.
//! `SqliteRepository` keeps everything in one embedded file,
//! `MysqlRepository` talks to a networked server through a connection pool.
//! `open_repository` picks one from the configuration.

pub mod codec;
pub mod mysql;
pub mod sqlite;

pub use codec::{decode_item, encode_item};
pub use mysql::MysqlRepository;
pub use sqlite::SqliteRepository;

use loadouts_schema::{DatabaseBackend, DatabaseSection, Loadout, OwnerId, SlotNumber};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Version of the logical schema written by this crate.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot connect to {backend} database: {reason}")]
    Connection {
        backend: &'static str,
        reason: String,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("mysql error: {0}")]
    Mysql(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error("schema version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: i64, found: i64 },
    #[error("database connection lock poisoned")]
    LockPoisoned,
    #[error("database runtime error: {0}")]
    Runtime(String),
}

/// Storage contract shared by every backend.
///
/// Calls block on I/O. Hosts run writes off their main loop.
pub trait LoadoutRepository: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Upsert the loadout row and replace every dependent row in one
    /// transaction. On error nothing is changed.
    fn save(&self, loadout: &Loadout) -> Result<(), StoreError>;

    fn get(&self, owner: OwnerId, slot: SlotNumber) -> Result<Option<Loadout>, StoreError>;

    /// Returns whether a loadout existed.
    fn delete(&self, owner: OwnerId, slot: SlotNumber) -> Result<bool, StoreError>;

    /// Stored loadouts of `owner` that hold at least one item.
    fn count_for_owner(&self, owner: OwnerId) -> Result<usize, StoreError>;

    /// Every stored loadout of `owner`, by slot number.
    fn list_for_owner(&self, owner: OwnerId) -> Result<Vec<Loadout>, StoreError>;

    fn list_owners(&self) -> Result<Vec<OwnerId>, StoreError>;
}

/// Open the configured backend.
///
/// A relative SQLite path is resolved against `base_dir`. Any failure here is
/// a connection failure: callers should not run without storage.
pub fn open_repository(
    database: &DatabaseSection,
    base_dir: &Path,
) -> Result<Arc<dyn LoadoutRepository>, StoreError> {
    match database.backend {
        DatabaseBackend::Sqlite => {
            let path = if database.sqlite.file.is_absolute() {
                database.sqlite.file.clone()
            } else {
                base_dir.join(&database.sqlite.file)
            };
            let repo = SqliteRepository::open(&path)?;
            info!("loadout repository: sqlite at {}", path.display());
            Ok(Arc::new(repo))
        }
        DatabaseBackend::Mysql => {
            let repo = MysqlRepository::connect(&database.mysql)?;
            info!(
                "loadout repository: mysql at {}:{}/{}",
                database.mysql.host, database.mysql.port, database.mysql.database
            );
            Ok(Arc::new(repo))
        }
    }
}
