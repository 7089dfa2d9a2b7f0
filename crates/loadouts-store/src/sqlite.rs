//! Embedded single-file backend.

use crate::codec::{
    assemble, encode_items, parse_owner, parse_slot, AssignmentRow, LoadoutHeader,
    DEPENDENT_TABLES,
};
use crate::{LoadoutRepository, StoreError, SCHEMA_VERSION};
use loadouts_schema::{Loadout, OwnerId, SlotNumber};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS loadouts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    owner        TEXT NOT NULL,
    slot_name    TEXT NOT NULL,
    display_name TEXT,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL,
    UNIQUE (owner, slot_name)
);
CREATE TABLE IF NOT EXISTS slot_assignments (
    loadout_id      INTEGER NOT NULL REFERENCES loadouts(id) ON DELETE CASCADE,
    slot_type       TEXT NOT NULL,
    item_ref        TEXT NOT NULL,
    category        TEXT,
    is_catalog_item INTEGER NOT NULL,
    ammo_amount     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (loadout_id, slot_type)
);
CREATE TABLE IF NOT EXISTS attachment_selections (
    loadout_id     INTEGER NOT NULL REFERENCES loadouts(id) ON DELETE CASCADE,
    attachment_key TEXT NOT NULL,
    attachment_id  TEXT NOT NULL,
    UNIQUE (loadout_id, attachment_key)
);
CREATE TABLE IF NOT EXISTS final_items (
    loadout_id INTEGER NOT NULL REFERENCES loadouts(id) ON DELETE CASCADE,
    item_index INTEGER NOT NULL,
    item_blob  BLOB NOT NULL,
    UNIQUE (loadout_id, item_index)
);
CREATE INDEX IF NOT EXISTS idx_loadouts_owner ON loadouts(owner);
";

const UPSERT_LOADOUT: &str = "
INSERT INTO loadouts (owner, slot_name, display_name, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT (owner, slot_name) DO UPDATE SET
    display_name = excluded.display_name,
    updated_at = excluded.updated_at
RETURNING id";

const HEADER_COLUMNS: &str = "id, owner, slot_name, display_name, created_at, updated_at";

type RawHeader = (i64, String, String, Option<String>, i64, i64);

fn raw_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawHeader> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parse_header(raw: RawHeader) -> Result<LoadoutHeader, StoreError> {
    let (id, owner, slot, display_name, created_at, updated_at) = raw;
    Ok(LoadoutHeader {
        id,
        owner: parse_owner(&owner)?,
        slot: parse_slot(&slot)?,
        display_name,
        created_at,
        updated_at,
    })
}

/// `LoadoutRepository` over one SQLite file.
///
/// A single connection is shared behind a mutex; SQLite serializes writers
/// anyway and the write-ahead journal keeps readers of other processes going.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Connection {
            backend: "sqlite",
            reason: format!("{}: {e}", path.display()),
        })?;
        let repo = Self::init(conn, Some(path.to_path_buf()))?;
        info!("opened sqlite loadout store at {}", path.display());
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection {
            backend: "sqlite",
            reason: e.to_string(),
        })?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if path.is_some() {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("sqlite journal_mode={mode}");
        }

        let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        conn.execute_batch(SCHEMA)?;
        if found < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            debug!("sqlite schema initialized at version {SCHEMA_VERSION}");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn load(conn: &Connection, header: LoadoutHeader) -> Result<Loadout, StoreError> {
        let id = header.id;

        let mut stmt = conn.prepare_cached(
            "SELECT slot_type, item_ref, category, is_catalog_item, ammo_amount
             FROM slot_assignments WHERE loadout_id = ?1",
        )?;
        let assignments = stmt
            .query_map(params![id], |row| {
                Ok(AssignmentRow {
                    slot_type: row.get(0)?,
                    item_ref: row.get(1)?,
                    category: row.get(2)?,
                    is_catalog_item: row.get(3)?,
                    ammo_amount: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT attachment_key, attachment_id
             FROM attachment_selections WHERE loadout_id = ?1",
        )?;
        let attachments = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT item_index, item_blob FROM final_items
             WHERE loadout_id = ?1 ORDER BY item_index",
        )?;
        let items = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(i64, Vec<u8>)>, _>>()?;

        Ok(assemble(header, assignments, attachments, items))
    }
}

impl LoadoutRepository for SqliteRepository {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn save(&self, loadout: &Loadout) -> Result<(), StoreError> {
        let items = encode_items(&loadout.final_items)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let id: i64 = tx.query_row(
            UPSERT_LOADOUT,
            params![
                loadout.owner.to_string(),
                loadout.slot.slot_name(),
                loadout.display_name,
                loadout.created_at.timestamp_millis(),
                loadout.updated_at.timestamp_millis(),
            ],
            |row| row.get(0),
        )?;

        for table in DEPENDENT_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE loadout_id = ?1"),
                params![id],
            )?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO slot_assignments
                 (loadout_id, slot_type, item_ref, category, is_catalog_item, ammo_amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for a in loadout.assignments.values() {
                stmt.execute(params![
                    id,
                    a.slot_type.as_str(),
                    a.item_ref.as_str(),
                    a.category.as_ref().map(|c| c.as_str()),
                    a.is_catalog_item,
                    i64::from(a.ammo_amount),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO attachment_selections (loadout_id, attachment_key, attachment_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (key, attachment) in &loadout.attachments {
                stmt.execute(params![id, key.as_str(), attachment.as_str()])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO final_items (loadout_id, item_index, item_blob) VALUES (?1, ?2, ?3)",
            )?;
            for (index, blob) in &items {
                stmt.execute(params![id, index, blob])?;
            }
        }

        tx.commit()?;
        debug!(
            "saved loadout {}/{} ({} items)",
            loadout.owner,
            loadout.slot,
            items.len()
        );
        Ok(())
    }

    fn get(&self, owner: OwnerId, slot: SlotNumber) -> Result<Option<Loadout>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {HEADER_COLUMNS} FROM loadouts WHERE owner = ?1 AND slot_name = ?2"),
                params![owner.to_string(), slot.slot_name()],
                raw_header,
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(Self::load(&conn, parse_header(raw)?)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, owner: OwnerId, slot: SlotNumber) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM loadouts WHERE owner = ?1 AND slot_name = ?2",
                params![owner.to_string(), slot.slot_name()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        for table in DEPENDENT_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE loadout_id = ?1"),
                params![id],
            )?;
        }
        tx.execute("DELETE FROM loadouts WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!("deleted loadout {owner}/{slot}");
        Ok(true)
    }

    fn count_for_owner(&self, owner: OwnerId) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM loadouts l
             WHERE l.owner = ?1
               AND EXISTS (SELECT 1 FROM final_items f WHERE f.loadout_id = l.id)",
            params![owner.to_string()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn list_for_owner(&self, owner: OwnerId) -> Result<Vec<Loadout>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HEADER_COLUMNS} FROM loadouts
             WHERE owner = ?1 ORDER BY CAST(slot_name AS INTEGER)"
        ))?;
        let raws = stmt
            .query_map(params![owner.to_string()], raw_header)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        raws.into_iter()
            .map(|raw| Self::load(&conn, parse_header(raw)?))
            .collect()
    }

    fn list_owners(&self) -> Result<Vec<OwnerId>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT owner FROM loadouts ORDER BY owner")?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        owners.iter().map(|raw| parse_owner(raw)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadouts_schema::ItemStack;

    fn slot(n: u8) -> SlotNumber {
        SlotNumber::new(n).unwrap()
    }

    fn loadout_with_items(owner: OwnerId, n: u8) -> Loadout {
        let mut loadout = Loadout::new(owner, slot(n));
        loadout.final_items = vec![Some(ItemStack::new("sword", 1))];
        loadout
    }

    #[test]
    fn fresh_database_gets_current_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(&dir.path().join("l.db")).unwrap();
        assert_eq!(repo.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(repo.path().is_some());
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 9).unwrap();
        }
        let err = SqliteRepository::open(&path).err().unwrap();
        assert!(matches!(
            err,
            StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 9
            }
        ));
    }

    #[test]
    fn placeholder_loadouts_are_not_counted() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let owner = OwnerId::from_uuid(uuid::Uuid::new_v4());
        repo.save(&Loadout::new(owner, slot(1))).unwrap();
        repo.save(&loadout_with_items(owner, 2)).unwrap();
        assert_eq!(repo.count_for_owner(owner).unwrap(), 1);
        assert_eq!(repo.list_for_owner(owner).unwrap().len(), 2);
    }

    #[test]
    fn list_for_owner_orders_by_slot() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        for n in [4, 1, 3] {
            repo.save(&loadout_with_items(OwnerId::GLOBAL, n)).unwrap();
        }
        let slots: Vec<u8> = repo
            .list_for_owner(OwnerId::GLOBAL)
            .unwrap()
            .iter()
            .map(|l| l.slot.get())
            .collect();
        assert_eq!(slots, vec![1, 3, 4]);
    }

    #[test]
    fn list_owners_is_distinct() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let user = OwnerId::from_uuid(uuid::Uuid::new_v4());
        repo.save(&loadout_with_items(user, 1)).unwrap();
        repo.save(&loadout_with_items(user, 2)).unwrap();
        repo.save(&loadout_with_items(OwnerId::GLOBAL, 1)).unwrap();
        let owners = repo.list_owners().unwrap();
        assert_eq!(owners.len(), 2);
        assert!(owners.contains(&user));
        assert!(owners.contains(&OwnerId::GLOBAL));
    }

    #[test]
    fn corrupt_owner_column_is_reported() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        {
            let conn = repo.lock().unwrap();
            conn.execute(
                "INSERT INTO loadouts (owner, slot_name, created_at, updated_at)
                 VALUES ('not-a-uuid', '1', 0, 0)",
                [],
            )
            .unwrap();
        }
        assert!(matches!(
            repo.list_owners(),
            Err(StoreError::Corrupt { table: "loadouts", .. })
        ));
    }
}
