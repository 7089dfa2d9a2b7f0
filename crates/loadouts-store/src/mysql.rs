//! Networked MySQL backend behind a bounded connection pool.
//!
//! The repository contract is blocking, so the pool lives on a private tokio
//! runtime and every call is driven to completion with `block_on`.

use crate::codec::{
    assemble, encode_items, parse_owner, parse_slot, AssignmentRow, LoadoutHeader,
    DEPENDENT_TABLES,
};
use crate::{LoadoutRepository, StoreError, SCHEMA_VERSION};
use loadouts_schema::{Loadout, MysqlSection, OwnerId, SlotNumber};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::future::Future;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

pub(crate) const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS loadouts_meta (
        name  VARCHAR(32) NOT NULL PRIMARY KEY,
        value BIGINT NOT NULL
    ) ENGINE=InnoDB",
    "CREATE TABLE IF NOT EXISTS loadouts (
        id           BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        owner        VARCHAR(36) NOT NULL,
        slot_name    VARCHAR(16) NOT NULL,
        display_name VARCHAR(64) NULL,
        created_at   BIGINT NOT NULL,
        updated_at   BIGINT NOT NULL,
        UNIQUE KEY uq_loadouts_owner_slot (owner, slot_name)
    ) ENGINE=InnoDB",
    "CREATE TABLE IF NOT EXISTS slot_assignments (
        loadout_id      BIGINT NOT NULL,
        slot_type       VARCHAR(64) NOT NULL,
        item_ref        VARCHAR(128) NOT NULL,
        category        VARCHAR(64) NULL,
        is_catalog_item BOOLEAN NOT NULL,
        ammo_amount     INT NOT NULL DEFAULT 0,
        PRIMARY KEY (loadout_id, slot_type),
        FOREIGN KEY (loadout_id) REFERENCES loadouts(id) ON DELETE CASCADE
    ) ENGINE=InnoDB",
    "CREATE TABLE IF NOT EXISTS attachment_selections (
        loadout_id     BIGINT NOT NULL,
        attachment_key VARCHAR(64) NOT NULL,
        attachment_id  VARCHAR(128) NOT NULL,
        PRIMARY KEY (loadout_id, attachment_key),
        FOREIGN KEY (loadout_id) REFERENCES loadouts(id) ON DELETE CASCADE
    ) ENGINE=InnoDB",
    "CREATE TABLE IF NOT EXISTS final_items (
        loadout_id BIGINT NOT NULL,
        item_index INT NOT NULL,
        item_blob  MEDIUMBLOB NOT NULL,
        PRIMARY KEY (loadout_id, item_index),
        FOREIGN KEY (loadout_id) REFERENCES loadouts(id) ON DELETE CASCADE
    ) ENGINE=InnoDB",
];

const UPSERT_LOADOUT: &str = "
INSERT INTO loadouts (owner, slot_name, display_name, created_at, updated_at)
VALUES (?, ?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    display_name = VALUES(display_name),
    updated_at = VALUES(updated_at),
    id = LAST_INSERT_ID(id)";

const HEADER_COLUMNS: &str = "id, owner, slot_name, display_name, created_at, updated_at";

fn header_from_row(row: &MySqlRow) -> Result<LoadoutHeader, StoreError> {
    let owner: String = row.try_get("owner")?;
    let slot: String = row.try_get("slot_name")?;
    Ok(LoadoutHeader {
        id: row.try_get("id")?,
        owner: parse_owner(&owner)?,
        slot: parse_slot(&slot)?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct MysqlRepository {
    pool: MySqlPool,
    runtime: Option<Runtime>,
}

impl MysqlRepository {
    /// Connect the pool and create missing tables.
    ///
    /// Fails with `StoreError::Connection` when the server is unreachable or
    /// rejects the credentials within the configured timeout.
    pub fn connect(section: &MysqlSection) -> Result<Self, StoreError> {
        let connection_error = |reason: String| StoreError::Connection {
            backend: "mysql",
            reason,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("loadouts-mysql")
            .enable_all()
            .build()?;

        let options = MySqlConnectOptions::new()
            .host(&section.host)
            .port(section.port)
            .database(&section.database)
            .username(&section.username)
            .password(&section.password);
        let pool_options = MySqlPoolOptions::new()
            .max_connections(section.pool_size)
            .acquire_timeout(section.connect_timeout());

        let pool = run_on(&runtime, pool_options.connect_with(options))?
            .map_err(|e| connection_error(format!("{}:{}: {e}", section.host, section.port)))?;

        let repo = Self {
            pool,
            runtime: Some(runtime),
        };
        repo.block_on(repo.init_schema())??;
        info!(
            "connected to mysql at {}:{} (pool size {})",
            section.host, section.port, section.pool_size
        );
        Ok(repo)
    }

    fn block_on<F>(&self, future: F) -> Result<F::Output, StoreError>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| StoreError::Runtime("runtime already shut down".to_owned()))?;
        run_on(runtime, future)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        sqlx::query("INSERT IGNORE INTO loadouts_meta (name, value) VALUES ('schema_version', ?)")
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;
        let found: i64 =
            sqlx::query_scalar("SELECT value FROM loadouts_meta WHERE name = 'schema_version'")
                .fetch_one(&self.pool)
                .await?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        Ok(())
    }

    async fn load(&self, header: LoadoutHeader) -> Result<Loadout, StoreError> {
        let id = header.id;

        let assignments = sqlx::query(
            "SELECT slot_type, item_ref, category, is_catalog_item, ammo_amount
             FROM slot_assignments WHERE loadout_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(AssignmentRow {
                slot_type: row.try_get("slot_type")?,
                item_ref: row.try_get("item_ref")?,
                category: row.try_get("category")?,
                is_catalog_item: row.try_get("is_catalog_item")?,
                ammo_amount: i64::from(row.try_get::<i32, _>("ammo_amount")?),
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let attachments = sqlx::query(
            "SELECT attachment_key, attachment_id FROM attachment_selections WHERE loadout_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| Ok((row.try_get("attachment_key")?, row.try_get("attachment_id")?)))
        .collect::<Result<Vec<(String, String)>, sqlx::Error>>()?;

        let items = sqlx::query(
            "SELECT item_index, item_blob FROM final_items WHERE loadout_id = ? ORDER BY item_index",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok((
                i64::from(row.try_get::<i32, _>("item_index")?),
                row.try_get::<Vec<u8>, _>("item_blob")?,
            ))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(assemble(header, assignments, attachments, items))
    }

    async fn save_async(&self, loadout: &Loadout) -> Result<(), StoreError> {
        let items = encode_items(&loadout.final_items)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(UPSERT_LOADOUT)
            .bind(loadout.owner.to_string())
            .bind(loadout.slot.slot_name())
            .bind(loadout.display_name.as_deref())
            .bind(loadout.created_at.timestamp_millis())
            .bind(loadout.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        let id = i64::try_from(result.last_insert_id()).map_err(|_| StoreError::Corrupt {
            table: "loadouts",
            detail: format!("id {} out of range", result.last_insert_id()),
        })?;

        for table in DEPENDENT_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE loadout_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        for a in loadout.assignments.values() {
            sqlx::query(
                "INSERT INTO slot_assignments
                 (loadout_id, slot_type, item_ref, category, is_catalog_item, ammo_amount)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(a.slot_type.as_str())
            .bind(a.item_ref.as_str())
            .bind(a.category.as_ref().map(|c| c.as_str()))
            .bind(a.is_catalog_item)
            .bind(i32::try_from(a.ammo_amount).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }
        for (key, attachment) in &loadout.attachments {
            sqlx::query(
                "INSERT INTO attachment_selections (loadout_id, attachment_key, attachment_id)
                 VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(key.as_str())
            .bind(attachment.as_str())
            .execute(&mut *tx)
            .await?;
        }
        for (index, blob) in &items {
            sqlx::query("INSERT INTO final_items (loadout_id, item_index, item_blob) VALUES (?, ?, ?)")
                .bind(id)
                .bind(*index as i32)
                .bind(blob.as_slice())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("saved loadout {}/{} ({} items)", loadout.owner, loadout.slot, items.len());
        Ok(())
    }

    async fn get_async(&self, owner: OwnerId, slot: SlotNumber) -> Result<Option<Loadout>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM loadouts WHERE owner = ? AND slot_name = ?"
        ))
        .bind(owner.to_string())
        .bind(slot.slot_name())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load(header_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn delete_async(&self, owner: OwnerId, slot: SlotNumber) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM loadouts WHERE owner = ? AND slot_name = ? FOR UPDATE")
                .bind(owner.to_string())
                .bind(slot.slot_name())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(id) = id else {
            return Ok(false);
        };
        for table in DEPENDENT_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE loadout_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM loadouts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!("deleted loadout {owner}/{slot}");
        Ok(true)
    }

    async fn count_async(&self, owner: OwnerId) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loadouts l
             WHERE l.owner = ?
               AND EXISTS (SELECT 1 FROM final_items f WHERE f.loadout_id = l.id)",
        )
        .bind(owner.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn list_async(&self, owner: OwnerId) -> Result<Vec<Loadout>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM loadouts
             WHERE owner = ? ORDER BY CAST(slot_name AS UNSIGNED)"
        ))
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut loadouts = Vec::with_capacity(rows.len());
        for row in &rows {
            loadouts.push(self.load(header_from_row(row)?).await?);
        }
        Ok(loadouts)
    }

    async fn owners_async(&self) -> Result<Vec<OwnerId>, StoreError> {
        let owners: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT owner FROM loadouts ORDER BY owner")
                .fetch_all(&self.pool)
                .await?;
        owners.iter().map(|raw| parse_owner(raw)).collect()
    }
}

impl Drop for MysqlRepository {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl LoadoutRepository for MysqlRepository {
    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    fn save(&self, loadout: &Loadout) -> Result<(), StoreError> {
        self.block_on(self.save_async(loadout))?
    }

    fn get(&self, owner: OwnerId, slot: SlotNumber) -> Result<Option<Loadout>, StoreError> {
        self.block_on(self.get_async(owner, slot))?
    }

    fn delete(&self, owner: OwnerId, slot: SlotNumber) -> Result<bool, StoreError> {
        self.block_on(self.delete_async(owner, slot))?
    }

    fn count_for_owner(&self, owner: OwnerId) -> Result<usize, StoreError> {
        self.block_on(self.count_async(owner))?
    }

    fn list_for_owner(&self, owner: OwnerId) -> Result<Vec<Loadout>, StoreError> {
        self.block_on(self.list_async(owner))?
    }

    fn list_owners(&self) -> Result<Vec<OwnerId>, StoreError> {
        self.block_on(self.owners_async())?
    }
}

/// Drive `future` on `runtime`. From inside another runtime's context the
/// call moves to a scoped thread, since nested `block_on` panics.
fn run_on<F>(runtime: &Runtime, future: F) -> Result<F::Output, StoreError>
where
    F: Future + Send,
    F::Output: Send,
{
    if Handle::try_current().is_err() {
        return Ok(runtime.block_on(future));
    }
    std::thread::scope(|scope| {
        scope
            .spawn(|| runtime.block_on(future))
            .join()
            .map_err(|_| StoreError::Runtime("mysql worker thread panicked".to_owned()))
    })
}
