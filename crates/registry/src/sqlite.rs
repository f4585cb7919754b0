use crate::error::{RegistryError, Result};
use crate::pool::{Pool, PoolConfig, PoolSnapshot, PooledHandle};
use crate::registry::{page_window, Registry};
use crate::scratch::scratch_table_name;
use async_trait::async_trait;
use phone_matcher_protocol::{CanonicalPhone, OwnerId, RegistryEntry, RegistryPage};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS phone_numbers (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    phone      TEXT    NOT NULL UNIQUE
               CHECK (length(phone) > 0 AND phone NOT GLOB '*[^0-9]*'),
    added_by   TEXT    NOT NULL,
    created_at INTEGER NOT NULL
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry backed by a SQLite database file, one pooled connection per
/// in-flight call.
pub struct SqliteRegistry {
    pool: Pool<Connection>,
    path: PathBuf,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|err| {
        RegistryError::unavailable(format!("open registry {}: {err}", path.display()))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

impl SqliteRegistry {
    /// Open (or create) the registry at `path` and make sure the schema exists.
    pub async fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::info!("Opening SQLite registry at {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                RegistryError::unavailable(format!("create {}: {err}", parent.display()))
            })?;
        }

        let factory_path = path.clone();
        let pool = Pool::new(config, move || open_connection(&factory_path));
        let registry = Self { pool, path };
        registry
            .with_conn(|conn| conn.execute_batch(SCHEMA).map_err(RegistryError::from))
            .await?;
        Ok(registry)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Close the connection pool; later calls fail with `StorageUnavailable`.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Run blocking work on a pooled connection. The connection goes back to
    /// the pool when the closure returns, or is dropped if it panicked or
    /// asked to be discarded.
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledHandle<Connection>) -> Result<T> + Send + 'static,
    {
        let mut handle = self.pool.acquire().await?;
        tokio::task::spawn_blocking(move || work(&mut handle))
            .await
            .map_err(|err| RegistryError::unavailable(format!("join storage task: {err}")))?
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn upsert_chunk(conn: &mut Connection, phones: &[String], owner: &str) -> Result<u64> {
    let created_at = unix_now();
    let tx = conn.transaction()?;
    let mut inserted = 0u64;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO phone_numbers (phone, added_by, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(phone) DO NOTHING",
        )?;
        for phone in phones {
            inserted += stmt.execute(params![phone, owner, created_at])? as u64;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn scratch_anti_join(conn: &Connection, table: &str, batch: &[String]) -> Result<Vec<String>> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(
        "CREATE TEMP TABLE \"{table}\" (phone TEXT PRIMARY KEY)"
    ))?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT OR IGNORE INTO temp.\"{table}\" (phone) VALUES (?1)"
        ))?;
        for phone in batch {
            insert.execute([phone])?;
        }
    }
    tx.commit()?;

    let mut select = conn.prepare(&format!(
        "SELECT t.phone
           FROM temp.\"{table}\" t
           LEFT JOIN main.phone_numbers p ON p.phone = t.phone
          WHERE p.phone IS NULL
          ORDER BY t.rowid"
    ))?;
    let rows = select
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Drop the scratch table whatever `outcome` was. A connection that cannot
/// drop it is discarded so the table never outlives this call.
fn drop_scratch<T>(
    conn: &mut PooledHandle<Connection>,
    table: &str,
    outcome: Result<T>,
) -> Result<T> {
    let drop_sql = format!("DROP TABLE IF EXISTS temp.\"{table}\"");
    if let Err(err) = conn.execute_batch(&drop_sql) {
        log::warn!("Failed to drop scratch table {table}: {err}; discarding connection");
        conn.discard();
    }
    outcome
}

fn to_phone(raw: String) -> Result<CanonicalPhone> {
    CanonicalPhone::try_from(raw).map_err(|err| RegistryError::InvalidRow(err.to_string()))
}

fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('%');
    for ch in pattern.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

type RawRow = (i64, String, String, i64);

fn to_entry((id, phone, owner, created_at): RawRow) -> Result<RegistryEntry> {
    let owner = OwnerId::new(owner)
        .ok_or_else(|| RegistryError::InvalidRow(format!("blank owner on row {id}")))?;
    Ok(RegistryEntry {
        id: u64::try_from(id).map_err(|_| RegistryError::InvalidRow(format!("row id {id}")))?,
        phone: to_phone(phone)?,
        owner,
        created_at: u64::try_from(created_at).unwrap_or(0),
    })
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn upsert_batch(&self, phones: &[CanonicalPhone], owner: &OwnerId) -> Result<u64> {
        if phones.is_empty() {
            return Ok(0);
        }
        let phones: Vec<String> = phones.iter().map(|p| p.as_str().to_string()).collect();
        let owner = owner.as_str().to_string();
        self.with_conn(move |conn| upsert_chunk(conn, &phones, &owner))
            .await
    }

    async fn anti_join(&self, batch: &[CanonicalPhone]) -> Result<Vec<CanonicalPhone>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let batch: Vec<String> = batch.iter().map(|p| p.as_str().to_string()).collect();
        let unmatched = self
            .with_conn(move |conn| {
                let table = scratch_table_name();
                let outcome = scratch_anti_join(conn, &table, &batch);
                drop_scratch(conn, &table, outcome)
            })
            .await?;
        unmatched.into_iter().map(to_phone).collect()
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM phone_numbers", [], |row| {
                row.get(0)
            })?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn search(&self, pattern: &str, page: usize, page_size: usize) -> Result<RegistryPage> {
        let (page, page_size, offset) = page_window(page, page_size);
        let like = escape_like(pattern.trim());
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        let skip = i64::try_from(offset).unwrap_or(i64::MAX);
        let (total, rows) = self
            .with_conn(move |conn| {
                let filter = "phone LIKE ?1 ESCAPE '\\' OR added_by LIKE ?1 ESCAPE '\\'";
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM phone_numbers WHERE {filter}"),
                    [&like],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, phone, added_by, created_at FROM phone_numbers
                      WHERE {filter}
                      ORDER BY id DESC
                      LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt
                    .query_map(params![like, limit, skip], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<RawRow>>>()?;
                Ok((total, rows))
            })
            .await?;

        Ok(RegistryPage {
            entries: rows.into_iter().map(to_entry).collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or(0),
            page,
            page_size,
        })
    }

    async fn delete_by_key(&self, phone: &CanonicalPhone) -> Result<bool> {
        let phone = phone.as_str().to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM phone_numbers WHERE phone = ?1", [&phone])?;
            Ok(removed > 0)
        })
        .await
    }
}

impl SqliteRegistry {
    /// Look up a single row by phone.
    pub async fn get(&self, phone: &CanonicalPhone) -> Result<Option<RegistryEntry>> {
        let phone = phone.as_str().to_string();
        let row = self
            .with_conn(move |conn| {
                let row: Option<RawRow> = conn
                    .query_row(
                        "SELECT id, phone, added_by, created_at FROM phone_numbers WHERE phone = ?1",
                        [&phone],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(to_entry).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_wraps_and_escapes() {
        assert_eq!(escape_like(""), "%%");
        assert_eq!(escape_like("555"), "%555%");
        assert_eq!(escape_like("a_b%c\\"), "%a\\_b\\%c\\\\%");
    }

    #[test]
    fn schema_rejects_non_digit_phones() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        let err = conn
            .execute(
                "INSERT INTO phone_numbers (phone, added_by, created_at) VALUES ('12-34', 'a', 0)",
                [],
            )
            .unwrap_err();
        assert!(matches!(
            RegistryError::from(err),
            RegistryError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn scratch_anti_join_on_plain_connection() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO phone_numbers (phone, added_by, created_at) VALUES ('1111111111', 'a', 0)",
            [],
        )
        .unwrap();

        let batch = vec![
            "2222222222".to_string(),
            "1111111111".to_string(),
            "2222222222".to_string(),
        ];
        let rows = scratch_anti_join(&conn, "scratch_test", &batch).unwrap();
        assert_eq!(rows, vec!["2222222222".to_string()]);
    }

    #[tokio::test]
    async fn anti_join_leaves_no_scratch_tables_behind() {
        let temp = tempfile::TempDir::new().unwrap();
        let registry = SqliteRegistry::open(temp.path().join("r.sqlite"), PoolConfig::new(1))
            .await
            .unwrap();
        let batch = vec![CanonicalPhone::parse("5550000000").unwrap()];
        for _ in 0..3 {
            assert_eq!(registry.anti_join(&batch).await.unwrap(), batch);
        }

        let leftover: i64 = registry
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )
                .map_err(RegistryError::from)
            })
            .await
            .unwrap();
        assert_eq!(leftover, 0);
    }

    async fn temp_table_count(registry: &SqliteRegistry) -> i64 {
        registry
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )
                .map_err(RegistryError::from)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn failed_anti_join_still_drops_scratch_table() {
        let temp = tempfile::TempDir::new().unwrap();
        let registry = SqliteRegistry::open(temp.path().join("r.sqlite"), PoolConfig::new(1))
            .await
            .unwrap();
        registry
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE phone_numbers")
                    .map_err(RegistryError::from)
            })
            .await
            .unwrap();

        let batch = vec![CanonicalPhone::parse("5550000000").unwrap()];
        let err = registry.anti_join(&batch).await.unwrap_err();
        assert!(matches!(err, RegistryError::StorageUnavailable(_)), "{err}");
        assert_eq!(registry.pool_snapshot().idle, 1);
        assert_eq!(temp_table_count(&registry).await, 0);
    }

    #[tokio::test]
    async fn undroppable_scratch_table_discards_connection() {
        let temp = tempfile::TempDir::new().unwrap();
        let registry = SqliteRegistry::open(temp.path().join("r.sqlite"), PoolConfig::new(1))
            .await
            .unwrap();

        let rows = registry
            .with_conn(|conn| {
                let table = scratch_table_name();
                let outcome = scratch_anti_join(conn, &table, &["5550000000".to_string()]);
                // Any write, including DROP on a temp table, now fails.
                conn.execute_batch("PRAGMA query_only = ON")?;
                Ok(drop_scratch(conn, &table, outcome))
            })
            .await
            .unwrap();
        assert_eq!(rows.unwrap(), vec!["5550000000".to_string()]);
        assert_eq!(registry.pool_snapshot().idle, 0);

        let err = registry
            .with_conn(|conn| {
                conn.execute_batch("CREATE TEMP TABLE scratch_held (phone TEXT)")?;
                conn.execute_batch("PRAGMA query_only = ON")?;
                let outcome: Result<()> = Err(RegistryError::unavailable("query failed"));
                Ok(drop_scratch(conn, "scratch_held", outcome))
            })
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), RegistryError::unavailable("query failed").to_string());
        assert_eq!(registry.pool_snapshot().idle, 0);

        // A fresh connection replaces the discarded one.
        assert_eq!(temp_table_count(&registry).await, 0);
        assert_eq!(registry.pool_snapshot().idle, 1);
    }
}
