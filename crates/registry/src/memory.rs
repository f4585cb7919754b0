use crate::error::Result;
use crate::pool::{Pool, PoolConfig, PoolSnapshot};
use crate::registry::{page_window, Registry};
use async_trait::async_trait;
use phone_matcher_protocol::{CanonicalPhone, OwnerId, RegistryEntry, RegistryPage};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
struct Tables {
    by_phone: HashMap<CanonicalPhone, u64>,
    rows: BTreeMap<u64, RegistryEntry>,
    next_id: u64,
}

type Handle = Arc<RwLock<Tables>>;

/// Registry held in process memory.
///
/// Anti-join is a direct hash lookup per candidate; there is no physical
/// scratch table. Calls still go through a bounded [`Pool`] so the resource
/// model matches the SQL backend.
pub struct MemoryRegistry {
    pool: Pool<Handle>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let tables: Handle = Arc::new(RwLock::new(Tables::default()));
        let pool = Pool::new(config, move || Ok(Arc::clone(&tables)));
        Self { pool }
    }

    #[must_use]
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Close the handle pool; later calls fail with `StorageUnavailable`.
    pub fn close(&self) {
        self.pool.close();
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn upsert_batch(&self, phones: &[CanonicalPhone], owner: &OwnerId) -> Result<u64> {
        if phones.is_empty() {
            return Ok(0);
        }
        let handle = self.pool.acquire().await?;
        let mut tables = handle.write().unwrap_or_else(PoisonError::into_inner);
        let created_at = unix_now();
        let mut inserted = 0;
        for phone in phones {
            if tables.by_phone.contains_key(phone) {
                continue;
            }
            tables.next_id += 1;
            let id = tables.next_id;
            tables.by_phone.insert(phone.clone(), id);
            tables.rows.insert(
                id,
                RegistryEntry {
                    id,
                    phone: phone.clone(),
                    owner: owner.clone(),
                    created_at,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn anti_join(&self, batch: &[CanonicalPhone]) -> Result<Vec<CanonicalPhone>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let handle = self.pool.acquire().await?;
        let tables = handle.read().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::with_capacity(batch.len());
        Ok(batch
            .iter()
            .filter(|phone| !tables.by_phone.contains_key(*phone))
            .filter(|phone| seen.insert(*phone))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let handle = self.pool.acquire().await?;
        let tables = handle.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.rows.len() as u64)
    }

    async fn search(&self, pattern: &str, page: usize, page_size: usize) -> Result<RegistryPage> {
        let (page, page_size, offset) = page_window(page, page_size);
        let needle = pattern.trim().to_lowercase();
        let handle = self.pool.acquire().await?;
        let tables = handle.read().unwrap_or_else(PoisonError::into_inner);

        let matches = |entry: &&RegistryEntry| {
            needle.is_empty()
                || entry.phone.as_str().contains(&needle)
                || entry.owner.as_str().to_lowercase().contains(&needle)
        };
        let total = tables.rows.values().filter(matches).count() as u64;
        let entries = tables
            .rows
            .values()
            .rev()
            .filter(matches)
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect();

        Ok(RegistryPage {
            entries,
            total,
            page,
            page_size,
        })
    }

    async fn delete_by_key(&self, phone: &CanonicalPhone) -> Result<bool> {
        let handle = self.pool.acquire().await?;
        let mut tables = handle.write().unwrap_or_else(PoisonError::into_inner);
        let Some(id) = tables.by_phone.remove(phone) else {
            return Ok(false);
        };
        tables.rows.remove(&id);
        Ok(true)
    }
}
