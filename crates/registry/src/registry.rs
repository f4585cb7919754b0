use crate::error::Result;
use async_trait::async_trait;
use phone_matcher_protocol::{CanonicalPhone, OwnerId, RegistryEntry, RegistryPage};

pub const DEFAULT_UPSERT_CHUNK: usize = 10_000;

const EXPORT_PAGE_SIZE: usize = 5_000;

/// Storage contract for the phone registry.
///
/// Every method acquires a pooled handle for the duration of one unit of
/// work and releases it before returning, on success and on error.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Insert one chunk in a single storage call. Phones already present,
    /// under any owner, are no-ops that keep the original owner. Returns the
    /// number of rows inserted.
    async fn upsert_batch(&self, phones: &[CanonicalPhone], owner: &OwnerId) -> Result<u64>;

    /// Phones of `batch` absent from the registry, each at most once.
    async fn anti_join(&self, batch: &[CanonicalPhone]) -> Result<Vec<CanonicalPhone>>;

    async fn count(&self) -> Result<u64>;

    /// Rows whose phone or owner contains `pattern` (case-insensitive),
    /// newest first. `page` is 1-based; a blank pattern matches everything.
    async fn search(&self, pattern: &str, page: usize, page_size: usize) -> Result<RegistryPage>;

    /// Returns `true` when a row was removed.
    async fn delete_by_key(&self, phone: &CanonicalPhone) -> Result<bool>;
}

/// Bulk upsert in chunks of at most `chunk_size`. Each chunk commits on its
/// own; a failing chunk stops the call and earlier chunks stay committed.
pub async fn upsert<R: Registry + ?Sized>(
    registry: &R,
    phones: &[CanonicalPhone],
    owner: &OwnerId,
    chunk_size: usize,
) -> Result<u64> {
    let mut affected = 0;
    for chunk in phones.chunks(chunk_size.max(1)) {
        affected += registry.upsert_batch(chunk, owner).await?;
    }
    log::debug!(
        "Upserted {} phones for {owner}: {affected} new",
        phones.len()
    );
    Ok(affected)
}

/// Every registry row, oldest first.
pub async fn export_all<R: Registry + ?Sized>(registry: &R) -> Result<Vec<RegistryEntry>> {
    let mut entries = Vec::new();
    let mut page = 1;
    loop {
        let batch = registry.search("", page, EXPORT_PAGE_SIZE).await?;
        let done = batch.entries.len() < EXPORT_PAGE_SIZE;
        entries.extend(batch.entries);
        if done {
            break;
        }
        page += 1;
    }
    entries.sort_by_key(|entry| entry.id);
    entries.dedup_by_key(|entry| entry.id);
    Ok(entries)
}

/// Largest window any backend can express; SQLite binds LIMIT/OFFSET as i64.
const MAX_WINDOW: usize = i64::MAX as usize;

/// Clamp caller-supplied paging to something a store can execute.
pub(crate) fn page_window(page: usize, page_size: usize) -> (usize, usize, usize) {
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_WINDOW);
    let offset = (page - 1).saturating_mul(page_size).min(MAX_WINDOW);
    (page, page_size, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(0, 0), (1, 1, 0));
        assert_eq!(page_window(3, 20), (3, 20, 40));
    }

    #[test]
    fn page_window_stays_within_i64() {
        let (_, size, offset) = page_window(usize::MAX / 2, 4);
        assert_eq!(size, 4);
        assert_eq!(offset, MAX_WINDOW);
        let (_, size, offset) = page_window(1, usize::MAX);
        assert_eq!((size, offset), (MAX_WINDOW, 0));
        assert!(i64::try_from(MAX_WINDOW).is_ok());
    }
}
