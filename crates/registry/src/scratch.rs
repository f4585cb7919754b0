use std::sync::atomic::{AtomicU64, Ordering};

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Name for a call-scoped scratch key set. Unique within the process, so
/// concurrent anti-joins sharing pooled connections never collide.
#[must_use]
pub fn scratch_table_name() -> String {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("scratch_phones_{}_{seq}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| (0..500).map(|_| scratch_table_name()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(name.starts_with("scratch_phones_"));
                assert!(name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
                assert!(seen.insert(name), "duplicate scratch name");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }
}
