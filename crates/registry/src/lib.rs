//! # Phone Matcher Registry
//!
//! The uniquely keyed set of known phone numbers, with first-writer-wins
//! owner attribution.
//!
//! ## Features
//!
//! - **Chunked bulk upsert**: duplicates are no-ops that keep the original owner
//! - **Anti-join** against a call-scoped scratch set, never loading the registry
//! - **Bounded handle pool** shared by every concurrent caller
//! - **Two backends**: in-memory (hash difference) and SQLite (temp-table join)
//!
//! ## Architecture
//!
//! ```text
//! caller ──> Registry trait
//!              │
//!              ├──> Pool::acquire()  (bounded, RAII release)
//!              │
//!              ├──> MemoryRegistry   HashMap lookup
//!              │
//!              └──> SqliteRegistry   CREATE TEMP TABLE scratch_*
//!                                    LEFT JOIN phone_numbers
//!                                    DROP TABLE (every exit path)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use phone_matcher_registry::{upsert, MemoryRegistry, PoolConfig, Registry};
//! use phone_matcher_protocol::{CanonicalPhone, OwnerId};
//!
//! #[tokio::main]
//! async fn main() -> phone_matcher_registry::Result<()> {
//!     let registry = MemoryRegistry::new(PoolConfig::default());
//!     let owner = OwnerId::new("admin").unwrap();
//!     let phones = vec![CanonicalPhone::parse("2345678901").unwrap()];
//!
//!     upsert(&registry, &phones, &owner, 10_000).await?;
//!     let unmatched = registry.anti_join(&phones).await?;
//!     assert!(unmatched.is_empty());
//!     Ok(())
//! }
//! ```

mod error;
mod memory;
mod pool;
mod registry;
mod scratch;
mod sqlite;

pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use pool::{Pool, PoolConfig, PoolSnapshot, PooledHandle, DEFAULT_POOL_SIZE, MAX_POOL_SIZE};
pub use registry::{export_all, upsert, Registry, DEFAULT_UPSERT_CHUNK};
pub use scratch::scratch_table_name;
pub use sqlite::SqliteRegistry;
