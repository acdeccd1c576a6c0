//! Tiered memory for anchors.
//!
//! Reads go top-down and promote what they find; writes go through the
//! permission-gated merge policy.
//!
//! - **Local cache**: per-context, authoritative during execution
//! - **Fast cache**: shared key-value tier (remote configuration)
//! - **Document store**: shared durable tier (remote configuration)
//! - **Shelf**: embedded SQLite file (fallback configuration)
//!
//! ## Example
//!
//! ```rust,ignore
//! use osp_core::memory::{MemoryHierarchy, ShelfStore};
//!
//! let shelf = Arc::new(ShelfStore::in_memory()?);
//! let mut memory = MemoryHierarchy::fallback(shelf);
//!
//! let node = Anchor::node(Payload::new("City"), memory.actor());
//! let id = node.id;
//! memory.insert(node);
//! memory.commit(None)?;
//!
//! let mut other = memory.fork();
//! assert!(other.find_by_id(&id)?.is_some());
//! ```

mod hierarchy;
mod local;
pub mod remote;
mod schema;
mod shelf;
mod tier;

pub use hierarchy::{CommitStats, MemoryHierarchy};
pub use local::LocalCache;
pub use shelf::ShelfStore;
pub use tier::{CacheTier, DocumentTier, InMemoryCache, InMemoryDocuments, RemoteTiers};
