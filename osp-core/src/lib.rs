//! # osp-core
//!
//! An object-spatial execution engine: walkers traverse a persistent graph of
//! nodes and edges, dispatching type-matched abilities at every stop, while a
//! tiered memory hierarchy keeps the graph in sync with shared storage.
//!
//! ## Core Components
//!
//! - **Anchors**: identity, access and persistence around nodes, edges, walkers
//! - **Path**: filtered, ordered edge references over adjacency lists
//! - **Walker**: the registry of abilities and the dispatch loop
//! - **Memory**: local cache over a remote cache + document store, or a shelf
//! - **Execution**: one explicit context per request, with `spawn_walker`
//!
//! ## Example
//!
//! ```rust,ignore
//! use osp_core::{ExecutionContext, MemoryConfig, MemoryHierarchy, Registry, VisitMode};
//!
//! let registry = Registry::builder()
//!     .declare("Census", ArchetypeKind::Walker, None)
//!     .on_visit("Census", "Node", |step| {
//!         if let Some(pop) = step.field("population")? {
//!             step.report(pop);
//!         }
//!         let path = step.path();
//!         step.visit(path, VisitMode::BreadthFirst)?;
//!         Ok(())
//!     })
//!     .build();
//!
//! let memory = MemoryHierarchy::connect(&MemoryConfig::from_env()?)?;
//! let mut ctx = ExecutionContext::open(memory, Arc::new(registry), None)?;
//! let result = ctx.spawn_walker("Census", Map::new(), None)?;
//! ```

// Self-alias for derive macro support within the crate
extern crate self as osp_core;

pub mod anchor;
pub mod config;
pub mod error;
pub mod execution;
pub mod memory;
pub mod path;
pub mod walker;

pub use anchor::{
    Access, AccessLevel, AccessOracle, Anchor, AnchorId, AnchorKind, Archetype, ArchetypeKind,
    LevelOracle, Payload, StoredRecord, WalkerState, WalkerStatus,
};
pub use config::MemoryConfig;
pub use error::{Error, Result};
pub use execution::ExecutionContext;
pub use memory::{
    CacheTier, CommitStats, DocumentTier, InMemoryCache, InMemoryDocuments, LocalCache,
    MemoryHierarchy, RemoteTiers, ShelfStore,
};
pub use path::{Compare, Direction, FieldFilter, Path, Targets, Traversal};
pub use walker::{Ability, Registry, RegistryBuilder, Step, VisitMode};

// Re-export derive macro
pub use osp_core_derive::Archetype;
