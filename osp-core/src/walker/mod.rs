//! Walkers: mobile computations dispatched over the graph.
//!
//! A walker carries a queue of anchors to visit. Each dispatch cycle pops one
//! entry and runs at most one ability per side:
//!
//! 1. the node/edge-side ability registered for the visited type, keyed by
//!    the walker's type (see [`RegistryBuilder::on_arrival`]);
//! 2. the walker-side ability registered for the walker's type, keyed by the
//!    visited type (see [`RegistryBuilder::on_visit`]).
//!
//! Abilities steer the walker with [`Step::visit`] and stop it with
//! [`Step::disengage`]. Disengaging clears the queue and skips every
//! remaining ability, including the walker side of the current cycle.
//!
//! ## Example
//!
//! ```rust,ignore
//! use osp_core::walker::{Registry, VisitMode};
//!
//! let registry = Registry::builder()
//!     .declare("Tour", ArchetypeKind::Walker, None)
//!     .on_visit("Tour", "Node", |step| {
//!         step.report(step.here().to_string());
//!         let path = step.path();
//!         if !step.visit(path, VisitMode::DepthFirst)? {
//!             step.report("leaf");
//!         }
//!         Ok(())
//!     })
//!     .build();
//! ```

mod proptest;
mod registry;
mod scheduler;
mod step;

pub use registry::{Ability, Registry, RegistryBuilder, Side, TypeInfo};
pub use scheduler::spawn;
pub use step::{Step, VisitMode};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::anchor::{AnchorId, ArchetypeKind, Payload, WalkerStatus};
    use crate::error::Error;
    use crate::execution::ExecutionContext;
    use crate::memory::{MemoryHierarchy, ShelfStore};
    use crate::path::{Compare, Path};

    fn context(registry: Registry) -> ExecutionContext {
        let memory = MemoryHierarchy::fallback(Arc::new(ShelfStore::in_memory().unwrap()));
        ExecutionContext::open(memory, Arc::new(registry), None).unwrap()
    }

    /// Root → A, Root → B, A → C
    fn tree(ctx: &mut ExecutionContext) -> [AnchorId; 3] {
        let root = ctx.root();
        let a = ctx.create_node(Payload::new("Node").with_field("name", "A")).unwrap();
        let b = ctx.create_node(Payload::new("Node").with_field("name", "B")).unwrap();
        let c = ctx.create_node(Payload::new("Node").with_field("name", "C")).unwrap();
        ctx.connect(root, a, Payload::new("Edge"), true).unwrap();
        ctx.connect(root, b, Payload::new("Edge"), true).unwrap();
        ctx.connect(a, c, Payload::new("Edge"), true).unwrap();
        [a, b, c]
    }

    fn names(result: &Value) -> Vec<String> {
        result["reports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    fn follower(mode: VisitMode) -> Registry {
        Registry::builder()
            .declare("Follow", ArchetypeKind::Walker, None)
            .on_visit("Follow", "Node", move |step| {
                if let Some(Value::String(name)) = step.field("name")? {
                    step.report(name);
                }
                let path = step.path();
                step.visit(path, mode)?;
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_depth_first_order() {
        let mut ctx = context(follower(VisitMode::DepthFirst));
        tree(&mut ctx);

        let result = ctx.spawn_walker("Follow", Map::new(), None).unwrap();
        assert_eq!(names(&result), vec!["A", "C", "B"]);
        assert_eq!(result["status"], "done");
    }

    #[test]
    fn test_breadth_first_order() {
        let mut ctx = context(follower(VisitMode::BreadthFirst));
        tree(&mut ctx);

        let result = ctx.spawn_walker("Follow", Map::new(), None).unwrap();
        assert_eq!(names(&result), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_path_records_dispatch_order() {
        let mut ctx = context(follower(VisitMode::DepthFirst));
        let root = ctx.root();
        let [a, b, c] = tree(&mut ctx);

        let result = ctx.spawn_walker("Follow", Map::new(), None).unwrap();
        let expected: Vec<Value> = [root, a, c, b].iter().map(|id| json!(id.to_string())).collect();
        assert_eq!(result["path"], Value::Array(expected));
    }

    #[test]
    fn test_disengage_stops_queued_work() {
        let registry = Registry::builder()
            .declare("Stop", ArchetypeKind::Walker, None)
            .on_visit("Stop", "Root", |step| {
                let path = step.path();
                step.visit(path, VisitMode::BreadthFirst)?;
                Ok(())
            })
            .on_visit("Stop", "Node", |step| {
                step.report("ran");
                let path = step.path();
                step.visit(path, VisitMode::DepthFirst)?;
                step.disengage()
            })
            .build();
        let mut ctx = context(registry);
        tree(&mut ctx);

        let result = ctx.spawn_walker("Stop", Map::new(), None).unwrap();
        assert_eq!(result["reports"], json!(["ran"]));
        assert_eq!(result["status"], "disengaged");
    }

    #[test]
    fn test_disengage_on_target_side_skips_walker_side() {
        let walker_side_ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&walker_side_ran);
        let registry = Registry::builder()
            .declare("Probe", ArchetypeKind::Walker, None)
            .on_arrival("Root", "Probe", |step| step.disengage())
            .on_visit("Probe", "Root", move |_| {
                *flag.lock() = true;
                Ok(())
            })
            .build();
        let mut ctx = context(registry);

        let result = ctx.spawn_walker("Probe", Map::new(), None).unwrap();
        assert_eq!(result["status"], "disengaged");
        assert!(!*walker_side_ran.lock());
    }

    #[test]
    fn test_target_side_runs_before_walker_side() {
        let registry = Registry::builder()
            .declare("Probe", ArchetypeKind::Walker, None)
            .on_visit("Probe", "Root", |step| {
                step.report("walker");
                Ok(())
            })
            .on_arrival("Root", "Probe", |step| {
                step.report("root");
                Ok(())
            })
            .build();
        let mut ctx = context(registry);

        let result = ctx.spawn_walker("Probe", Map::new(), None).unwrap();
        assert_eq!(result["reports"], json!(["root", "walker"]));
    }

    #[test]
    fn test_empty_visit_is_false_once() {
        let registry = Registry::builder()
            .declare("Leaves", ArchetypeKind::Walker, None)
            .on_visit("Leaves", "Node", |step| {
                let path = step.path();
                if !step.visit(path, VisitMode::DepthFirst)? {
                    let name = step.field("name")?.unwrap_or(Value::Null);
                    step.report(name);
                }
                Ok(())
            })
            .build();
        let mut ctx = context(registry);
        tree(&mut ctx);

        let result = ctx.spawn_walker("Leaves", Map::new(), None).unwrap();
        assert_eq!(result["reports"], json!(["C", "B"]));
    }

    #[test]
    fn test_most_specific_ability_dispatched() {
        let registry = Registry::builder()
            .declare("Place", ArchetypeKind::Node, None)
            .declare("City", ArchetypeKind::Node, Some("Place"))
            .declare("Tour", ArchetypeKind::Walker, None)
            .on_visit("Tour", "Root", |step| {
                let path = step.path();
                step.visit(path, VisitMode::BreadthFirst)?;
                Ok(())
            })
            .on_visit("Tour", "Node", |step| {
                step.report("node");
                Ok(())
            })
            .on_visit("Tour", "Place", |step| {
                step.report("place");
                Ok(())
            })
            .build();
        let mut ctx = context(registry);
        let root = ctx.root();
        let city = ctx.create_node(Payload::new("City")).unwrap();
        let lake = ctx.create_node(Payload::new("Lake")).unwrap();
        ctx.connect(root, city, Payload::new("Edge"), true).unwrap();
        ctx.connect(root, lake, Payload::new("Edge"), true).unwrap();

        let result = ctx.spawn_walker("Tour", Map::new(), None).unwrap();
        assert_eq!(result["reports"], json!(["place", "node"]));
    }

    #[test]
    fn test_no_ability_is_not_an_error() {
        let registry = Registry::builder()
            .declare("Idle", ArchetypeKind::Walker, None)
            .build();
        let mut ctx = context(registry);

        let result = ctx.spawn_walker("Idle", Map::new(), None).unwrap();
        assert_eq!(result["status"], "done");
        assert_eq!(result["reports"], json!([]));
    }

    #[test]
    fn test_ignored_targets_are_skipped() {
        let registry = Registry::builder()
            .declare("Picky", ArchetypeKind::Walker, None)
            .on_visit("Picky", "Root", |step| {
                let skip = step.path().node_where("name", crate::path::Compare::Eq, "A");
                step.ignore(skip)?;
                let path = step.path();
                step.visit(path, VisitMode::BreadthFirst)?;
                Ok(())
            })
            .on_visit("Picky", "Node", |step| {
                let name = step.field("name")?.unwrap_or(Value::Null);
                step.report(name);
                Ok(())
            })
            .build();
        let mut ctx = context(registry);
        tree(&mut ctx);

        let result = ctx.spawn_walker("Picky", Map::new(), None).unwrap();
        assert_eq!(result["reports"], json!(["B"]));
    }

    #[test]
    fn test_unresolvable_target_is_fatal() {
        let registry = Registry::builder()
            .declare("Lost", ArchetypeKind::Walker, None)
            .on_visit("Lost", "Root", |step| {
                step.visit(AnchorId::new(), VisitMode::DepthFirst)?;
                Ok(())
            })
            .build();
        let mut ctx = context(registry);

        let err = ctx.spawn_walker("Lost", Map::new(), None).unwrap_err();
        assert!(matches!(err, Error::UnresolvableTarget { .. }));
    }

    #[test]
    fn test_destroyed_queue_entry_is_skipped() {
        let registry = Registry::builder()
            .declare("Prune", ArchetypeKind::Walker, None)
            .on_visit("Prune", "Root", |step| {
                let path = step.path();
                step.visit(path, VisitMode::BreadthFirst)?;
                Ok(())
            })
            .on_visit("Prune", "Node", |step| {
                let name = step.field("name")?.unwrap_or(Value::Null);
                step.report(name.clone());
                if name == "A" {
                    let root = step.context().root();
                    let sibling = Path::from(root).node_where("name", Compare::Eq, "B");
                    for id in step.context().resolve(sibling)? {
                        step.destroy(id)?;
                    }
                }
                Ok(())
            })
            .build();
        let mut ctx = context(registry);
        let root = ctx.root();
        let a = ctx.create_node(Payload::new("Node").with_field("name", "A")).unwrap();
        let b = ctx.create_node(Payload::new("Node").with_field("name", "B")).unwrap();
        ctx.connect(root, a, Payload::new("Edge"), true).unwrap();
        ctx.connect(root, b, Payload::new("Edge"), true).unwrap();
        ctx.commit().unwrap();

        let result = ctx.spawn_walker("Prune", Map::new(), None).unwrap();
        assert_eq!(result["status"], "done");
        assert_eq!(result["reports"], json!(["A"]));
        assert_eq!(result["path"], json!([root.to_string(), a.to_string()]));
        assert!(ctx.memory().shelf().get(&b).unwrap().is_none());
        assert!(ctx.find(&b).unwrap().is_none());
        assert!(ctx.find(&a).unwrap().is_some());
    }

    #[test]
    fn test_walker_fields_are_readable_and_writable() {
        let registry = Registry::builder()
            .declare("Counter", ArchetypeKind::Walker, None)
            .on_visit("Counter", "Node", |step| {
                let seen = step.walker_field("seen")?.and_then(|v| v.as_u64()).unwrap_or(0);
                step.set_walker_field("seen", seen + 1)?;
                let path = step.path();
                step.visit(path, VisitMode::DepthFirst)?;
                Ok(())
            })
            .build();
        let mut ctx = context(registry);
        tree(&mut ctx);

        let mut fields = Map::new();
        fields.insert("seen".into(), json!(10));
        let result = ctx.spawn_walker("Counter", fields, None).unwrap();
        // Root, A, C, B
        assert_eq!(result["fields"]["seen"], 14);
        assert_eq!(result["walker"], "Counter");
    }

    #[test]
    fn test_spawn_directly() {
        let mut ctx = context(follower(VisitMode::DepthFirst));
        let [a, _, c] = tree(&mut ctx);
        let walker = crate::anchor::Anchor::walker(Payload::new("Follow"), ctx.actor());
        let id = walker.id;
        ctx.memory_mut().insert(walker);

        let status = spawn(&mut ctx, id, a).unwrap();
        assert_eq!(status, WalkerStatus::Done);
        let state = ctx.memory().get(&id).unwrap().walker_state().unwrap();
        assert_eq!(state.path, vec![a, c]);
        assert!(state.queue.is_empty());
    }
}
