//! Handler-side view of one dispatch.

use serde_json::Value;
use tracing::debug;

use crate::anchor::{AnchorId, Archetype, Payload};
use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::path::{Path, Targets};

/// Where `visit` puts new targets in the walker's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitMode {
    /// Front of the queue: go there next
    #[default]
    DepthFirst,
    /// Back of the queue: go there after everything already queued
    BreadthFirst,
}

/// Context handed to an [`Ability`](crate::walker::Ability).
///
/// Gives access to the anchor being visited ("here"), the walker, its queue,
/// and the execution context the walker runs in.
pub struct Step<'a> {
    ctx: &'a mut ExecutionContext,
    walker: AnchorId,
    walker_type: &'a str,
    here: AnchorId,
    here_type: &'a str,
}

impl<'a> Step<'a> {
    pub(crate) fn new(
        ctx: &'a mut ExecutionContext,
        walker: AnchorId,
        walker_type: &'a str,
        here: AnchorId,
        here_type: &'a str,
    ) -> Self {
        Self {
            ctx,
            walker,
            walker_type,
            here,
            here_type,
        }
    }

    /// Anchor being visited.
    pub fn here(&self) -> AnchorId {
        self.here
    }

    pub fn here_type(&self) -> &str {
        self.here_type
    }

    /// The visiting walker's anchor.
    pub fn walker(&self) -> AnchorId {
        self.walker
    }

    pub fn walker_type(&self) -> &str {
        self.walker_type
    }

    /// The execution context, for anything not covered by a shortcut here.
    pub fn context(&mut self) -> &mut ExecutionContext {
        self.ctx
    }

    // ==================== Fields ====================

    pub fn field(&mut self, name: &str) -> Result<Option<Value>> {
        self.ctx.field(self.here, name)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ctx.set_field(self.here, name, value)
    }

    pub fn walker_field(&mut self, name: &str) -> Result<Option<Value>> {
        self.ctx.field(self.walker, name)
    }

    pub fn set_walker_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ctx.set_field(self.walker, name, value)
    }

    /// Typed view of the visited anchor's payload.
    pub fn here_as<T: Archetype>(&mut self) -> Result<T> {
        self.ctx.load(self.here)
    }

    /// Typed view of the walker's payload.
    pub fn walker_as<T: Archetype>(&mut self) -> Result<T> {
        self.ctx.load(self.walker)
    }

    // ==================== Traversal ====================

    /// A one-hop outgoing path rooted at the visited anchor.
    pub fn path(&self) -> Path {
        Path::from(self.here)
    }

    /// Queue `targets` for this walker.
    ///
    /// Returns `false` when nothing was queued: the targets resolved to an
    /// empty set, every target is ignored, or the walker already disengaged.
    pub fn visit(&mut self, targets: impl Into<Targets>, mode: VisitMode) -> Result<bool> {
        let ids = self.ctx.resolve(targets)?;
        let walker = self.walker;
        let state = self.ctx.walker_state_mut(walker)?;
        if state.disengaged() {
            debug!(walker = %walker, "visit after disengage ignored");
            return Ok(false);
        }

        let ids: Vec<AnchorId> = ids.into_iter().filter(|id| !state.ignores.contains(id)).collect();
        if ids.is_empty() {
            return Ok(false);
        }
        match mode {
            VisitMode::DepthFirst => {
                for id in ids.into_iter().rev() {
                    state.queue.push_front(id);
                }
            }
            VisitMode::BreadthFirst => state.queue.extend(ids),
        }
        Ok(true)
    }

    /// Stop the whole traversal: no further handler runs for this walker.
    pub fn disengage(&mut self) -> Result<()> {
        let walker = self.walker;
        self.ctx.walker_state_mut(walker)?.disengage();
        debug!(walker = %walker, here = %self.here, "disengaged");
        Ok(())
    }

    pub fn is_disengaged(&mut self) -> Result<bool> {
        let walker = self.walker;
        Ok(self.ctx.walker_state_mut(walker)?.disengaged())
    }

    /// Never dispatch this walker at `targets`, even if they are queued.
    pub fn ignore(&mut self, targets: impl Into<Targets>) -> Result<()> {
        let ids = self.ctx.resolve(targets)?;
        let walker = self.walker;
        self.ctx.walker_state_mut(walker)?.ignores.extend(ids);
        Ok(())
    }

    /// Add a value to the spawn result's reports.
    pub fn report(&mut self, value: impl Into<Value>) {
        self.ctx.report(value);
    }

    // ==================== Graph mutation ====================

    pub fn create_node(&mut self, payload: Payload) -> Result<AnchorId> {
        self.ctx.create_node(payload)
    }

    pub fn connect(
        &mut self,
        source: AnchorId,
        target: AnchorId,
        edge: Payload,
        directed: bool,
    ) -> Result<AnchorId> {
        self.ctx.connect(source, target, edge, directed)
    }

    pub fn destroy(&mut self, id: AnchorId) -> Result<()> {
        if id == self.walker {
            return Err(Error::Internal("a walker cannot destroy itself".into()));
        }
        self.ctx.destroy(id)
    }

    pub fn assign(
        &mut self,
        targets: impl Into<Targets>,
        fields: &[(&str, Value)],
    ) -> Result<usize> {
        self.ctx.assign(targets, fields)
    }
}
