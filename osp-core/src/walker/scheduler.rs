//! The dispatch loop.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::anchor::{AnchorId, ArchetypeKind, WalkerStatus, WALKER};
use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::walker::registry::Side;
use crate::walker::step::Step;

/// Run the walker anchored at `walker` from `start` until its queue drains
/// or it disengages.
///
/// Each cycle pops the front of the queue, skips it if ignored or destroyed
/// earlier in the session, and otherwise dispatches the most specific node/edge-side ability followed by
/// the most specific walker-side ability. A queue entry that exists in no
/// tier aborts the run with [`Error::UnresolvableTarget`].
pub fn spawn(
    ctx: &mut ExecutionContext,
    walker: AnchorId,
    start: AnchorId,
) -> Result<WalkerStatus> {
    let walker_type = match ctx.memory().get(&walker) {
        Some(anchor) if anchor.is_walker() => anchor.type_name().to_string(),
        Some(anchor) => return Err(Error::invalid_archetype(WALKER, anchor.type_name())),
        None => return Err(Error::NotFound(walker)),
    };
    {
        let state = ctx.walker_state_mut(walker)?;
        if state.status.is_terminal() {
            return Ok(state.status);
        }
        state.queue.push_back(start);
        state.status = WalkerStatus::Queued;
    }

    let registry = Arc::clone(ctx.registry());
    loop {
        let next = {
            let state = ctx.walker_state_mut(walker)?;
            if state.disengaged() {
                break;
            }
            state.queue.pop_front()
        };
        let Some(here) = next else {
            ctx.walker_state_mut(walker)?.status = WalkerStatus::Done;
            break;
        };
        if ctx.walker_state_mut(walker)?.ignores.contains(&here) {
            trace!(walker = %walker, here = %here, "ignored");
            continue;
        }
        // Destroyed earlier in this session, still stored until the next commit
        if ctx.memory().is_marked(&here) {
            trace!(walker = %walker, here = %here, "destroyed, skipped");
            continue;
        }

        let (here_type, here_kind) = match ctx.memory_mut().find_by_id(&here)? {
            Some(anchor) => (anchor.type_name().to_string(), anchor.archetype_kind()),
            None => return Err(Error::UnresolvableTarget { id: here }),
        };
        {
            let state = ctx.walker_state_mut(walker)?;
            state.status = WalkerStatus::Running;
            state.path.push(here);
        }

        for side in [Side::Target, Side::Walker] {
            let ability = registry.lookup(
                side,
                (&walker_type, ArchetypeKind::Walker),
                (&here_type, here_kind),
            );
            let Some(ability) = ability else {
                continue;
            };
            debug!(walker = %walker, here = %here, ?side, "dispatch");
            let mut step = Step::new(ctx, walker, &walker_type, here, &here_type);
            ability(&mut step)?;
            if ctx.walker_state_mut(walker)?.disengaged() {
                break;
            }
        }

        let state = ctx.walker_state_mut(walker)?;
        if !state.disengaged() {
            state.status = WalkerStatus::Queued;
        }
    }

    let status = ctx.walker_state_mut(walker)?.status;
    debug!(walker = %walker, %status, "walker finished");
    Ok(status)
}
