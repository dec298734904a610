//! Breakpoint conditions.
//!
//! A condition runs every time its breakpoint matches an event. It decides whether the event
//! pauses by returning a [`PauseReason`], and it may queue changes to the breakpoint set through
//! its [`ConditionContext`]; those are applied once every condition of the event has run.

use crate::debug::{
    breakpoints::{BreakpointId, BreakpointRequest},
    event::{DebugEvent, PauseReason},
    modules::ModuleRegistry,
    transport::DebugTransport,
};

/// Compare a breakpoint's hit count against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    /// Break when hit count equals the target.
    Equal(u64),
    /// Break when hit count is at least the target.
    AtLeast(u64),
    /// Break when hit count is greater than the target.
    GreaterThan(u64),
    /// Break on every n-th hit.
    MultipleOf(u64),
}

impl HitCondition {
    /// Check whether the hit condition is satisfied.
    #[must_use]
    pub fn is_met(self, hits: u64) -> bool {
        match self {
            HitCondition::Equal(target) => hits == target,
            HitCondition::AtLeast(target) => hits >= target,
            HitCondition::GreaterThan(target) => hits > target,
            HitCondition::MultipleOf(0) => false,
            HitCondition::MultipleOf(step) => hits % step == 0,
        }
    }
}

/// A change to the breakpoint set requested by a condition
#[derive(Debug)]
pub(crate) enum Deferred {
    Remove(BreakpointId),
    Add(BreakpointId, BreakpointRequest),
}

/// What a condition sees while it runs
pub struct ConditionContext<'a> {
    /// The breakpoint the condition belongs to
    pub id: BreakpointId,
    /// Hits of the breakpoint, this one included
    pub hits: u64,
    /// The event being dispatched
    pub event: &'a DebugEvent,
    /// The transport, for queries
    pub transport: &'a dyn DebugTransport,
    /// Loaded modules
    pub modules: &'a ModuleRegistry,
    pub(crate) commands: &'a mut Vec<Deferred>,
    pub(crate) next_id: &'a mut u64,
}

impl ConditionContext<'_> {
    /// Remove this breakpoint once the event is dispatched
    pub fn remove_self(&mut self) {
        self.commands.push(Deferred::Remove(self.id));
    }

    /// Remove breakpoint `id` once the event is dispatched
    pub fn remove(&mut self, id: BreakpointId) {
        self.commands.push(Deferred::Remove(id));
    }

    /// Add a breakpoint once the event is dispatched. The id is reserved right away.
    pub fn add(&mut self, request: BreakpointRequest) -> BreakpointId {
        *self.next_id += 1;
        let id = BreakpointId(*self.next_id);
        self.commands.push(Deferred::Add(id, request));
        id
    }
}

type ConditionFn = dyn FnMut(&mut ConditionContext<'_>) -> Option<PauseReason> + Send;

/// Decides whether a matching event pauses
pub struct BreakpointCondition(Box<ConditionFn>);

impl BreakpointCondition {
    /// A condition running `check`
    pub fn new<F>(check: F) -> Self
    where
        F: FnMut(&mut ConditionContext<'_>) -> Option<PauseReason> + Send + 'static,
    {
        BreakpointCondition(Box::new(check))
    }

    /// Pause with [`PauseReason::Breakpoint`] when `predicate` accepts the event
    pub fn when<F>(mut predicate: F) -> Self
    where
        F: FnMut(&DebugEvent) -> bool + Send + 'static,
    {
        Self::new(move |ctx| predicate(ctx.event).then_some(PauseReason::Breakpoint(ctx.id)))
    }

    /// Pause with [`PauseReason::Breakpoint`] when the hit count satisfies `condition`
    pub fn hit_count(condition: HitCondition) -> Self {
        Self::new(move |ctx| condition.is_met(ctx.hits).then_some(PauseReason::Breakpoint(ctx.id)))
    }

    /// Pause once, then remove the breakpoint
    pub fn one_shot() -> Self {
        Self::new(|ctx| {
            ctx.remove_self();
            Some(PauseReason::Breakpoint(ctx.id))
        })
    }

    pub(crate) fn check(&mut self, ctx: &mut ConditionContext<'_>) -> Option<PauseReason> {
        (self.0)(ctx)
    }
}

impl std::fmt::Debug for BreakpointCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BreakpointCondition(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_conditions() {
        assert!(HitCondition::Equal(3).is_met(3));
        assert!(!HitCondition::Equal(3).is_met(4));
        assert!(HitCondition::AtLeast(2).is_met(2));
        assert!(!HitCondition::GreaterThan(2).is_met(2));
        assert!(HitCondition::GreaterThan(2).is_met(3));
        assert!(HitCondition::MultipleOf(2).is_met(4));
        assert!(!HitCondition::MultipleOf(2).is_met(5));
        assert!(!HitCondition::MultipleOf(0).is_met(0));
    }
}
