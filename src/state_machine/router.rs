//! Routing table and the driver that evaluates it
//!
//! Routing is data: an ordered list of `(from, guard, to)` rules. The driver
//! walks the table and returns the target of the first rule whose origin and
//! guard both match. Nothing here touches the state.

use super::state::{ConversationState, Phase};
use serde::{Deserialize, Serialize};

/// Observer cadence `K` and turn limit `N`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub observer_interval: u32,
    pub turn_limit: u32,
}

impl Limits {
    pub const DEFAULT_OBSERVER_INTERVAL: u32 = 3;
    pub const DEFAULT_TURN_LIMIT: u32 = 9;

    /// Both limits must be at least one
    pub fn new(observer_interval: u32, turn_limit: u32) -> Result<Self, String> {
        if observer_interval == 0 {
            return Err("observer interval must be at least 1".to_string());
        }
        if turn_limit == 0 {
            return Err("turn limit must be at least 1".to_string());
        }
        Ok(Self {
            observer_interval,
            turn_limit,
        })
    }

    /// Upper bound on the steps any error-free run takes to reach Terminal
    pub fn step_bound(&self) -> u32 {
        self.turn_limit + self.turn_limit.div_ceil(self.observer_interval) + 1
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            observer_interval: Self::DEFAULT_OBSERVER_INTERVAL,
            turn_limit: Self::DEFAULT_TURN_LIMIT,
        }
    }
}

/// Condition attached to a routing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    ErrorSet,
    TurnIsZero,
    OnObserverCadence,
    BelowTurnLimit,
    TurnLimitReached,
    Always,
}

impl Guard {
    fn holds(self, state: &ConversationState, limits: Limits) -> bool {
        let turn = state.turn_count();
        match self {
            Guard::ErrorSet => state.has_error(),
            Guard::TurnIsZero => turn == 0,
            Guard::OnObserverCadence => turn % limits.observer_interval == 0,
            Guard::BelowTurnLimit => turn < limits.turn_limit,
            Guard::TurnLimitReached => turn >= limits.turn_limit,
            Guard::Always => true,
        }
    }
}

/// `from == None` matches every phase
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub from: Option<Phase>,
    pub guard: Guard,
    pub to: Phase,
}

const fn rule(from: Option<Phase>, guard: Guard, to: Phase) -> Rule {
    Rule { from, guard, to }
}

/// Ordered routing rules; first match wins
pub static TRANSITION_TABLE: &[Rule] = &[
    rule(None, Guard::ErrorSet, Phase::Terminal),
    rule(Some(Phase::Init), Guard::Always, Phase::Student),
    rule(Some(Phase::Student), Guard::TurnIsZero, Phase::Student),
    rule(Some(Phase::Student), Guard::OnObserverCadence, Phase::Observer),
    rule(Some(Phase::Student), Guard::BelowTurnLimit, Phase::Teacher),
    rule(Some(Phase::Student), Guard::Always, Phase::Terminal),
    rule(Some(Phase::Teacher), Guard::OnObserverCadence, Phase::Observer),
    rule(Some(Phase::Teacher), Guard::BelowTurnLimit, Phase::Student),
    rule(Some(Phase::Teacher), Guard::Always, Phase::Terminal),
    rule(Some(Phase::Observer), Guard::TurnLimitReached, Phase::Terminal),
    rule(Some(Phase::Observer), Guard::Always, Phase::Student),
];

/// Evaluate `table` for a step that just finished in `from`
pub fn route(table: &[Rule], from: Phase, state: &ConversationState, limits: Limits) -> Phase {
    table
        .iter()
        .find(|r| r.from.map_or(true, |f| f == from) && r.guard.holds(state, limits))
        .map_or(Phase::Terminal, |r| r.to)
}

/// Next phase under the standard table
pub fn next_phase(from: Phase, state: &ConversationState, limits: Limits) -> Phase {
    let to = route(TRANSITION_TABLE, from, state, limits);
    tracing::debug!(
        from = %from,
        to = %to,
        turn = state.turn_count(),
        error = state.has_error(),
        "Routed"
    );
    to
}
