//! Entity Lifecycle
//!
//! Shared by cluster nodes and service instances:
//! - Liveness phase: `Joining -> UP <-> {DOWN_1 -> DOWN_2 -> DOWN}`
//! - Departure phase: `Leaving -> Tombstone_1 -> Tombstone -> removed`
//! - Anti-entropy merge rule over `(state, timestamp)` pairs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a cluster node or service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Freshly announced, not yet probed
    Joining,
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN_1")]
    Down1,
    #[serde(rename = "DOWN_2")]
    Down2,
    #[serde(rename = "DOWN")]
    Down,
    /// Departure requested, waiting out the first dwell period
    Leaving,
    #[serde(rename = "Tombstone_1")]
    Tombstone1,
    Tombstone,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Joining => "Joining",
            State::Up => "UP",
            State::Down1 => "DOWN_1",
            State::Down2 => "DOWN_2",
            State::Down => "DOWN",
            State::Leaving => "Leaving",
            State::Tombstone1 => "Tombstone_1",
            State::Tombstone => "Tombstone",
        }
    }

    /// States driven by health checks.
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            State::Joining | State::Up | State::Down1 | State::Down2 | State::Down
        )
    }

    /// States reached only through an explicit departure.
    pub fn is_departing(&self) -> bool {
        !self.is_liveness()
    }

    /// Tombstones never accept another update.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Tombstone1 | State::Tombstone)
    }

    /// Next state after a health probe. Departure-phase states are returned
    /// unchanged.
    pub fn after_probe(self, reachable: bool) -> State {
        if self.is_departing() {
            return self;
        }
        if reachable {
            return State::Up;
        }
        match self {
            State::Joining | State::Up => State::Down1,
            State::Down1 => State::Down2,
            _ => State::Down,
        }
    }

    /// Next departure state for the sweep cycle, `None` once the entity is due
    /// for removal or is not departing at all.
    pub fn next_departure(self) -> Option<State> {
        match self {
            State::Leaving => Some(State::Tombstone1),
            State::Tombstone1 => Some(State::Tombstone),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counts of one merge batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub replaced: usize,
    pub ignored: usize,
}

/// Anything carrying a lifecycle state and its logical version clock.
pub trait Versioned {
    fn state(&self) -> State;
    fn timestamp(&self) -> u64;
}

/// Decides whether an incoming peer record replaces the local one.
///
/// Terminal local records are frozen. A departing local record only moves
/// further along the departure phase. Liveness updates win only with a strictly
/// newer timestamp, departure updates win regardless of timestamp.
pub fn should_replace<T: Versioned>(local: &T, incoming: &T) -> bool {
    if local.state().is_terminal() {
        return false;
    }
    if incoming.state().is_liveness() {
        !local.state().is_departing() && incoming.timestamp() > local.timestamp()
    } else {
        true
    }
}
