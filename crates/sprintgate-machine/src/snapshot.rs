use serde::Serialize;
use sprintgate_core::{Role, State};

/// Read-only copy of the machine's state, published after every step.
///
/// `epoch` increments on every state entry, so two snapshots with the same
/// epoch describe the same stay in the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub role: Role,
    pub state: State,
    pub epoch: u64,
    pub state_change_time: u32,
    pub start_time: u32,
    pub measured_time: u32,
}

impl Snapshot {
    /// Snapshot of a unit that has not booted yet.
    pub fn unbooted(role: Role) -> Self {
        Self {
            role,
            state: State::Unknown,
            epoch: 0,
            state_change_time: 0,
            start_time: 0,
            measured_time: 0,
        }
    }
}
