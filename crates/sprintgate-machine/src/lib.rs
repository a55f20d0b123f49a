//! Role state machines and watchdog rules for a timing gate.
//!
//! - [`RoleMachine`]: the single coordinator of a unit
//! - [`RoleBehavior`]: per-role transition tables, chosen once at construction
//! - [`Action`]: everything the machine asks the runtime to do
//! - [`Snapshot`]: read-only view of state and run timers for other tasks
//! - [`Watchdog`]: deadline rules that turn elapsed time into events
//!
//! The machine is synchronous and performs no I/O: the runtime feeds it
//! messages with the current time and executes the returned actions.

pub mod action;
pub mod behavior;
pub mod role;
pub mod snapshot;
pub mod watchdog;

pub use action::{Action, Screen};
pub use behavior::{FinishBehavior, RoleBehavior, StartBehavior};
pub use role::{RoleMachine, RunTimers};
pub use snapshot::Snapshot;
pub use watchdog::{Watchdog, WatchdogAction};
