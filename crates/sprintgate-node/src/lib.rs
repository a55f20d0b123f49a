//! Runtime for a timing-gate unit: queues, transport, peripherals, and the
//! task layout that ties the detector, state machine and watchdog together.
//!
//! [`runtime`] runs a unit on OS threads against real time; [`bench`] steps
//! a START/FINISH pair deterministically on a manual clock.

pub mod bench;
pub mod peripherals;
pub mod router;
pub mod runtime;
pub mod transport;

pub use bench::{Bench, BenchUnit, SprintScene};
pub use router::{Queue, Router, RouterReceivers, RouterStats};
pub use runtime::{NodeError, Peripherals, SnapshotCell, Unit, UnitHandle};
pub use transport::{Inbox, RadioLink, RadioMedium, Transport, TransportError};
