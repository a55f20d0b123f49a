pub mod clock;
pub mod config;
pub mod types;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GateConfig;
pub use types::{Event, MacAddr, Message, Role, State};
