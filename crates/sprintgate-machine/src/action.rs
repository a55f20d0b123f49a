use serde::Serialize;
use sprintgate_core::Message;

/// What the display should show. Rendering cadence is the display's
/// concern; the machine only requests a mode at transition boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Idle,
    Zero,
    /// Live running time counted from the given local timestamp.
    RunningSince(u32),
    /// Final measured time in milliseconds.
    Final(u32),
    Connecting,
    Error,
}

/// Output of one state-machine step, executed by the runtime in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Enqueue a message for the peer.
    Send(Message),
    /// (Re)start the local detector.
    StartMeasuring,
    /// Stop the local detector.
    StopMeasuring,
    Present(Screen),
}
