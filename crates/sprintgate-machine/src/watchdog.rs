//! Deadline rules evaluated on a fixed tick against the latest snapshot.
//!
//! The watchdog never touches machine state. It reads a [`Snapshot`] and
//! answers with actions for the runtime: inject an event into the machine's
//! input queue, re-arm the detector, or send a message to the peer. Each
//! rule is latched on the snapshot epoch so it fires at most once per stay
//! in a state. A rule whose action the runtime could not enqueue is handed
//! back through [`Watchdog::retract`] and fires again on a later tick.

use sprintgate_core::clock::elapsed_since;
use sprintgate_core::config::TimingConfig;
use sprintgate_core::{Event, Message, Role, State};
use tracing::debug;

use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Enqueue into the local state machine.
    Inject(Message),
    /// Restart the local detector's measurement.
    Rearm,
    /// Enqueue for the peer.
    Send(Message),
}

#[derive(Debug, Clone, Copy, Default)]
struct Latch(Option<u64>);

impl Latch {
    /// True the first time it is asked about `epoch`.
    fn fire(&mut self, epoch: u64) -> bool {
        if self.0 == Some(epoch) {
            return false;
        }
        self.0 = Some(epoch);
        true
    }

    fn release(&mut self, epoch: u64) {
        if self.0 == Some(epoch) {
            self.0 = None;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    role: Role,
    timing: TimingConfig,
    confirm: Latch,
    rearm: Latch,
    timeout: Latch,
    ack: Latch,
    /// Epoch and time of the last MESSAGE_INIT broadcast.
    last_init: Option<(u64, u32)>,
}

impl Watchdog {
    pub fn new(role: Role, timing: &TimingConfig) -> Self {
        Self {
            role,
            timing: timing.clone(),
            confirm: Latch::default(),
            rearm: Latch::default(),
            timeout: Latch::default(),
            ack: Latch::default(),
            last_init: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Undo the latch behind `action` for `epoch`, after the runtime failed
    /// to enqueue it.
    pub fn retract(&mut self, action: &WatchdogAction, epoch: u64) {
        match action {
            WatchdogAction::Inject(message) => match message.event {
                Event::RunConfirmed => self.confirm.release(epoch),
                Event::Timeout => self.timeout.release(epoch),
                _ => {}
            },
            WatchdogAction::Send(message) => match message.event {
                Event::MessageAck => self.ack.release(epoch),
                Event::MessageInit => {
                    if matches!(self.last_init, Some((e, _)) if e == epoch) {
                        self.last_init = None;
                    }
                }
                _ => {}
            },
            WatchdogAction::Rearm => self.rearm.release(epoch),
        }
    }

    pub fn poll(&mut self, snap: &Snapshot, now: u32) -> Vec<WatchdogAction> {
        let mut out = Vec::new();
        let in_state = elapsed_since(now, snap.state_change_time);

        match (self.role, snap.state) {
            (Role::Start, State::RunCheck) => {
                if elapsed_since(now, snap.start_time) >= self.timing.confirmation_window_ms
                    && self.confirm.fire(snap.epoch)
                {
                    debug!(epoch = snap.epoch, "departure confirmed");
                    out.push(WatchdogAction::Inject(Message::new(Event::RunConfirmed)));
                }
            }
            (Role::Start, State::Start) => {
                let due = match self.last_init {
                    Some((epoch, at)) if epoch == snap.epoch => {
                        elapsed_since(now, at) >= self.timing.handshake_interval_ms
                    }
                    _ => true,
                };
                if due {
                    self.last_init = Some((snap.epoch, now));
                    out.push(WatchdogAction::Send(Message::new(Event::MessageInit)));
                }
            }
            (Role::Finish, State::Run) => {
                if in_state >= self.timing.rearm_delay_ms && self.rearm.fire(snap.epoch) {
                    debug!(epoch = snap.epoch, "re-arming detector");
                    out.push(WatchdogAction::Rearm);
                }
            }
            (Role::Finish, State::Ready) => {
                if in_state >= self.timing.ack_delay_ms && self.ack.fire(snap.epoch) {
                    out.push(WatchdogAction::Send(Message::new(Event::MessageAck)));
                }
            }
            _ => {}
        }

        if matches!(snap.state, State::Finish | State::SendError)
            && in_state >= self.timing.display_hold_ms
            && self.timeout.fire(snap.epoch)
        {
            debug!(epoch = snap.epoch, state = %snap.state, "display hold elapsed");
            out.push(WatchdogAction::Inject(Message::new(Event::Timeout)));
        }

        out
    }
}
