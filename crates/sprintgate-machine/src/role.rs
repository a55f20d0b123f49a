//! The role state machine: single owner of a unit's state and run timers.

use sprintgate_core::{Event, Message, Role, State};
use tracing::{debug, info, warn};

use crate::action::{Action, Screen};
use crate::behavior::{FinishBehavior, RoleBehavior, StartBehavior};
use crate::snapshot::Snapshot;

/// Local timestamps of the current run, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTimers {
    /// When the current state was entered.
    pub state_change_time: u32,
    /// Local time the run started.
    pub start_time: u32,
    /// Measured duration of the last finished run.
    pub measured_time: u32,
}

#[derive(Debug)]
pub struct RoleMachine {
    behavior: Box<dyn RoleBehavior>,
    state: State,
    epoch: u64,
    timers: RunTimers,
}

impl RoleMachine {
    pub fn new(role: Role) -> Self {
        let behavior: Box<dyn RoleBehavior> = match role {
            Role::Start => Box::new(StartBehavior),
            Role::Finish => Box::new(FinishBehavior),
        };
        Self::with_behavior(behavior)
    }

    pub fn with_behavior(behavior: Box<dyn RoleBehavior>) -> Self {
        Self {
            behavior,
            state: State::Unknown,
            epoch: 0,
            timers: RunTimers::default(),
        }
    }

    /// Enter `Start` with the detector stopped and the start screen shown.
    pub fn boot(&mut self, now: u32) -> Vec<Action> {
        self.enter(State::Start, now);
        vec![
            Action::StopMeasuring,
            Action::Present(self.behavior.start_screen()),
        ]
    }

    /// Process one message. Events that are not valid in the current state
    /// are ignored and produce no actions.
    pub fn handle(&mut self, message: Message, now: u32) -> Vec<Action> {
        let mut actions = Vec::new();

        match message.event {
            Event::ButtonReset => {
                info!(role = %self.role(), from = %self.state, "reset");
                actions.push(Action::StopMeasuring);
                actions.push(Action::Present(self.behavior.start_screen()));
                self.enter(State::Start, now);
                return actions;
            }
            Event::SendError => {
                match self.state {
                    // Only INIT is sent from Start and it repeats on its own,
                    // so a lost broadcast needs no error screen.
                    State::Unknown | State::Start | State::SendError => {
                        debug!(state = %self.state, "send failure outside a run, ignored");
                    }
                    _ => {
                        warn!(role = %self.role(), from = %self.state, "send failed, run aborted");
                        actions.push(Action::StopMeasuring);
                        actions.push(Action::Present(Screen::Error));
                        self.enter(State::SendError, now);
                    }
                }
                return actions;
            }
            _ => {}
        }

        match self
            .behavior
            .on_event(self.state, message, now, &mut self.timers, &mut actions)
        {
            Some(next) if next != self.state => self.enter(next, now),
            Some(_) => {}
            None => debug!(state = %self.state, event = %message.event, "event ignored"),
        }
        actions
    }

    fn enter(&mut self, next: State, now: u32) {
        info!(role = %self.role(), from = %self.state, to = %next, "transition");
        self.state = next;
        self.epoch += 1;
        self.timers.state_change_time = now;
    }

    pub fn role(&self) -> Role {
        self.behavior.role()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn timers(&self) -> RunTimers {
        self.timers
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            role: self.role(),
            state: self.state,
            epoch: self.epoch,
            state_change_time: self.timers.state_change_time,
            start_time: self.timers.start_time,
            measured_time: self.timers.measured_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_enters_start() {
        let mut machine = RoleMachine::new(Role::Start);
        assert_eq!(machine.state(), State::Unknown);
        let actions = machine.boot(7);
        assert_eq!(machine.state(), State::Start);
        assert_eq!(machine.epoch(), 1);
        assert_eq!(machine.timers().state_change_time, 7);
        assert_eq!(
            actions,
            vec![Action::StopMeasuring, Action::Present(Screen::Connecting)]
        );
    }

    #[test]
    fn test_finish_boot_shows_idle() {
        let mut machine = RoleMachine::new(Role::Finish);
        let actions = machine.boot(0);
        assert_eq!(actions[1], Action::Present(Screen::Idle));
    }

    #[test]
    fn test_ignored_event_keeps_epoch() {
        let mut machine = RoleMachine::new(Role::Start);
        machine.boot(0);
        let actions = machine.handle(Message::new(Event::ObjectLeft), 10);
        assert!(actions.is_empty());
        assert_eq!(machine.state(), State::Start);
        assert_eq!(machine.epoch(), 1);
    }

    #[test]
    fn test_send_error_ignored_during_handshake() {
        let mut machine = RoleMachine::new(Role::Start);
        machine.boot(0);
        assert!(machine.handle(Message::new(Event::SendError), 5).is_empty());
        assert_eq!(machine.state(), State::Start);
    }

    #[test]
    fn test_snapshot_mirrors_timers() {
        let mut machine = RoleMachine::new(Role::Start);
        machine.boot(0);
        machine.handle(Message::new(Event::MessageAck), 100);
        machine.handle(Message::new(Event::ObjectLeft), 400);
        let snap = machine.snapshot();
        assert_eq!(snap.state, State::RunCheck);
        assert_eq!(snap.start_time, 400);
        assert_eq!(snap.state_change_time, 400);
        assert_eq!(snap.epoch, 3);
    }
}
