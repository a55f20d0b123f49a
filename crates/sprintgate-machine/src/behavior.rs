//! Per-role transition tables.
//!
//! START owns the run clock: it times the departure locally and the
//! arrival relayed by FINISH, so the two units never need synchronised
//! clocks. FINISH only mirrors the run on its display.

use std::fmt;

use sprintgate_core::clock::elapsed_since;
use sprintgate_core::{Event, Message, Role, State};
use tracing::info;

use crate::action::{Action, Screen};
use crate::role::RunTimers;

/// State-specific half of the machine. The cross-cutting rules (reset,
/// send failure) are applied by [`RoleMachine`](crate::RoleMachine) before
/// the table is consulted.
pub trait RoleBehavior: Send + fmt::Debug {
    fn role(&self) -> Role;

    /// Screen shown whenever the unit (re)enters `Start`.
    fn start_screen(&self) -> Screen;

    /// Look up `(state, message.event)`. Returns the next state (which may
    /// equal `state`), or `None` when the event is not valid in `state`.
    fn on_event(
        &self,
        state: State,
        message: Message,
        now: u32,
        timers: &mut RunTimers,
        actions: &mut Vec<Action>,
    ) -> Option<State>;
}

/// Re-arm after a hold period: back to `Start` to pair again.
fn rearm(screen: Screen, actions: &mut Vec<Action>) -> Option<State> {
    actions.push(Action::StopMeasuring);
    actions.push(Action::Present(screen));
    Some(State::Start)
}

// ── START ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct StartBehavior;

impl RoleBehavior for StartBehavior {
    fn role(&self) -> Role {
        Role::Start
    }

    fn start_screen(&self) -> Screen {
        Screen::Connecting
    }

    fn on_event(
        &self,
        state: State,
        message: Message,
        now: u32,
        timers: &mut RunTimers,
        actions: &mut Vec<Action>,
    ) -> Option<State> {
        match (state, message.event) {
            (State::Start, Event::MessageAck) => {
                actions.push(Action::StartMeasuring);
                actions.push(Action::Present(Screen::Zero));
                Some(State::Ready)
            }
            (State::Ready, Event::ObjectLeft) => {
                timers.start_time = now;
                Some(State::RunCheck)
            }
            (State::RunCheck, Event::ObjectArrived) => {
                info!(
                    after_ms = elapsed_since(now, timers.start_time),
                    "false start, back to ready"
                );
                Some(State::Ready)
            }
            (State::RunCheck, Event::RunConfirmed) => {
                let elapsed = elapsed_since(now, timers.start_time);
                actions.push(Action::StopMeasuring);
                actions.push(Action::Send(Message::with_time(
                    Event::RunConfirmed,
                    elapsed,
                )));
                actions.push(Action::Present(Screen::RunningSince(timers.start_time)));
                Some(State::Run)
            }
            (State::Run, Event::ObjectArrived) => {
                timers.measured_time = elapsed_since(now, timers.start_time);
                info!(measured_ms = timers.measured_time, "run finished");
                actions.push(Action::Send(Message::with_time(
                    Event::MessageFinish,
                    timers.measured_time,
                )));
                actions.push(Action::Present(Screen::Final(timers.measured_time)));
                Some(State::Finish)
            }
            (State::Finish | State::SendError, Event::Timeout) => {
                rearm(self.start_screen(), actions)
            }
            _ => None,
        }
    }
}

// ── FINISH ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct FinishBehavior;

impl RoleBehavior for FinishBehavior {
    fn role(&self) -> Role {
        Role::Finish
    }

    fn start_screen(&self) -> Screen {
        Screen::Idle
    }

    fn on_event(
        &self,
        state: State,
        message: Message,
        now: u32,
        timers: &mut RunTimers,
        actions: &mut Vec<Action>,
    ) -> Option<State> {
        match (state, message.event) {
            // The ACK itself goes out from the watchdog once the ack delay
            // has passed in Ready.
            (State::Start, Event::MessageInit) => {
                actions.push(Action::Present(Screen::Zero));
                Some(State::Ready)
            }
            (State::Ready, Event::RunConfirmed) => {
                // The peer reports how long ago the run started; project
                // that onto the local clock.
                timers.start_time = now.wrapping_sub(message.time);
                actions.push(Action::Present(Screen::RunningSince(timers.start_time)));
                Some(State::Run)
            }
            (State::Run, Event::ObjectArrived) => {
                actions.push(Action::StopMeasuring);
                actions.push(Action::Send(Message::new(Event::ObjectArrived)));
                Some(State::Run)
            }
            (State::Run, Event::MessageFinish) => {
                timers.measured_time = message.time;
                info!(measured_ms = timers.measured_time, "run finished");
                actions.push(Action::StopMeasuring);
                actions.push(Action::Present(Screen::Final(timers.measured_time)));
                Some(State::Finish)
            }
            (State::Finish | State::SendError, Event::Timeout) => {
                rearm(self.start_screen(), actions)
            }
            _ => None,
        }
    }
}
