//! Bounded event router.
//!
//! Two fixed-capacity FIFO queues connect the tasks of a unit: the input
//! queue feeds the state machine, the outbound queue feeds the sender.
//! Producers never block. A full queue drops the message and logs it,
//! unless the overflow policy names the event for bounded retries.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use sprintgate_core::config::{OverflowPolicy, RouterConfig};
use sprintgate_core::{Event, Message};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    /// Into the local state machine.
    Input,
    /// Towards the peer unit.
    Outbound,
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Input => f.write_str("input"),
            Queue::Outbound => f.write_str("outbound"),
        }
    }
}

/// Cumulative counters for one queue.
#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicUsize,
    dropped: AtomicUsize,
    retried: AtomicUsize,
}

/// Enqueue and drop counts, shared by every clone of a [`Router`].
#[derive(Debug, Default)]
pub struct RouterStats {
    input: QueueCounters,
    outbound: QueueCounters,
}

impl RouterStats {
    fn counters(&self, queue: Queue) -> &QueueCounters {
        match queue {
            Queue::Input => &self.input,
            Queue::Outbound => &self.outbound,
        }
    }

    pub fn enqueued(&self, queue: Queue) -> usize {
        self.counters(queue).enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self, queue: Queue) -> usize {
        self.counters(queue).dropped.load(Ordering::Relaxed)
    }

    /// Attempts that found the queue full and backed off.
    pub fn retried(&self, queue: Queue) -> usize {
        self.counters(queue).retried.load(Ordering::Relaxed)
    }
}

/// Consuming ends of the two queues. Each has exactly one reader.
#[derive(Debug)]
pub struct RouterReceivers {
    pub input: Receiver<Message>,
    pub outbound: Receiver<Message>,
}

/// Producer side of the queues. Cheap to clone; every task that emits
/// events holds one.
#[derive(Debug, Clone)]
pub struct Router {
    input: Sender<Message>,
    outbound: Sender<Message>,
    policy: Arc<OverflowPolicy>,
    stats: Arc<RouterStats>,
}

impl Router {
    /// Create both queues. The receivers go to the machine and sender tasks.
    pub fn new(config: &RouterConfig) -> (Self, RouterReceivers) {
        let (input_tx, input_rx) = channel::bounded(config.capacity);
        let (outbound_tx, outbound_rx) = channel::bounded(config.capacity);
        let router = Self {
            input: input_tx,
            outbound: outbound_tx,
            policy: Arc::new(config.overflow.clone()),
            stats: Arc::new(RouterStats::default()),
        };
        let receivers = RouterReceivers {
            input: input_rx,
            outbound: outbound_rx,
        };
        (router, receivers)
    }

    /// Enqueue for the local state machine. Returns false if the message
    /// was dropped.
    pub fn to_machine(&self, message: Message) -> bool {
        self.enqueue(Queue::Input, message)
    }

    /// Enqueue for the peer. Returns false if the message was dropped.
    pub fn to_peer(&self, message: Message) -> bool {
        self.enqueue(Queue::Outbound, message)
    }

    /// A local reset goes to the peer as well as to this unit's machine.
    pub fn reset_both(&self) {
        let message = Message::new(Event::ButtonReset);
        self.to_peer(message);
        self.to_machine(message);
    }

    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    fn sender(&self, queue: Queue) -> &Sender<Message> {
        match queue {
            Queue::Input => &self.input,
            Queue::Outbound => &self.outbound,
        }
    }

    fn enqueue(&self, queue: Queue, message: Message) -> bool {
        let counters = self.stats.counters(queue);
        let attempts = if self.policy.backs_off(message.event) {
            self.policy.max_attempts.max(1)
        } else {
            1
        };

        let mut pending = message;
        for attempt in 1..=attempts {
            match self.sender(queue).try_send(pending) {
                Ok(()) => {
                    counters.enqueued.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(TrySendError::Full(rejected)) => {
                    if attempt < attempts {
                        counters.retried.fetch_add(1, Ordering::Relaxed);
                        warn!(%queue, event = %message.event, attempt, "queue full, backing off");
                        std::thread::sleep(Duration::from_millis(u64::from(
                            self.policy.backoff_ms,
                        )));
                    }
                    pending = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!(%queue, event = %message.event, "queue closed, message discarded");
                    return false;
                }
            }
        }

        counters.dropped.fetch_add(1, Ordering::Relaxed);
        error!(%queue, event = %message.event, "queue full, message dropped");
        false
    }
}
