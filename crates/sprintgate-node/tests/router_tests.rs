use std::thread;
use std::time::Duration;

use sprintgate_core::config::{OverflowPolicy, RouterConfig};
use sprintgate_core::{Event, Message};
use sprintgate_node::{Queue, Router};

fn config(capacity: usize, overflow: OverflowPolicy) -> RouterConfig {
    RouterConfig { capacity, overflow }
}

#[test]
fn test_full_queue_drops_and_counts() {
    let (router, rx) = Router::new(&RouterConfig::default());
    for i in 0..10 {
        assert!(router.to_machine(Message::with_time(Event::ObjectLeft, i)));
    }
    assert!(!router.to_machine(Message::with_time(Event::ObjectLeft, 10)));

    let stats = router.stats();
    assert_eq!(stats.enqueued(Queue::Input), 10);
    assert_eq!(stats.dropped(Queue::Input), 1);
    assert_eq!(stats.dropped(Queue::Outbound), 0);

    // The survivors come out in order.
    let times: Vec<u32> = rx.input.try_iter().map(|m| m.time).collect();
    assert_eq!(times, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_queues_are_independent() {
    let (router, rx) = Router::new(&config(1, OverflowPolicy::default()));
    assert!(router.to_machine(Message::new(Event::Timeout)));
    assert!(router.to_peer(Message::new(Event::MessageInit)));
    assert!(!router.to_peer(Message::new(Event::MessageInit)));
    assert_eq!(rx.outbound.len(), 1);
    assert_eq!(rx.input.len(), 1);
}

#[test]
fn test_reset_goes_to_both_queues() {
    let (router, rx) = Router::new(&RouterConfig::default());
    router.reset_both();
    assert_eq!(rx.input.try_recv().ok(), Some(Message::new(Event::ButtonReset)));
    assert_eq!(rx.outbound.try_recv().ok(), Some(Message::new(Event::ButtonReset)));
}

#[test]
fn test_backoff_gives_up_after_max_attempts() {
    let policy = OverflowPolicy {
        backoff_events: vec![Event::ButtonReset],
        max_attempts: 3,
        backoff_ms: 1,
    };
    let (router, _rx) = Router::new(&config(1, policy));
    assert!(router.to_machine(Message::new(Event::ObjectLeft)));
    assert!(!router.to_machine(Message::new(Event::ButtonReset)));

    let stats = router.stats();
    assert_eq!(stats.retried(Queue::Input), 2);
    assert_eq!(stats.dropped(Queue::Input), 1);
}

#[test]
fn test_unlisted_event_is_not_retried() {
    let policy = OverflowPolicy {
        backoff_events: vec![Event::MessageFinish],
        max_attempts: 5,
        backoff_ms: 50,
    };
    let (router, _rx) = Router::new(&config(1, policy));
    router.to_peer(Message::new(Event::MessageInit));
    assert!(!router.to_peer(Message::new(Event::MessageInit)));
    assert_eq!(router.stats().retried(Queue::Outbound), 0);
}

#[test]
fn test_backoff_succeeds_once_consumer_catches_up() {
    let policy = OverflowPolicy {
        backoff_events: vec![Event::MessageFinish],
        max_attempts: 20,
        backoff_ms: 10,
    };
    let (router, rx) = Router::new(&config(1, policy));
    router.to_peer(Message::new(Event::MessageInit));

    let consumer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let first = rx.outbound.recv().ok();
        let second = rx.outbound.recv_timeout(Duration::from_secs(2)).ok();
        (first, second)
    });

    assert!(router.to_peer(Message::with_time(Event::MessageFinish, 4_000)));
    let (first, second) = consumer.join().unwrap();
    assert_eq!(first, Some(Message::new(Event::MessageInit)));
    assert_eq!(second, Some(Message::with_time(Event::MessageFinish, 4_000)));
    assert!(router.stats().retried(Queue::Outbound) >= 1);
    assert_eq!(router.stats().dropped(Queue::Outbound), 0);
}
