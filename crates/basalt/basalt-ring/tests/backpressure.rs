//! Multi-threaded backpressure tests for the ring mailbox.
//!
//! These run real publisher and consumer threads against one mailbox and
//! check the two overflow policies:
//!
//! ```text
//! [Publisher] --publish--> [RingMailbox (cap N)] --claim--> [Consumer]
//!                 ^                                  |
//!                 └────── parks while full ──────────┘
//! ```

use basalt_events::Message;
use basalt_ring::{MailboxError, MailboxSettings, OverflowPolicy, RingConfig, RingMailbox};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn mailbox(size: usize, overflow: OverflowPolicy) -> Arc<RingMailbox<Message>> {
    let ring = RingConfig::new(size).expect("valid size");
    Arc::new(RingMailbox::new(MailboxSettings::new(ring).overflow(overflow)))
}

/// Publishing capacity + 1 messages with no consumer parks the publisher
/// until a slot is claimed.
#[test]
fn blocking_publish_waits_for_a_claim() {
    let mb = mailbox(4, OverflowPolicy::Block);
    let sub = mb.subscribe().unwrap();
    for i in 0..4 {
        mb.publish(Message::new(format!("m{i}"))).unwrap();
    }

    let finished = Arc::new(AtomicBool::new(false));
    let publisher = {
        let mb = Arc::clone(&mb);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            mb.publish(Message::new("overflow")).unwrap();
            finished.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!finished.load(Ordering::SeqCst), "publish should still be parked");

    let first = mb.claim(sub).unwrap().unwrap();
    assert_eq!(first.body_str(), "m0");

    publisher.join().unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(mb.pending(), 4);
}

/// With the reject policy the (capacity + 1)-th publish fails straight away.
#[test]
fn reject_publish_fails_immediately() {
    let mb = mailbox(4, OverflowPolicy::Reject);
    for i in 0..4 {
        mb.publish(Message::new(format!("m{i}"))).unwrap();
    }
    assert_eq!(
        mb.publish(Message::new("overflow")),
        Err(MailboxError::Full { capacity: 4 })
    );
}

/// Closing the mailbox releases a publisher parked on a full ring.
#[test]
fn close_wakes_parked_publisher() {
    let mb = mailbox(1, OverflowPolicy::Block);
    mb.publish(Message::new("fill")).unwrap();

    let publisher = {
        let mb = Arc::clone(&mb);
        thread::spawn(move || mb.publish(Message::new("parked")))
    };

    thread::sleep(Duration::from_millis(50));
    mb.close();
    assert_eq!(publisher.join().unwrap(), Err(MailboxError::Closed));
}

/// Several producers and competing claimers: every message is claimed
/// exactly once and each producer's own messages stay in order.
#[test]
fn competing_claimers_see_each_message_once() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let mb = mailbox(16, OverflowPolicy::Block);
    let sub = mb.subscribe().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let msg = Message::new(format!("{i}"))
                        .with_header("producer", p.to_string());
                    mb.publish(msg).unwrap();
                }
            })
        })
        .collect();

    let claimers: Vec<_> = (0..3)
        .map(|_| {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(msg) = mb.claim_timeout(sub, Duration::from_millis(500)).unwrap() {
                    got.push(msg);
                }
                got
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let per_claimer: Vec<Vec<Message>> = claimers.into_iter().map(|c| c.join().unwrap()).collect();

    // Claims follow publish order, so within one claimer each producer's
    // sequence numbers must be increasing.
    for got in &per_claimer {
        for p in 0..PRODUCERS {
            let seq: Vec<usize> = got
                .iter()
                .filter(|m| m.header("producer") == Some(p.to_string().as_str()))
                .map(|m| m.body_str().parse().unwrap())
                .collect();
            assert!(seq.windows(2).all(|w| w[0] < w[1]), "producer {p} reordered");
        }
    }

    let mut ids: Vec<_> = per_claimer.iter().flatten().map(Message::id).collect();
    assert_eq!(ids.len(), PRODUCERS * PER_PRODUCER);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), PRODUCERS * PER_PRODUCER, "duplicate delivery");
}
