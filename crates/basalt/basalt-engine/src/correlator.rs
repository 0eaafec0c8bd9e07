//! Request/reply correlation with deadlines.
//!
//! ```text
//!   register(id, timeout) ──> PENDING ──complete(id)──> COMPLETED
//!                               │
//!                               ├──deadline elapsed──> TIMED_OUT
//!                               │
//!                               └──abandon / drop───> ABANDONED
//! ```
//!
//! Every terminal state is final. A reply that arrives once its waiter has
//! timed out or gone away has nowhere to go and is dropped; it is counted in
//! [`CorrelatorStats::late_dropped`] and never delivered anywhere else.

use crate::error::EngineError;
use basalt_events::{Message, MessageId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

type ReplyResult = Result<Message, String>;

/// Lifecycle state of a correlated exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Pending,
    Completed,
    TimedOut,
    Abandoned,
}

/// How a wait on a [`PendingReply`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Completed(Message),
    /// The consumer failed; the string is its error.
    Failed(String),
    TimedOut,
}

impl ReplyOutcome {
    pub fn state(&self) -> ReplyState {
        match self {
            ReplyOutcome::Completed(_) | ReplyOutcome::Failed(_) => ReplyState::Completed,
            ReplyOutcome::TimedOut => ReplyState::TimedOut,
        }
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub completed: u64,
    pub timed_out: u64,
    pub abandoned: u64,
    pub late_dropped: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    timed_out: AtomicU64,
    abandoned: AtomicU64,
    late_dropped: AtomicU64,
}

/// Matches replies to the callers waiting for them.
#[derive(Default)]
pub struct ReplyCorrelator {
    pending: Mutex<HashMap<MessageId, SyncSender<ReplyResult>>>,
    counters: Counters,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, SyncSender<ReplyResult>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts waiting for a reply to `id`, due within `timeout`.
    ///
    /// # Errors
    /// [`EngineError::DuplicateCorrelation`] if `id` already has a waiter.
    pub fn register(
        self: &Arc<Self>,
        id: MessageId,
        timeout: Duration,
    ) -> Result<PendingReply, EngineError> {
        let (tx, rx) = mpsc::sync_channel(1);
        {
            let mut pending = self.lock();
            if pending.contains_key(&id) {
                return Err(EngineError::DuplicateCorrelation { id });
            }
            pending.insert(id, tx);
        }
        Ok(PendingReply {
            id,
            timeout,
            deadline: Instant::now() + timeout,
            rx,
            correlator: Arc::clone(self),
        })
    }

    /// Hands `result` to the waiter of `id`.
    ///
    /// Returns `false` when nobody is waiting any more; the reply is dropped.
    pub fn complete(&self, id: MessageId, result: Result<Message, String>) -> bool {
        let mut pending = self.lock();
        match pending.remove(&id) {
            Some(tx) => {
                // Sent under the lock so a waiter that times out concurrently
                // finds either the entry or the reply, never neither.
                let _ = tx.send(result);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                drop(pending);
                self.counters.late_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "late reply dropped, no waiter");
                false
            }
        }
    }

    /// Detaches the waiter of `id` without a result.
    pub fn abandon(&self, id: MessageId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn is_pending(&self, id: MessageId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            late_dropped: self.counters.late_dropped.load(Ordering::Relaxed),
        }
    }

    fn expire(&self, id: MessageId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }
}

/// The caller's side of one correlated exchange.
///
/// Dropping it before a reply arrives abandons the exchange.
pub struct PendingReply {
    id: MessageId,
    timeout: Duration,
    deadline: Instant,
    rx: Receiver<ReplyResult>,
    correlator: Arc<ReplyCorrelator>,
}

impl PendingReply {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Blocks until the reply arrives or the deadline passes.
    pub fn wait(self) -> ReplyOutcome {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(result) => into_outcome(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                self.correlator.expire(self.id);
                // A reply sent just before we removed the entry is still
                // sitting in the channel.
                match self.rx.try_recv() {
                    Ok(result) => into_outcome(result),
                    Err(_) => {
                        debug!(correlation_id = %self.id, timeout = ?self.timeout, "reply timed out");
                        ReplyOutcome::TimedOut
                    }
                }
            }
        }
    }

    /// Non-blocking check; `None` while still pending.
    pub fn try_outcome(&self) -> Option<ReplyOutcome> {
        self.rx.try_recv().ok().map(into_outcome)
    }

    /// Gives up on the reply.
    pub fn abandon(self) {
        // Drop does the work.
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.abandon(self.id);
    }
}

fn into_outcome(result: ReplyResult) -> ReplyOutcome {
    match result {
        Ok(message) => ReplyOutcome::Completed(message),
        Err(reason) => ReplyOutcome::Failed(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn reply_reaches_waiter_once() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let request = Message::new("ping");
        let pending = correlator.register(request.id(), Duration::from_secs(5)).unwrap();

        let replier = {
            let correlator = Arc::clone(&correlator);
            let request = request.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                correlator.complete(request.id(), Ok(Message::reply_to(&request, "pong")))
            })
        };

        let outcome = pending.wait();
        assert!(replier.join().unwrap());
        match outcome {
            ReplyOutcome::Completed(reply) => {
                assert_eq!(reply.body_str(), "pong");
                assert_eq!(reply.correlation_id(), Some(request.id()));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // A second reply for the same id has no waiter.
        assert!(!correlator.complete(request.id(), Ok(Message::new("again"))));

        let stats = correlator.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.late_dropped, 1);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn deadline_yields_timeout_and_late_reply_is_dropped() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let id = MessageId::new();
        let pending = correlator.register(id, Duration::from_millis(30)).unwrap();

        let started = Instant::now();
        let outcome = pending.wait();
        assert_eq!(outcome, ReplyOutcome::TimedOut);
        assert_eq!(outcome.state(), ReplyState::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));

        assert!(!correlator.complete(id, Ok(Message::new("too late"))));
        let stats = correlator.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.late_dropped, 1);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn failure_is_distinct_from_timeout() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let id = MessageId::new();
        let pending = correlator.register(id, Duration::from_secs(5)).unwrap();
        correlator.complete(id, Err("handler exploded".into()));
        let outcome = pending.wait();
        assert_eq!(outcome, ReplyOutcome::Failed("handler exploded".into()));
        assert_eq!(outcome.state(), ReplyState::Completed);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let id = MessageId::new();
        let _first = correlator.register(id, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            correlator.register(id, Duration::from_secs(1)),
            Err(EngineError::DuplicateCorrelation { .. })
        ));
    }

    #[test]
    fn dropping_the_waiter_abandons() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let id = MessageId::new();
        let pending = correlator.register(id, Duration::from_secs(1)).unwrap();
        assert!(correlator.is_pending(id));
        assert_eq!(pending.try_outcome(), None);
        pending.abandon();

        assert!(!correlator.is_pending(id));
        assert_eq!(correlator.stats().abandoned, 1);
        assert!(!correlator.complete(id, Ok(Message::new("nobody home"))));
    }
}
