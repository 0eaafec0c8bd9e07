//! Consumer groups: worker threads competing for one mailbox subscription.
//!
//! ```text
//!                       ┌──> [basalt-orders-0] ──┐
//! [RingMailbox] ──sub──>├──> [basalt-orders-1] ──┼──> handler ──> reply ticket
//!                       └──> [basalt-orders-2] ──┘
//! ```
//!
//! Each message claimed through the group's subscription goes to exactly one
//! worker. Multicast channels hold one subscription per group, so every group
//! sees every message.

use crate::error::EngineError;
use crate::exchange::{Exchange, ExchangeHandler, HandlerError};
use crate::registry::{Binding, ChannelRegistry};
use basalt_ring::{MailboxError, RingMailbox, SubscriptionId, WaitStrategy};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an idle worker waits before re-checking its run flags.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What `stop` does with messages that are already buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Finish in-flight messages, then stop. Buffered messages stay in the
    /// mailbox for the next consumer.
    Immediate,
    /// Process everything buffered for this group before stopping.
    #[default]
    CompletePendingTasks,
}

/// State shared between a group handle and its workers.
pub(crate) struct GroupState {
    running: AtomicBool,
    draining: AtomicBool,
    /// Write sequence recorded by a graceful stop; the drain ends there.
    drain_until: AtomicU64,
    suspended: Mutex<bool>,
    resumed: Condvar,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl GroupState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            draining: AtomicBool::new(false),
            drain_until: AtomicU64::new(u64::MAX),
            suspended: Mutex::new(false),
            resumed: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_suspended(&self, value: bool) {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) = value;
        self.resumed.notify_all();
    }

    /// Parks while suspended. Returns `false` if the group stopped meanwhile.
    fn wait_while_suspended(&self) -> bool {
        let mut suspended = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        while *suspended && self.is_running() {
            let (guard, _) = self
                .resumed
                .wait_timeout(suspended, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner);
            suspended = guard;
        }
        self.is_running()
    }
}

/// A running consumer group bound to one channel.
///
/// Dropping a group stops it with [`ShutdownPolicy::Immediate`].
pub struct ConsumerGroup {
    channel: String,
    concurrent_consumers: usize,
    state: Arc<GroupState>,
    mailbox: Arc<RingMailbox<Exchange>>,
    subscription: SubscriptionId,
    workers: Vec<JoinHandle<()>>,
    binding: Option<Binding>,
    registry: Arc<ChannelRegistry>,
}

impl std::fmt::Debug for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroup")
            .field("channel", &self.channel)
            .field("concurrent_consumers", &self.concurrent_consumers)
            .finish_non_exhaustive()
    }
}

impl ConsumerGroup {
    /// Subscribes to the binding's mailbox and spawns the workers.
    ///
    /// # Errors
    /// [`EngineError::MultipleConsumersNotAllowed`] when the channel is not
    /// multicast and another group is already consuming. The binding is
    /// released on every error path.
    pub(crate) fn start(
        registry: Arc<ChannelRegistry>,
        binding: Binding,
        handler: Arc<dyn ExchangeHandler>,
        concurrent_consumers: usize,
        wait_strategy: WaitStrategy,
    ) -> Result<Self, EngineError> {
        let reference = Arc::clone(binding.reference());
        let channel = reference.name().to_string();
        let mailbox = Arc::clone(reference.mailbox());

        let subscription = match mailbox.subscribe() {
            Ok(subscription) => subscription,
            Err(err) => {
                registry.unbind(binding);
                return Err(match err {
                    MailboxError::MultipleConsumers => {
                        EngineError::MultipleConsumersNotAllowed { channel }
                    }
                    other => other.into(),
                });
            }
        };

        let state = Arc::new(GroupState::new());
        reference.register_group(&state);

        let mut group = Self {
            channel,
            concurrent_consumers,
            state,
            mailbox,
            subscription,
            workers: Vec::with_capacity(concurrent_consumers),
            binding: Some(binding),
            registry,
        };

        for n in 0..concurrent_consumers {
            let worker = Worker {
                channel: group.channel.clone(),
                state: Arc::clone(&group.state),
                mailbox: Arc::clone(&group.mailbox),
                subscription,
                handler: Arc::clone(&handler),
                wait_strategy,
            };
            let spawned = thread::Builder::new()
                .name(format!("basalt-{}-{n}", group.channel))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => group.workers.push(handle),
                Err(source) => {
                    let channel = group.channel.clone();
                    group.stop(ShutdownPolicy::Immediate);
                    return Err(EngineError::Spawn { channel, source });
                }
            }
        }

        info!(
            channel = %group.channel,
            concurrent_consumers,
            wait_strategy = %wait_strategy,
            "consumer group started"
        );
        Ok(group)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn concurrent_consumers(&self) -> usize {
        self.concurrent_consumers
    }

    pub fn is_running(&self) -> bool {
        self.binding.is_some()
    }

    /// Stops claiming. Buffered messages stay put and the group stays bound.
    pub fn suspend(&self) {
        if !self.is_running() {
            return;
        }
        // Pause the cursor first so a worker parked inside a claim cannot
        // pick up one more message after this returns.
        self.set_paused(true);
        self.state.set_suspended(true);
        debug!(channel = %self.channel, "consumer group suspended");
    }

    /// Continues from where the group left off.
    pub fn resume(&self) {
        if !self.is_running() {
            return;
        }
        self.state.set_suspended(false);
        self.set_paused(false);
        debug!(channel = %self.channel, "consumer group resumed");
    }

    fn set_paused(&self, paused: bool) {
        if let Err(err) = self.mailbox.set_paused(self.subscription, paused) {
            warn!(channel = %self.channel, paused, error = %err, "could not update subscription");
        }
    }

    pub fn is_suspended(&self) -> bool {
        *self
            .state
            .suspended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages completed successfully.
    pub fn processed(&self) -> u64 {
        self.state.processed.load(Ordering::Acquire)
    }

    /// Messages whose handler failed.
    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::Acquire)
    }

    /// Messages currently inside a handler.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Messages buffered that this group has not claimed yet.
    pub fn backlog(&self) -> usize {
        self.mailbox.pending_for(self.subscription).unwrap_or(0)
    }

    /// Stops the workers, unsubscribes and releases the binding.
    ///
    /// With [`ShutdownPolicy::CompletePendingTasks`] the group processes what
    /// was buffered when `stop` was called; messages published afterwards are
    /// left in the mailbox. Calling it again is a no-op.
    pub fn stop(&mut self, policy: ShutdownPolicy) {
        let Some(binding) = self.binding.take() else {
            return;
        };

        match policy {
            ShutdownPolicy::CompletePendingTasks => {
                self.state
                    .drain_until
                    .store(self.mailbox.published(), Ordering::Release);
                self.state.draining.store(true, Ordering::Release);
                // A suspended group cannot drain.
                self.set_paused(false);
                self.state.set_suspended(false);
            }
            ShutdownPolicy::Immediate => {
                self.state.running.store(false, Ordering::Release);
                self.state.set_suspended(false);
                // Wakes workers parked in a claim; they see the cursor gone.
                self.mailbox.unsubscribe(self.subscription);
            }
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(channel = %self.channel, "consumer worker panicked");
            }
        }
        self.state.running.store(false, Ordering::Release);
        self.mailbox.unsubscribe(self.subscription);
        binding.reference().deregister_group(&self.state);

        info!(
            channel = %self.channel,
            ?policy,
            processed = self.processed(),
            failed = self.failed(),
            left_buffered = self.mailbox.pending(),
            "consumer group stopped"
        );
        self.registry.unbind(binding);
    }
}

impl Drop for ConsumerGroup {
    fn drop(&mut self) {
        self.stop(ShutdownPolicy::Immediate);
    }
}

struct Worker {
    channel: String,
    state: Arc<GroupState>,
    mailbox: Arc<RingMailbox<Exchange>>,
    subscription: SubscriptionId,
    handler: Arc<dyn ExchangeHandler>,
    wait_strategy: WaitStrategy,
}

impl Worker {
    fn run(self) {
        while self.state.wait_while_suspended() {
            let draining = self.state.draining.load(Ordering::Acquire);
            let claimed = if draining {
                let limit = self.state.drain_until.load(Ordering::Acquire);
                self.mailbox.claim_before(self.subscription, limit)
            } else {
                self.wait_strategy
                    .claim(&self.mailbox, self.subscription, POLL_INTERVAL)
            };
            match claimed {
                Ok(Some(exchange)) => self.process(exchange),
                Ok(None) if draining => break,
                Ok(None) => {}
                Err(MailboxError::Closed | MailboxError::UnknownSubscription) => break,
                Err(err) => {
                    warn!(channel = %self.channel, error = %err, "claim failed, worker exiting");
                    break;
                }
            }
        }
    }

    fn process(&self, exchange: Exchange) {
        self.state.in_flight.fetch_add(1, Ordering::AcqRel);
        let message = exchange.message();
        let result = catch_unwind(AssertUnwindSafe(|| self.handler.on_exchange(message)))
            .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));

        match result {
            Ok(reply) => {
                self.state.processed.fetch_add(1, Ordering::AcqRel);
                if let Some(ticket) = exchange.ticket() {
                    ticket.succeed(reply.unwrap_or_else(|| message.clone()));
                }
            }
            Err(err) => {
                self.state.failed.fetch_add(1, Ordering::AcqRel);
                warn!(
                    channel = %self.channel,
                    message_id = %message.id(),
                    error = %err,
                    "exchange processing failed"
                );
                if let Some(ticket) = exchange.ticket() {
                    ticket.fail(err.to_string());
                }
            }
        }
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
