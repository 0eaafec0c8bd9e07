//! Bounded multi-producer, multi-consumer mailbox over a power-of-two ring.
//!
//! # Design
//! - **Publishers** append at a single monotonically increasing write cursor.
//!   When the ring is full they either park or fail, depending on the
//!   [`OverflowPolicy`].
//! - **Subscriptions** each own a read cursor. A subscription stands for one
//!   consumer group; any number of threads may claim through the same
//!   subscription and each message goes to exactly one of them.
//! - **Multicast** mailboxes accept many subscriptions and every subscription
//!   sees every message published while it is registered. Otherwise a second
//!   subscription is refused.
//!
//! A slot is released once every live cursor has moved past it. The oldest
//! unreleased sequence is the *floor*; `occupied = write_seq - floor`.
//!
//! ```text
//!          floor            cursor(B)      cursor(A)     write_seq
//!            │                  │              │              │
//!   ... ─────┼──────────────────┼──────────────┼──────────────┼───── ...
//!            │<──────────── occupied (≤ capacity) ───────────>│
//! ```
//!
//! When the last subscription leaves, the floor stays where it was so the
//! buffered messages are handed to the next subscriber, in publish order.
//! A new subscription joining a mailbox that already has subscribers starts
//! at the write cursor (tail-follow) and never sees earlier messages, with one
//! exception: multicast subscriptions that join before anything new has been
//! published also share the backlog left from the unsubscribed period.

use crate::error::MailboxError;
use crate::policy::{OverflowPolicy, ProducerType};
use crate::ring::{RingConfig, seq_to_index};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Handle for one consumer group's read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Settings fixed at mailbox creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSettings {
    pub ring: RingConfig,
    pub overflow: OverflowPolicy,
    pub multicast: bool,
    pub producer_type: ProducerType,
}

impl MailboxSettings {
    pub fn new(ring: RingConfig) -> Self {
        Self {
            ring,
            overflow: OverflowPolicy::default(),
            multicast: false,
            producer_type: ProducerType::default(),
        }
    }

    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn multicast(mut self, multicast: bool) -> Self {
        self.multicast = multicast;
        self
    }

    pub fn producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }
}

struct State<T> {
    slots: Box<[Option<T>]>,
    /// Sequence number of the next publish.
    write_seq: u64,
    /// Oldest sequence still held in a slot.
    floor: u64,
    cursors: BTreeMap<SubscriptionId, Cursor>,
    /// Write position when a subscription arrived on a mailbox with buffered
    /// messages and no subscribers. Cleared once it no longer matches.
    backlog_end: Option<u64>,
    next_subscription: u64,
    closed: bool,
}

impl<T> State<T> {
    #[inline]
    fn occupied(&self) -> usize {
        (self.write_seq - self.floor) as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Next sequence to claim.
    next: u64,
    /// A paused cursor claims nothing but still holds its slots.
    paused: bool,
}

/// Fixed-capacity ring of pending messages shared by producers and consumers.
///
/// # Type Parameter
/// - `T`: The element type. Must be `Clone` so multicast subscriptions can
///   each receive their own copy; non-multicast claims move the value out.
pub struct RingMailbox<T> {
    settings: MailboxSettings,
    mask: u64,
    state: Mutex<State<T>>,
    /// Signalled when slots are released.
    not_full: Condvar,
    /// Signalled on publish, unsubscribe and close.
    not_empty: Condvar,
}

impl<T: Clone> RingMailbox<T> {
    /// Creates an empty mailbox with `settings.ring.capacity` slots.
    pub fn new(settings: MailboxSettings) -> Self {
        let slots = (0..settings.ring.capacity).map(|_| None).collect();
        Self {
            mask: settings.ring.mask(),
            settings,
            state: Mutex::new(State {
                slots,
                write_seq: 0,
                floor: 0,
                cursors: BTreeMap::new(),
                backlog_end: None,
                next_subscription: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &MailboxSettings {
        &self.settings
    }

    /// Number of slots (always a power of 2).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.settings.ring.capacity
    }

    pub fn is_multicast(&self) -> bool {
        self.settings.multicast
    }

    /// Publishes according to the mailbox's overflow policy.
    ///
    /// With [`OverflowPolicy::Block`] this is the only call in the mailbox
    /// that may park the calling thread, and it parks until a slot is freed
    /// or the mailbox is closed. There is no timeout.
    ///
    /// # Errors
    /// - [`MailboxError::Full`] when full under [`OverflowPolicy::Reject`]
    /// - [`MailboxError::Closed`] once [`close`](Self::close) has been called
    pub fn publish(&self, value: T) -> Result<(), MailboxError> {
        match self.settings.overflow {
            OverflowPolicy::Reject => self.try_publish(value),
            OverflowPolicy::Block => {
                let mut state = self.lock();
                loop {
                    if state.closed {
                        return Err(MailboxError::Closed);
                    }
                    if state.occupied() < self.capacity() {
                        break;
                    }
                    state = self
                        .not_full
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                self.push(&mut state, value);
                Ok(())
            }
        }
    }

    /// Publishes without ever blocking, whatever the overflow policy.
    pub fn try_publish(&self, value: T) -> Result<(), MailboxError> {
        let mut state = self.lock();
        if state.closed {
            return Err(MailboxError::Closed);
        }
        if state.occupied() >= self.capacity() {
            return Err(MailboxError::Full {
                capacity: self.capacity(),
            });
        }
        self.push(&mut state, value);
        Ok(())
    }

    fn push(&self, state: &mut State<T>, value: T) {
        let idx = seq_to_index(state.write_seq, self.mask);
        state.slots[idx] = Some(value);
        state.write_seq += 1;
        self.not_empty.notify_all();
    }

    /// Registers a new read cursor.
    ///
    /// The first subscription (none other live) starts at the floor and so
    /// receives everything still buffered. A later multicast subscription
    /// starts at the floor too as long as nothing has been published since
    /// that first subscription, so every group attaching to a backlog gets
    /// the part of it not yet released. Otherwise it starts at the write
    /// cursor and only sees messages published from then on.
    ///
    /// # Errors
    /// - [`MailboxError::MultipleConsumers`] for a second subscription on a
    ///   non-multicast mailbox
    /// - [`MailboxError::Closed`] after close
    pub fn subscribe(&self) -> Result<SubscriptionId, MailboxError> {
        let mut state = self.lock();
        if state.closed {
            return Err(MailboxError::Closed);
        }
        if !self.settings.multicast && !state.cursors.is_empty() {
            return Err(MailboxError::MultipleConsumers);
        }
        let start = if state.cursors.is_empty() {
            state.backlog_end = (state.floor < state.write_seq).then_some(state.write_seq);
            state.floor
        } else if state.backlog_end == Some(state.write_seq) {
            state.floor
        } else {
            state.backlog_end = None;
            state.write_seq
        };
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.cursors.insert(
            id,
            Cursor {
                next: start,
                paused: false,
            },
        );
        Ok(id)
    }

    /// Drops a read cursor. Returns `false` if it was not registered.
    ///
    /// Messages the subscription had not claimed stay buffered when it was
    /// the last one; otherwise slots only it was holding are released.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let removed = state.cursors.remove(&id).is_some();
        if removed {
            self.release_consumed(&mut state);
            // Wake parked claimers so they notice the cursor is gone.
            self.not_empty.notify_all();
        }
        removed
    }

    /// Pauses or resumes claiming through `id`.
    ///
    /// A paused subscription keeps its position and keeps its slots occupied,
    /// so on a full ring publishers wait for it to resume.
    pub fn set_paused(&self, id: SubscriptionId, paused: bool) -> Result<(), MailboxError> {
        let mut state = self.lock();
        let cursor = state
            .cursors
            .get_mut(&id)
            .ok_or(MailboxError::UnknownSubscription)?;
        cursor.paused = paused;
        if !paused {
            self.not_empty.notify_all();
        }
        Ok(())
    }

    pub fn is_paused(&self, id: SubscriptionId) -> bool {
        self.lock().cursors.get(&id).is_some_and(|c| c.paused)
    }

    /// Claims the next message for `id` without blocking.
    ///
    /// # Returns
    /// - `Ok(Some(T))` the next message in publish order
    /// - `Ok(None)` if the subscription is caught up or paused
    ///
    /// # Errors
    /// - [`MailboxError::UnknownSubscription`] if `id` was unsubscribed
    /// - [`MailboxError::Closed`] once closed
    pub fn claim(&self, id: SubscriptionId) -> Result<Option<T>, MailboxError> {
        let mut state = self.lock();
        self.claim_locked(&mut state, id, u64::MAX)
    }

    /// Like [`claim`](Self::claim) but only hands out messages with a
    /// sequence below `limit`, as returned earlier by
    /// [`published`](Self::published).
    ///
    /// Used to drain what was buffered at a given moment while publishers
    /// keep going.
    pub fn claim_before(&self, id: SubscriptionId, limit: u64) -> Result<Option<T>, MailboxError> {
        let mut state = self.lock();
        self.claim_locked(&mut state, id, limit)
    }

    /// Claims the next message for `id`, waiting up to `timeout` for one.
    pub fn claim_timeout(
        &self,
        id: SubscriptionId,
        timeout: Duration,
    ) -> Result<Option<T>, MailboxError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(value) = self.claim_locked(&mut state, id, u64::MAX)? {
                return Ok(Some(value));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn claim_locked(
        &self,
        state: &mut State<T>,
        id: SubscriptionId,
        limit: u64,
    ) -> Result<Option<T>, MailboxError> {
        if state.closed {
            return Err(MailboxError::Closed);
        }
        let write_seq = state.write_seq;
        let cursor = state
            .cursors
            .get_mut(&id)
            .ok_or(MailboxError::UnknownSubscription)?;
        if cursor.paused || cursor.next >= write_seq.min(limit) {
            return Ok(None);
        }
        let seq = cursor.next;
        cursor.next += 1;

        let idx = seq_to_index(seq, self.mask);
        let value = if self.settings.multicast {
            state.slots[idx].clone()
        } else {
            state.slots[idx].take()
        };
        self.release_consumed(state);
        Ok(value)
    }

    /// Moves the floor up to the slowest live cursor, freeing slots.
    fn release_consumed(&self, state: &mut State<T>) {
        let Some(min) = state.cursors.values().map(|c| c.next).min() else {
            return;
        };
        if min <= state.floor {
            return;
        }
        for seq in state.floor..min {
            let idx = seq_to_index(seq, self.mask);
            state.slots[idx] = None;
        }
        state.floor = min;
        self.not_full.notify_all();
    }

    /// Closes the mailbox. Parked publishers and claimers are woken and fail
    /// with [`MailboxError::Closed`]; buffered messages stay until drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Removes and returns every buffered message, oldest first.
    ///
    /// All cursors are moved to the write position.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        let mut out = Vec::with_capacity(state.occupied());
        for seq in state.floor..state.write_seq {
            let idx = seq_to_index(seq, self.mask);
            if let Some(value) = state.slots[idx].take() {
                out.push(value);
            }
        }
        let write_seq = state.write_seq;
        state.floor = write_seq;
        for cursor in state.cursors.values_mut() {
            cursor.next = write_seq;
        }
        self.not_full.notify_all();
        out
    }

    /// Total number of messages ever published.
    pub fn published(&self) -> u64 {
        self.lock().write_seq
    }

    /// Number of messages whose slots have been released.
    pub fn released(&self) -> u64 {
        self.lock().floor
    }

    /// Occupied slots: `published - released`.
    pub fn pending(&self) -> usize {
        self.lock().occupied()
    }

    /// Messages `id` has yet to claim, or `None` if it is not registered.
    pub fn pending_for(&self, id: SubscriptionId) -> Option<usize> {
        let state = self.lock();
        state
            .cursors
            .get(&id)
            .map(|cursor| (state.write_seq - cursor.next) as usize)
    }

    /// Always `capacity - occupied`.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.pending()
    }

    /// Number of live subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.lock().cursors.len()
    }
}
