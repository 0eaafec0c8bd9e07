//! Reference-counted channel registry.
//!
//! Each channel name maps to one [`ChannelReference`], which owns the ring
//! mailbox shared by every producer and consumer group bound to that name.
//! The mailbox is created by the first bind, using that caller's settings,
//! and discarded with whatever it still buffers when the last binding goes.
//! Binding again afterwards starts from a fresh, empty mailbox.
//!
//! All mutations happen under the registry lock, so binds and unbinds racing
//! from different threads always observe a consistent count.

use crate::consumer::GroupState;
use crate::exchange::Exchange;
use basalt_config::ChannelConfig;
use basalt_ring::RingMailbox;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{info, warn};

/// What a binding stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Shared state of one named channel.
pub struct ChannelReference {
    config: ChannelConfig,
    mailbox: Arc<RingMailbox<Exchange>>,
    producers: AtomicUsize,
    consumers: AtomicUsize,
    /// Consumer groups currently attached. Weak so the registry never keeps
    /// a stopped group alive; groups deregister explicitly on stop.
    groups: Mutex<Vec<Weak<GroupState>>>,
}

impl ChannelReference {
    fn new(config: ChannelConfig) -> Self {
        let mailbox = Arc::new(RingMailbox::new(config.mailbox_settings()));
        Self {
            config,
            mailbox,
            producers: AtomicUsize::new(0),
            consumers: AtomicUsize::new(0),
            groups: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Settings the mailbox was created with (the first binder's).
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn mailbox(&self) -> &Arc<RingMailbox<Exchange>> {
        &self.mailbox
    }

    fn counter(&self, role: Role) -> &AtomicUsize {
        match role {
            Role::Producer => &self.producers,
            Role::Consumer => &self.consumers,
        }
    }

    pub fn producer_count(&self) -> usize {
        self.producers.load(Ordering::Acquire)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::Acquire)
    }

    /// Active producer + consumer bindings.
    pub fn endpoint_count(&self) -> usize {
        self.producer_count() + self.consumer_count()
    }

    fn groups(&self) -> MutexGuard<'_, Vec<Weak<GroupState>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register_group(&self, group: &Arc<GroupState>) {
        let mut groups = self.groups();
        groups.retain(|g| g.strong_count() > 0);
        groups.push(Arc::downgrade(group));
    }

    pub(crate) fn deregister_group(&self, group: &Arc<GroupState>) {
        self.groups()
            .retain(|g| g.strong_count() > 0 && !std::ptr::eq(g.as_ptr(), Arc::as_ptr(group)));
    }

    /// Number of consumer groups currently attached.
    pub fn consumer_groups(&self) -> usize {
        self.groups().iter().filter(|g| g.strong_count() > 0).count()
    }
}

/// A live producer or consumer binding. Hand it back to
/// [`ChannelRegistry::unbind`] to release it.
pub struct Binding {
    id: u64,
    role: Role,
    reference: Arc<ChannelReference>,
}

impl Binding {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn reference(&self) -> &Arc<ChannelReference> {
        &self.reference
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("channel", &self.name())
            .finish()
    }
}

/// Registry of named channels, owned by a [`Component`](crate::Component).
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<ChannelReference>>>,
    next_binding: AtomicU64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ChannelReference>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds to `config.name`, creating the mailbox if this is the first
    /// binding. Conflicting settings on later binds are ignored.
    pub fn bind(&self, config: &ChannelConfig, role: Role) -> Binding {
        let mut channels = self.lock();
        let reference = match channels.get(&config.name) {
            Some(existing) => {
                let current = existing.config();
                if current.size() != config.size()
                    || current.multiple_consumers != config.multiple_consumers
                    || current.block_when_full != config.block_when_full
                {
                    warn!(
                        channel = %config.name,
                        size = current.size(),
                        requested_size = config.size(),
                        multiple_consumers = current.multiple_consumers,
                        requested_multiple_consumers = config.multiple_consumers,
                        "channel already exists, keeping its settings"
                    );
                }
                Arc::clone(existing)
            }
            None => {
                let reference = Arc::new(ChannelReference::new(config.clone()));
                info!(
                    channel = %config.name,
                    size = config.size(),
                    requested_size = config.ring.requested,
                    multiple_consumers = config.multiple_consumers,
                    block_when_full = config.block_when_full,
                    producer_type = %config.producer_type,
                    "channel mailbox created"
                );
                channels.insert(config.name.clone(), Arc::clone(&reference));
                reference
            }
        };
        reference.counter(role).fetch_add(1, Ordering::AcqRel);

        Binding {
            id: self.next_binding.fetch_add(1, Ordering::Relaxed),
            role,
            reference,
        }
    }

    /// Releases `binding`. Returns how many bindings remain on the channel;
    /// at zero the mailbox is closed and its buffered messages discarded.
    pub fn unbind(&self, binding: Binding) -> usize {
        let mut channels = self.lock();
        let reference = binding.reference;
        reference.counter(binding.role).fetch_sub(1, Ordering::AcqRel);
        let remaining = reference.endpoint_count();
        if remaining > 0 {
            return remaining;
        }

        let is_current = channels
            .get(reference.name())
            .is_some_and(|current| Arc::ptr_eq(current, &reference));
        if is_current {
            channels.remove(reference.name());
        }
        drop(channels);

        reference.mailbox.close();
        let discarded = reference.mailbox.drain();
        for exchange in &discarded {
            if let Some(ticket) = exchange.ticket() {
                ticket.fail(format!("channel '{}' was shut down", reference.name()));
            }
        }
        info!(
            channel = %reference.name(),
            discarded = discarded.len(),
            "channel mailbox discarded"
        );
        0
    }

    pub fn get(&self, name: &str) -> Option<Arc<ChannelReference>> {
        self.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Active producer + consumer bindings on `name`; 0 if unknown.
    pub fn endpoint_count(&self, name: &str) -> usize {
        self.lock()
            .get(name)
            .map_or(0, |reference| reference.endpoint_count())
    }

    /// Messages buffered on `name`; 0 if unknown.
    pub fn pending(&self, name: &str) -> usize {
        self.get(name).map_or(0, |r| r.mailbox.pending())
    }

    /// Realized capacity of `name`, if the channel exists.
    pub fn capacity(&self, name: &str) -> Option<usize> {
        self.get(name).map(|r| r.mailbox.capacity())
    }

    /// Consumer groups attached to `name`.
    pub fn consumer_groups(&self, name: &str) -> usize {
        self.get(name).map_or(0, |r| r.consumer_groups())
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
