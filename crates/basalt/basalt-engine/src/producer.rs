use crate::correlator::{PendingReply, ReplyCorrelator, ReplyOutcome};
use crate::error::EngineError;
use crate::exchange::{Exchange, ReplyTicket};
use crate::registry::{Binding, ChannelRegistry};
use basalt_config::{ChannelConfig, WaitForTaskToComplete};
use basalt_events::{ExchangePattern, Message};
use std::sync::Arc;

/// Publishes messages onto one channel.
///
/// Dropping a producer releases its binding.
pub struct Producer {
    config: ChannelConfig,
    binding: Option<Binding>,
    registry: Arc<ChannelRegistry>,
    correlator: Arc<ReplyCorrelator>,
}

/// Result of [`Producer::send_async`].
pub enum PendingSend {
    /// Nobody is going to answer; holds the caller's own message.
    Done(Message),
    /// A consumer will answer, or the deadline will pass.
    Waiting {
        channel: String,
        reply: PendingReply,
    },
}

impl PendingSend {
    /// Blocks until the exchange completes.
    ///
    /// # Errors
    /// - [`EngineError::ReplyTimeout`] when no reply arrived in time
    /// - [`EngineError::Processing`] when the consumer failed
    pub fn wait(self) -> Result<Message, EngineError> {
        match self {
            PendingSend::Done(message) => Ok(message),
            PendingSend::Waiting { channel, reply } => {
                let id = reply.id();
                let timeout = reply.timeout();
                match reply.wait() {
                    ReplyOutcome::Completed(message) => Ok(message),
                    ReplyOutcome::Failed(reason) => Err(EngineError::Processing { reason }),
                    ReplyOutcome::TimedOut => Err(EngineError::ReplyTimeout {
                        channel,
                        id,
                        timeout,
                    }),
                }
            }
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, PendingSend::Waiting { .. })
    }
}

impl Producer {
    pub(crate) fn new(
        config: ChannelConfig,
        binding: Binding,
        registry: Arc<ChannelRegistry>,
        correlator: Arc<ReplyCorrelator>,
    ) -> Self {
        Self {
            config,
            binding: Some(binding),
            registry,
            correlator,
        }
    }

    pub fn channel(&self) -> &str {
        &self.config.name
    }

    /// Options this producer was resolved with.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.binding.is_none()
    }

    fn binding(&self) -> Result<&Binding, EngineError> {
        self.binding.as_ref().ok_or_else(|| EngineError::Closed {
            channel: self.config.name.clone(),
        })
    }

    /// Whether a send with `pattern` waits for the consumer.
    pub fn waits_for(&self, pattern: ExchangePattern) -> bool {
        match self.config.wait_for_task_to_complete {
            WaitForTaskToComplete::Always => true,
            WaitForTaskToComplete::Never => false,
            WaitForTaskToComplete::IfReplyExpected => pattern.expects_reply(),
        }
    }

    /// Publishes `message` and, when the wait policy says so, blocks for the
    /// reply. Without a wait the caller gets its own message back.
    pub fn send(&self, message: Message, pattern: ExchangePattern) -> Result<Message, EngineError> {
        self.send_async(message, pattern)?.wait()
    }

    /// Publishes `message` and returns a handle to wait on later.
    ///
    /// The publish itself still blocks on a full mailbox when
    /// `blockWhenFull=true`.
    pub fn send_async(
        &self,
        message: Message,
        pattern: ExchangePattern,
    ) -> Result<PendingSend, EngineError> {
        let mailbox = self.binding()?.reference().mailbox();

        if !self.waits_for(pattern) {
            mailbox.publish(Exchange::new(message.clone(), pattern, None))?;
            return Ok(PendingSend::Done(message));
        }

        let reply = self.correlator.register(message.id(), self.config.timeout)?;
        let expected = if mailbox.is_multicast() {
            mailbox.subscriptions()
        } else {
            1
        };
        let ticket = Arc::new(ReplyTicket::new(
            message.id(),
            expected,
            Arc::clone(&self.correlator),
        ));
        // On failure `reply` is dropped, which abandons the correlation.
        mailbox.publish(Exchange::new(message, pattern, Some(ticket)))?;

        Ok(PendingSend::Waiting {
            channel: self.config.name.clone(),
            reply,
        })
    }

    /// Free slots in the channel's mailbox.
    pub fn remaining_capacity(&self) -> Result<usize, EngineError> {
        Ok(self.binding()?.reference().mailbox().remaining_capacity())
    }

    /// Releases the binding. Later sends fail with [`EngineError::Closed`].
    pub fn close(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.registry.unbind(binding);
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.close();
    }
}
