use crate::correlator::ReplyCorrelator;
use basalt_events::{ExchangePattern, Message, MessageId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Error returned by an [`ExchangeHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Processes messages claimed by a consumer group.
///
/// `Ok(Some(reply))` answers a waiting producer with `reply`, `Ok(None)`
/// answers with the input message unchanged. Handlers are shared by every
/// worker thread of the group.
pub trait ExchangeHandler: Send + Sync + 'static {
    fn on_exchange(&self, message: &Message) -> Result<Option<Message>, HandlerError>;
}

impl<F> ExchangeHandler for F
where
    F: Fn(&Message) -> Result<Option<Message>, HandlerError> + Send + Sync + 'static,
{
    fn on_exchange(&self, message: &Message) -> Result<Option<Message>, HandlerError> {
        self(message)
    }
}

/// What actually sits in a mailbox slot: the message plus, for a producer
/// that waits, the ticket used to hand the result back.
#[derive(Clone)]
pub struct Exchange {
    message: Message,
    pattern: ExchangePattern,
    ticket: Option<Arc<ReplyTicket>>,
}

impl Exchange {
    pub(crate) fn new(
        message: Message,
        pattern: ExchangePattern,
        ticket: Option<Arc<ReplyTicket>>,
    ) -> Self {
        Self {
            message,
            pattern,
            ticket,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    /// True when a producer is blocked waiting for this exchange.
    pub fn has_waiter(&self) -> bool {
        self.ticket.is_some()
    }

    pub(crate) fn ticket(&self) -> Option<&Arc<ReplyTicket>> {
        self.ticket.as_ref()
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.message.id())
            .field("pattern", &self.pattern)
            .field("has_waiter", &self.has_waiter())
            .finish()
    }
}

/// Shared completion state of one correlated exchange.
///
/// On a multicast channel every consumer group gets a copy of the exchange
/// and the same ticket. The waiter is answered once: with the first failure,
/// or with the result of the group that brings `remaining` to zero.
pub(crate) struct ReplyTicket {
    id: MessageId,
    remaining: AtomicUsize,
    done: AtomicBool,
    correlator: Arc<ReplyCorrelator>,
}

impl ReplyTicket {
    pub(crate) fn new(id: MessageId, expected: usize, correlator: Arc<ReplyCorrelator>) -> Self {
        Self {
            id,
            remaining: AtomicUsize::new(expected.max(1)),
            done: AtomicBool::new(false),
            correlator,
        }
    }

    pub(crate) fn succeed(&self, reply: Message) {
        let last = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            == Ok(1);
        if last && !self.done.swap(true, Ordering::AcqRel) {
            self.correlator.complete(self.id, Ok(reply));
        }
    }

    pub(crate) fn fail(&self, reason: String) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.correlator.complete(self.id, Err(reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::ReplyOutcome;
    use std::time::Duration;

    #[test]
    fn closures_are_handlers() {
        let upper = |m: &Message| -> Result<Option<Message>, HandlerError> {
            Ok(Some(Message::reply_to(m, m.body_str().to_uppercase())))
        };
        let reply = upper.on_exchange(&Message::new("abc")).unwrap().unwrap();
        assert_eq!(reply.body_str(), "ABC");
    }

    #[test]
    fn ticket_completes_after_every_group() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let request = Message::new("req");
        let pending = correlator
            .register(request.id(), Duration::from_secs(5))
            .unwrap();
        let ticket = ReplyTicket::new(request.id(), 2, Arc::clone(&correlator));

        ticket.succeed(Message::reply_to(&request, "first"));
        assert_eq!(correlator.pending_count(), 1);
        ticket.succeed(Message::reply_to(&request, "second"));
        // A surplus completion is ignored.
        ticket.succeed(Message::reply_to(&request, "third"));

        match pending.wait() {
            ReplyOutcome::Completed(reply) => assert_eq!(reply.body_str(), "second"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn first_failure_wins() {
        let correlator = Arc::new(ReplyCorrelator::new());
        let request = Message::new("req");
        let pending = correlator
            .register(request.id(), Duration::from_secs(5))
            .unwrap();
        let ticket = ReplyTicket::new(request.id(), 2, Arc::clone(&correlator));

        ticket.fail("boom".into());
        ticket.succeed(Message::reply_to(&request, "late"));
        ticket.succeed(Message::reply_to(&request, "later"));

        assert_eq!(pending.wait(), ReplyOutcome::Failed("boom".into()));
        assert_eq!(correlator.stats().late_dropped, 0);
    }
}
