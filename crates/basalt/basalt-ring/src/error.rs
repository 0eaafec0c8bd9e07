/// Errors raised while sizing a ring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    #[error("size found to be 0, must be greater than 0")]
    ZeroSize,

    #[error("size {requested} cannot be rounded up to a power of two")]
    TooLarge { requested: usize },
}

/// Errors raised by [`RingMailbox`](crate::RingMailbox) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("mailbox has been closed")]
    Closed,

    #[error("multiple consumers are not allowed on a mailbox without multicast")]
    MultipleConsumers,

    #[error("unknown subscription")]
    UnknownSubscription,
}
