use crate::error::MailboxError;
use crate::mailbox::{RingMailbox, SubscriptionId};
use std::thread;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};

const SLEEP_BACKOFF: Duration = Duration::from_micros(100);

/// How an idle consumer waits for the next message.
///
/// All strategies deliver the same messages in the same order; they only
/// trade CPU for wake-up latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum WaitStrategy {
    /// Park on the mailbox's condition variable.
    #[default]
    Blocking,
    /// Poll, sleeping briefly between attempts.
    Sleeping,
    /// Poll, yielding the thread between attempts.
    Yielding,
    /// Poll in a tight spin loop.
    BusySpin,
}

impl WaitStrategy {
    /// Claims the next message for `id`, giving up after `timeout`.
    pub fn claim<T: Clone>(
        self,
        mailbox: &RingMailbox<T>,
        id: SubscriptionId,
        timeout: Duration,
    ) -> Result<Option<T>, MailboxError> {
        if self == WaitStrategy::Blocking {
            return mailbox.claim_timeout(id, timeout);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = mailbox.claim(id)? {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            match self {
                WaitStrategy::Blocking | WaitStrategy::Sleeping => thread::sleep(SLEEP_BACKOFF),
                WaitStrategy::Yielding => thread::yield_now(),
                WaitStrategy::BusySpin => std::hint::spin_loop(),
            }
        }
    }
}
