mod error;
mod mailbox;
mod policy;
mod ring;
mod wait;

pub use error::{MailboxError, RingError};
pub use mailbox::{MailboxSettings, RingMailbox, SubscriptionId};
pub use policy::{OverflowPolicy, ProducerType};
pub use ring::{RingConfig, seq_to_index};
pub use wait::WaitStrategy;
