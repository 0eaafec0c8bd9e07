use strum::{Display, EnumString};

/// What `publish` does when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Park the publisher until a consumer frees a slot.
    #[default]
    Block,
    /// Fail the publish immediately with [`MailboxError::Full`](crate::MailboxError::Full).
    Reject,
}

impl OverflowPolicy {
    /// Maps the `blockWhenFull` channel option onto a policy.
    pub fn from_block_when_full(block_when_full: bool) -> Self {
        if block_when_full {
            OverflowPolicy::Block
        } else {
            OverflowPolicy::Reject
        }
    }
}

/// Declared producer concurrency for a mailbox.
///
/// Only a hint: the mailbox serialises publishers internally, so declaring
/// `Single` while publishing from several threads is still safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum ProducerType {
    Single,
    #[default]
    Multi,
}
