pub mod message;
pub use message::{ExchangePattern, Message, MessageId};
