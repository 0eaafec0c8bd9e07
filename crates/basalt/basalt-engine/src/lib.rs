//! In-memory channel endpoints backed by bounded ring mailboxes.
//!
//! A [`Component`] owns the channel registry and the reply correlator.
//! Endpoints are resolved from URIs such as `disruptor:orders?size=2000`;
//! producers and consumer groups created from an endpoint bind to the named
//! channel, and the channel's mailbox lives exactly as long as at least one
//! binding does.
//!
//! ```no_run
//! use basalt_config::ComponentConfig;
//! use basalt_engine::{Component, HandlerError, ShutdownPolicy};
//! use basalt_events::{ExchangePattern, Message};
//!
//! let component = Component::new(ComponentConfig::default());
//! let endpoint = component.endpoint("disruptor:greetings?size=64").unwrap();
//!
//! let mut consumer = endpoint
//!     .consumer(|msg: &Message| -> Result<Option<Message>, HandlerError> {
//!         Ok(Some(Message::reply_to(msg, "hello back")))
//!     })
//!     .unwrap();
//! let producer = endpoint.producer().unwrap();
//!
//! let reply = producer.send(Message::new("hello"), ExchangePattern::InOut).unwrap();
//! assert_eq!(reply.body_str(), "hello back");
//!
//! consumer.stop(ShutdownPolicy::CompletePendingTasks);
//! ```

mod component;
mod consumer;
mod correlator;
mod error;
mod exchange;
mod producer;
mod registry;

pub use component::{Component, Endpoint};
pub use consumer::{ConsumerGroup, ShutdownPolicy};
pub use correlator::{CorrelatorStats, PendingReply, ReplyCorrelator, ReplyOutcome, ReplyState};
pub use error::EngineError;
pub use exchange::{Exchange, ExchangeHandler, HandlerError};
pub use producer::{PendingSend, Producer};
pub use registry::{Binding, ChannelReference, ChannelRegistry, Role};
