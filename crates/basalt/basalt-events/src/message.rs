#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// MessageId is the causal id carried by every message. Replies reuse the
// request's id as their correlation id so the waiting caller can be found.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether the sender of a message expects a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExchangePattern {
    /// Fire-and-forget.
    #[default]
    InOnly,
    /// Request/reply: the producer may wait for the consumer's result.
    InOut,
}

impl ExchangePattern {
    #[inline]
    pub fn expects_reply(self) -> bool {
        matches!(self, ExchangePattern::InOut)
    }
}

/// A message travelling through a channel.
///
/// The payload is opaque bytes; headers are plain string pairs. A message is
/// never mutated once it has been published, the builder-style methods below
/// consume `self` and are meant to be used before handing it to a producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    correlation_id: Option<MessageId>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            correlation_id: None,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Builds a reply to `request`: fresh id, correlated to the request.
    pub fn reply_to(request: &Message, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            correlation_id: Some(request.id),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, id: MessageId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn correlation_id(&self) -> Option<MessageId> {
        self.correlation_id
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Lossy UTF-8 view of the body, handy for logging and tests.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
