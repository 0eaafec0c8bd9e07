use crate::consumer::ConsumerGroup;
use crate::correlator::ReplyCorrelator;
use crate::error::EngineError;
use crate::exchange::ExchangeHandler;
use crate::producer::Producer;
use crate::registry::{ChannelRegistry, Role};
use basalt_config::{ChannelConfig, ComponentConfig};
use std::sync::Arc;
use tracing::debug;

/// Entry point: owns the channel registry and the reply correlator.
///
/// Each component is an isolated namespace of channels; two components never
/// share a mailbox even for equal names.
pub struct Component {
    defaults: ComponentConfig,
    registry: Arc<ChannelRegistry>,
    correlator: Arc<ReplyCorrelator>,
}

impl Component {
    pub fn new(defaults: ComponentConfig) -> Self {
        Self {
            defaults,
            registry: Arc::new(ChannelRegistry::new()),
            correlator: Arc::new(ReplyCorrelator::new()),
        }
    }

    /// Resolves a channel URI such as `disruptor:orders?size=2000`.
    ///
    /// Nothing is bound yet; configuration errors surface here.
    pub fn endpoint(&self, uri: &str) -> Result<Endpoint, EngineError> {
        let config = ChannelConfig::parse(uri, &self.defaults)?;
        debug!(uri, channel = %config.name, size = config.size(), "endpoint resolved");
        Ok(Endpoint {
            uri: uri.to_string(),
            config,
            registry: Arc::clone(&self.registry),
            correlator: Arc::clone(&self.correlator),
        })
    }

    pub fn defaults(&self) -> &ComponentConfig {
        &self.defaults
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &Arc<ReplyCorrelator> {
        &self.correlator
    }
}

impl Default for Component {
    fn default() -> Self {
        Self::new(ComponentConfig::default())
    }
}

/// A resolved channel URI.
pub struct Endpoint {
    uri: String,
    config: ChannelConfig,
    registry: Arc<ChannelRegistry>,
    correlator: Arc<ReplyCorrelator>,
}

impl Endpoint {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Options as resolved from the URI, before any existing channel
    /// settings are taken into account.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Binds a producer to the channel, creating the mailbox if needed.
    pub fn producer(&self) -> Result<Producer, EngineError> {
        let binding = self.registry.bind(&self.config, Role::Producer);
        Ok(Producer::new(
            self.config.clone(),
            binding,
            Arc::clone(&self.registry),
            Arc::clone(&self.correlator),
        ))
    }

    /// Binds and starts a consumer group running `handler`.
    ///
    /// # Errors
    /// [`EngineError::MultipleConsumersNotAllowed`] if the channel is not
    /// multicast and already has a consumer group.
    pub fn consumer<H: ExchangeHandler>(&self, handler: H) -> Result<ConsumerGroup, EngineError> {
        self.consumer_with(Arc::new(handler))
    }

    /// Like [`consumer`](Self::consumer) for an already shared handler.
    pub fn consumer_with(
        &self,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ConsumerGroup, EngineError> {
        let binding = self.registry.bind(&self.config, Role::Consumer);
        ConsumerGroup::start(
            Arc::clone(&self.registry),
            binding,
            handler,
            self.config.concurrent_consumers,
            self.config.wait_strategy,
        )
    }

    /// Realized mailbox capacity: the live channel's if it exists, otherwise
    /// what this endpoint would create.
    pub fn size(&self) -> usize {
        self.registry
            .capacity(&self.config.name)
            .unwrap_or_else(|| self.config.size())
    }

    pub fn remaining_capacity(&self) -> usize {
        match self.registry.get(&self.config.name) {
            Some(reference) => reference.mailbox().remaining_capacity(),
            None => self.config.size(),
        }
    }

    /// Messages buffered on the channel.
    pub fn pending_exchange_count(&self) -> usize {
        self.registry.pending(&self.config.name)
    }

    /// Producer + consumer bindings keeping the channel alive.
    pub fn endpoint_count(&self) -> usize {
        self.registry.endpoint_count(&self.config.name)
    }

    /// Whether the live channel fans out to every consumer group.
    pub fn is_multicast(&self) -> bool {
        self.registry
            .get(&self.config.name)
            .map_or(self.config.multiple_consumers, |r| {
                r.config().multiple_consumers
            })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("uri", &self.uri).finish()
    }
}
