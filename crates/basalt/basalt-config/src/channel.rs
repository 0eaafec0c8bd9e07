//! Channel URIs.
//!
//! A channel is addressed as `disruptor:<name>?<option>=<value>&...`. The
//! scheme is optional; options the URI leaves out are taken from the
//! [`ComponentConfig`]. Every configuration problem is reported here, when the
//! endpoint is resolved, never later at publish time.
//!
//! | Option | Meaning |
//! |---|---|
//! | `size` | requested capacity, rounded up to a power of two |
//! | `blockWhenFull` | park producers on a full mailbox instead of failing |
//! | `multipleConsumers` | multicast fan-out to every consumer group |
//! | `concurrentConsumers` | worker threads per consumer group |
//! | `waitForTaskToComplete` | `Always`, `Never` or `IfReplyExpected` |
//! | `timeout` | reply deadline in milliseconds |
//! | `producerType` | `Single` or `Multi` |
//! | `waitStrategy` | `Blocking`, `Sleeping`, `Yielding` or `BusySpin` |

use crate::config::{ComponentConfig, ConfigError};
use basalt_ring::{MailboxSettings, OverflowPolicy, ProducerType, RingConfig, WaitStrategy};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};

pub const SCHEME: &str = "disruptor";

/// Whether a producer waits for consumers to finish with its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum WaitForTaskToComplete {
    Always,
    Never,
    #[default]
    IfReplyExpected,
}

/// Fully resolved options of one channel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub name: String,
    pub ring: RingConfig,
    pub block_when_full: bool,
    pub multiple_consumers: bool,
    pub concurrent_consumers: usize,
    pub wait_for_task_to_complete: WaitForTaskToComplete,
    pub timeout: Duration,
    pub producer_type: ProducerType,
    pub wait_strategy: WaitStrategy,
}

impl ChannelConfig {
    /// Resolves `uri` against the component defaults.
    ///
    /// # Errors
    /// - [`ConfigError::Size`] for `size=0` ("size found to be 0, must be greater than 0")
    /// - [`ConfigError::UnknownOption`] / [`ConfigError::InvalidValue`] for bad options
    /// - [`ConfigError::ZeroConcurrentConsumers`] for `concurrentConsumers=0`
    pub fn parse(uri: &str, defaults: &ComponentConfig) -> Result<Self, ConfigError> {
        let rest = match uri.split_once(':') {
            Some((scheme, rest)) if scheme == SCHEME => rest,
            Some((scheme, _)) => {
                return Err(ConfigError::UnknownScheme {
                    scheme: scheme.to_string(),
                    uri: uri.to_string(),
                });
            }
            None => uri,
        };
        let rest = rest.trim_start_matches("//");
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        if name.is_empty() {
            return Err(ConfigError::EmptyName {
                uri: uri.to_string(),
            });
        }

        let mut size = defaults.buffer_size;
        let mut block_when_full = defaults.block_when_full;
        let mut multiple_consumers = defaults.multiple_consumers;
        let mut concurrent_consumers = defaults.concurrent_consumers;
        let mut wait_for_task_to_complete = WaitForTaskToComplete::default();
        let mut timeout_ms = defaults.timeout_ms;
        let mut producer_type = defaults.producer_type;
        let mut wait_strategy = defaults.wait_strategy;

        let mut seen = HashSet::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateOption {
                    key: key.to_string(),
                });
            }
            match key {
                "size" => size = parse_value(key, value)?,
                "blockWhenFull" => block_when_full = parse_value(key, value)?,
                "multipleConsumers" => multiple_consumers = parse_value(key, value)?,
                "concurrentConsumers" => concurrent_consumers = parse_value(key, value)?,
                "waitForTaskToComplete" => wait_for_task_to_complete = parse_value(key, value)?,
                "timeout" => timeout_ms = parse_value(key, value)?,
                "producerType" => producer_type = parse_value(key, value)?,
                "waitStrategy" => wait_strategy = parse_value(key, value)?,
                _ => {
                    return Err(ConfigError::UnknownOption {
                        key: key.to_string(),
                    });
                }
            }
        }

        let ring = RingConfig::new(size)?;
        if concurrent_consumers == 0 {
            return Err(ConfigError::ZeroConcurrentConsumers);
        }

        Ok(Self {
            name: name.to_string(),
            ring,
            block_when_full,
            multiple_consumers,
            concurrent_consumers,
            wait_for_task_to_complete,
            timeout: Duration::from_millis(timeout_ms),
            producer_type,
            wait_strategy,
        })
    }

    /// Realized mailbox capacity (the rounded size).
    pub fn size(&self) -> usize {
        self.ring.capacity
    }

    /// Settings a mailbox for this channel is created with.
    pub fn mailbox_settings(&self) -> MailboxSettings {
        MailboxSettings::new(self.ring)
            .overflow(OverflowPolicy::from_block_when_full(self.block_when_full))
            .multicast(self.multiple_consumers)
            .producer_type(self.producer_type)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
