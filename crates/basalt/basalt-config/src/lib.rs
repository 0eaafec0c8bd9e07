mod channel;
mod config;

pub use channel::{ChannelConfig, SCHEME, WaitForTaskToComplete};
pub use config::{ComponentConfig, ConfigError};
