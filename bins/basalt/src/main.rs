use anyhow::Context;
use basalt_config::ComponentConfig;
use basalt_engine::{Component, ConsumerGroup, HandlerError, Producer, ShutdownPolicy};
use basalt_events::{ExchangePattern, Message};
use clap::Parser;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Runs a request/reply round over every channel listed in the config.
#[derive(Parser, Debug)]
#[command(name = "basalt")]
struct Args {
    /// Component config; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Messages to send per channel.
    #[arg(short, long, default_value_t = 1000)]
    messages: usize,

    /// Channel URI to use when the config lists none.
    #[arg(long, default_value = "disruptor:demo?size=256")]
    channel: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ComponentConfig::load(path.clone())
            .with_context(|| format!("loading config from {path}"))?,
        None => ComponentConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("BASALT_LOG")
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    let uris = if config.channels.is_empty() {
        vec![args.channel.clone()]
    } else {
        config.channels.clone()
    };

    let component = Component::new(config);
    for uri in &uris {
        run_channel(&component, uri, args.messages).with_context(|| format!("channel {uri}"))?;
    }

    let stats = component.correlator().stats();
    info!(
        completed = stats.completed,
        timed_out = stats.timed_out,
        abandoned = stats.abandoned,
        late_dropped = stats.late_dropped,
        "correlator totals"
    );
    Ok(())
}

fn run_channel(component: &Component, uri: &str, messages: usize) -> anyhow::Result<()> {
    let endpoint = component.endpoint(uri)?;
    let mut consumer: ConsumerGroup =
        endpoint.consumer(|msg: &Message| -> Result<Option<Message>, HandlerError> {
            Ok(Some(Message::reply_to(msg, msg.body_str().to_uppercase())))
        })?;
    let producer: Producer = endpoint.producer()?;

    let started = Instant::now();
    let mut replies = 0usize;
    for n in 0..messages {
        let reply = producer.send(Message::new(format!("message {n}")), ExchangePattern::InOut)?;
        if reply.correlation_id().is_some() {
            replies += 1;
        }
    }
    let elapsed = started.elapsed();

    consumer.stop(ShutdownPolicy::CompletePendingTasks);
    info!(
        channel = endpoint.name(),
        size = endpoint.size(),
        sent = messages,
        replies,
        processed = consumer.processed(),
        failed = consumer.failed(),
        elapsed_ms = elapsed.as_millis() as u64,
        "channel round finished"
    );
    Ok(())
}
