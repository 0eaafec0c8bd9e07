//! Prints a latency table for the mailbox and the request/reply path.
//!
//! Pass `--json` to emit the results as JSON instead.

use basalt_config::ComponentConfig;
use basalt_engine::{Component, HandlerError};
use basalt_events::{ExchangePattern, Message};
use basalt_perf::{
    BenchResult, make_mailbox, make_test_message, measure_batched, print_result_row,
    print_table_header,
};

const BATCHES: usize = 200;
const BATCH_SIZE: usize = 100;
const WARMUP: usize = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json = std::env::args().any(|a| a == "--json");
    let mut results: Vec<BenchResult> = Vec::new();

    for capacity in [64usize, 4096] {
        let mailbox = make_mailbox(capacity).ok_or("invalid capacity")?;
        let sub = mailbox.subscribe()?;
        let msg = make_test_message();
        results.extend(measure_batched(
            &format!("mailbox publish+claim ({capacity})"),
            BATCHES,
            BATCH_SIZE,
            WARMUP,
            || {
                let _ = mailbox.publish(msg.clone());
                let _ = mailbox.claim(sub);
            },
        ));
    }

    let component = Component::new(ComponentConfig::default());
    let endpoint = component.endpoint("disruptor:report?size=1024")?;
    let mut consumer = endpoint.consumer(|m: &Message| -> Result<Option<Message>, HandlerError> {
        Ok(Some(Message::reply_to(m, "ok")))
    })?;
    let producer = endpoint.producer()?;
    results.extend(measure_batched(
        "send InOut",
        BATCHES,
        BATCH_SIZE / 10,
        WARMUP,
        || {
            let _ = producer.send(make_test_message(), ExchangePattern::InOut);
        },
    ));
    consumer.stop(basalt_engine::ShutdownPolicy::CompletePendingTasks);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table_header();
        results.iter().for_each(print_result_row);
    }
    Ok(())
}
