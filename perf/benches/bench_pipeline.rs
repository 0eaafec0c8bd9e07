use basalt_config::ComponentConfig;
use basalt_engine::{Component, HandlerError};
use basalt_events::{ExchangePattern, Message};
use basalt_perf::make_test_message;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn echo(msg: &Message) -> Result<Option<Message>, HandlerError> {
    Ok(Some(Message::reply_to(msg, msg.body().to_vec())))
}

fn bench_request_reply(c: &mut Criterion) {
    let component = Component::new(ComponentConfig::default());
    let endpoint = component
        .endpoint("disruptor:bench-inout?size=1024")
        .expect("valid uri");
    let _consumer = endpoint.consumer(echo).expect("consumer starts");
    let producer = endpoint.producer().expect("producer binds");

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));

    group.bench_function("send InOut", |b| {
        b.iter(|| {
            let reply = producer
                .send(make_test_message(), ExchangePattern::InOut)
                .unwrap();
            black_box(reply);
        });
    });
    group.finish();
}

fn bench_fire_and_forget(c: &mut Criterion) {
    let component = Component::new(ComponentConfig::default());
    let endpoint = component
        .endpoint("disruptor:bench-inonly?size=65536&concurrentConsumers=2")
        .expect("valid uri");
    let _consumer = endpoint
        .consumer(|_: &Message| -> Result<Option<Message>, HandlerError> { Ok(None) })
        .expect("consumer starts");
    let producer = endpoint.producer().expect("producer binds");
    let msg = make_test_message();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));

    group.bench_function("send InOnly", |b| {
        b.iter(|| {
            producer
                .send(black_box(msg.clone()), ExchangePattern::InOnly)
                .unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_request_reply, bench_fire_and_forget);
criterion_main!(benches);
