use basalt_perf::{make_mailbox, make_test_message};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox");
    group.throughput(Throughput::Elements(1));

    for capacity in [64usize, 1024, 65536] {
        let mailbox = make_mailbox(capacity).expect("valid capacity");
        let sub = mailbox.subscribe().expect("first subscriber");
        let msg = make_test_message();

        group.bench_with_input(
            BenchmarkId::new("publish+claim", capacity),
            &capacity,
            |b, _| {
                b.iter(|| {
                    mailbox.publish(black_box(msg.clone())).unwrap();
                    black_box(mailbox.claim(sub).unwrap());
                });
            },
        );
    }
    group.finish();
}

fn bench_batch_drain(c: &mut Criterion) {
    let mailbox = make_mailbox(4096).expect("valid capacity");
    let sub = mailbox.subscribe().expect("first subscriber");
    let msg = make_test_message();

    let mut group = c.benchmark_group("mailbox");
    group.throughput(Throughput::Elements(4096));

    group.bench_function("fill+drain 4096", |b| {
        b.iter(|| {
            for _ in 0..4096 {
                mailbox.publish(msg.clone()).unwrap();
            }
            while let Some(m) = mailbox.claim(sub).unwrap() {
                black_box(m);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_batch_drain);
criterion_main!(benches);
