use basalt_events::Message;
use basalt_ring::{MailboxSettings, OverflowPolicy, RingConfig, RingMailbox};
use std::time::Instant;

// ─── Statistics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Stats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BenchResult {
    pub name: String,
    pub unit: &'static str,
    pub stats: Stats,
}

/// Sorts `samples` in place and summarizes them. `None` for an empty slice.
pub fn compute_stats(samples: &mut [u64]) -> Option<Stats> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let count = samples.len();
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / count as f64;
    let variance = samples
        .iter()
        .map(|&x| (x as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;

    Some(Stats {
        count,
        min: samples[0],
        max: samples[count - 1],
        mean,
        stddev: variance.sqrt(),
        p50: percentile(samples, 50.0),
        p90: percentile(samples, 90.0),
        p99: percentile(samples, 99.0),
        p999: percentile(samples, 99.9),
    })
}

// Nearest-rank on an already sorted slice.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

// ─── Measurement Harness ────────────────────────────────────────────────────

/// Times `batches` runs of `batch_size` calls and records ns per call.
pub fn measure_batched<F: FnMut()>(
    name: &str,
    batches: usize,
    batch_size: usize,
    warmup: usize,
    mut f: F,
) -> Option<BenchResult> {
    let batch_size = batch_size.max(1);
    for _ in 0..warmup * batch_size {
        f();
    }

    let mut samples: Vec<u64> = (0..batches)
        .map(|_| {
            let start = Instant::now();
            for _ in 0..batch_size {
                f();
            }
            let per_op = start.elapsed().as_nanos() / batch_size as u128;
            (per_op as u64).max(1)
        })
        .collect();

    Some(BenchResult {
        name: name.to_string(),
        unit: "ns/op",
        stats: compute_stats(&mut samples)?,
    })
}

// ─── Fixtures ───────────────────────────────────────────────────────────────

pub fn make_test_message() -> Message {
    Message::new(vec![0xAB; 64]).with_header("source", "perf")
}

/// A single-subscriber, fail-fast mailbox of `capacity` slots.
pub fn make_mailbox(capacity: usize) -> Option<RingMailbox<Message>> {
    let ring = RingConfig::new(capacity).ok()?;
    Some(RingMailbox::new(
        MailboxSettings::new(ring).overflow(OverflowPolicy::Reject),
    ))
}

// ─── Output ─────────────────────────────────────────────────────────────────

pub fn print_table_header() {
    println!(
        "  {:<34} {:>8} {:>8} {:>8} {:>8} {:>8}  unit",
        "Benchmark", "min", "p50", "p90", "p99", "max",
    );
    println!("  {}", "─".repeat(90));
}

pub fn print_result_row(r: &BenchResult) {
    println!(
        "  {:<34} {:>8} {:>8} {:>8} {:>8} {:>8}  {}",
        r.name, r.stats.min, r.stats.p50, r.stats.p90, r.stats.p99, r.stats.max, r.unit,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_known_samples() {
        let mut samples: Vec<u64> = (1..=100).rev().collect();
        let stats = compute_stats(&mut samples).unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 100);
        assert_eq!(stats.p50, 50);
        assert_eq!(stats.p99, 99);
        assert!((stats.mean - 50.5).abs() < 1e-9);
    }

    #[test]
    fn empty_samples_have_no_stats() {
        assert_eq!(compute_stats(&mut []), None);
    }

    #[test]
    fn batched_measure_records_each_batch() {
        let mut calls = 0usize;
        let result = measure_batched("noop", 10, 5, 1, || calls += 1).unwrap();
        assert_eq!(calls, 55);
        assert_eq!(result.stats.count, 10);
        assert!(result.stats.min >= 1);
    }

    #[test]
    fn mailbox_fixture_round_trips() {
        let mailbox = make_mailbox(8).unwrap();
        let sub = mailbox.subscribe().unwrap();
        mailbox.publish(make_test_message()).unwrap();
        let got = mailbox.claim(sub).unwrap().unwrap();
        assert_eq!(got.header("source"), Some("perf"));
    }
}
