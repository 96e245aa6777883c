//! Query latency benchmark
//!
//! Populates one stream per decay shape, then times Count, Sum and Max
//! queries over ranges of increasing age and width.

use decaystore::{
    CountOperator, Decay, MaxOperator, StreamConfig, SumOperator, SummaryStore, WindowOperator,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

const VALUES: i64 = 2_000_000;
const QUERIES_PER_CASE: usize = 2_000;

fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.2}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    }
}

fn print_section(title: &str) {
    println!("\n{}", "=".repeat(80));
    println!("{title}");
    println!("{}", "=".repeat(80));
}

/// Sum of `t % 100` over `t` in `0..n`.
fn value_prefix_sum(n: i64) -> i64 {
    let r = n % 100;
    n / 100 * 4950 + r * (r - 1) / 2
}

fn populate(decay: Decay) -> SummaryStore {
    let store = SummaryStore::new().unwrap();
    let operators: Vec<Arc<dyn WindowOperator>> = vec![
        Arc::new(CountOperator::new()),
        Arc::new(SumOperator::new()),
        Arc::new(MaxOperator::new()),
    ];
    store
        .register_with_config(
            0,
            decay.build().unwrap(),
            operators,
            &StreamConfig::new()
                .ingest_buffer_size(1 << 16)
                .batch_partition(true),
        )
        .unwrap();
    for t in 0..VALUES {
        store.append(0, t, (t % 100) as f64).unwrap();
    }
    store.flush(0).unwrap();
    store
}

fn main() {
    let _ = env_logger::try_init();
    let mut rng = StdRng::seed_from_u64(7);

    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::ASCII_MARKDOWN);
    table.set_width(100);
    table.set_header(["decay", "windows", "range", "operator", "mean latency", "mean rel. error"]);

    for (name, decay) in [
        ("exponential(2)", Decay::exponential(2.0)),
        ("rational_power(1,1,1,1)", Decay::rational_power(1, 1, 1, 1)),
    ] {
        print_section(&format!("Populating {name} with {VALUES} values"));
        let start = Instant::now();
        let store = populate(decay);
        println!("  populated in {}", format_duration(start.elapsed()));
        let windows = store.num_summary_windows(Some(0)).unwrap();

        for (range_name, width) in [("1K", 1_000), ("10K", 10_000), ("1M", 1_000_000)] {
            for (op_name, op) in [("count", 0), ("sum", 1), ("max", 2)] {
                let params: &[f64] = if op == 2 { &[] } else { &[0.95] };
                let mut elapsed = Duration::ZERO;
                let mut error = 0.0;
                for _ in 0..QUERIES_PER_CASE {
                    let t0 = rng.random_range(0..VALUES - width);
                    let t1 = t0 + width - 1;
                    let start = Instant::now();
                    let result = store.query(0, t0, t1, op, params).unwrap();
                    elapsed += start.elapsed();
                    if let Some(estimate) = result.as_estimate() {
                        let truth = if op == 0 {
                            width as f64
                        } else {
                            (value_prefix_sum(t1 + 1) - value_prefix_sum(t0)) as f64
                        };
                        error += (estimate.value - truth).abs() / truth.max(1.0);
                    }
                }
                let n = QUERIES_PER_CASE as u32;
                table.add_row(vec![
                    name.to_string(),
                    windows.to_string(),
                    range_name.to_string(),
                    op_name.to_string(),
                    format_duration(elapsed / n),
                    if op == 2 {
                        "-".to_string()
                    } else {
                        format!("{:.4}", error / f64::from(n))
                    },
                ]);
            }
        }
        store.close().unwrap();
    }

    println!();
    println!("{table}");
}
