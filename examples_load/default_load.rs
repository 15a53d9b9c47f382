use std::time::Instant;
use tracing::error;

use tracing_loki_sink::client::NoopClient;
use tracing_loki_sink::config::SinkConfig;
use tracing_loki_sink::init::{init_tracing_with_config, LayerConfig};

fn main() {
    let config = LayerConfig {
        sink: SinkConfig::default(),
        enable_stdout: false,
    };
    let sink = init_tracing_with_config(NoopClient, config).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: built {} entries in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sink.close();
}
