use std::time::Instant;
use tracing::{error, info_span};

use tracing_loki_sink::client::NoopClient;
use tracing_loki_sink::config::SinkConfig;
use tracing_loki_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_loki_sink::line::CallerFormat;

fn main() {
    let sink_config = SinkConfig::default()
        .print_field_key(true)
        .caller_format(CallerFormat::Location)
        .dynamic_labels(["tenant", "region"]);

    let layer_config = LayerConfig {
        sink: sink_config,
        enable_stdout: false,
    };

    let sink = init_tracing_with_config(NoopClient, layer_config).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    let span = info_span!("request", tenant = "acme", region = "eu-west-1");
    let _guard = span.enter();
    for i in 0..n {
        error!(iteration = i, latency_ms = 12.5, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: built {} entries in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sink.close();
}
