use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span};

use tracing_loki_sink::client::ChannelClient;
use tracing_loki_sink::config::SinkConfig;
use tracing_loki_sink::init::init_tracing;
use tracing_loki_sink::push::{spawn_pusher, HttpTransport, PushConfig};
use tracing_loki_sink::record::PushEntry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) Point LOKI_SINK_URL at your Loki instance (default
    //    http://127.0.0.1:3100) and pick labels via LOKI_SINK_DYNAMIC_LABELS.
    let push_config = PushConfig::from_env();
    let sink_config = SinkConfig::from_env()?.print_field_key(true);

    // 2) Entries flow through a bounded channel into the pusher task.
    let (client, rx) = ChannelClient::<PushEntry>::new(4096);
    let transport = Arc::new(HttpTransport::new(&push_config));
    let pusher = spawn_pusher(rx, transport, push_config);

    let sink = init_tracing(client, sink_config)?;

    // 3) Emit some events; span fields become context on every event.
    let span = info_span!("checkout", tenant = "acme");
    {
        let _guard = span.enter();
        info!(items = 3u64, "cart validated");
        error!(order_id = 123u64, "order failed");
    }

    // 4) Stop the client so the pusher flushes and exits.
    sleep(Duration::from_millis(100)).await;
    sink.close();
    pusher.await?;
    Ok(())
}
