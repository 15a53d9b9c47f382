use tracing::{error, info};
use tracing_loki_sink::{
    client::LokiClient,
    config::SinkConfig,
    error::ClientError,
    init::init_tracing,
    record::PushEntry,
};

/// Example of plugging in a completely custom delivery client by
/// implementing the `LokiClient` trait directly. Imagine this hands
/// entries to an existing agent instead of talking to Loki.
struct StdoutClient;

impl LokiClient for StdoutClient {
    type Entry = PushEntry;

    fn send(&self, entry: PushEntry) -> Result<(), ClientError> {
        // Here you would call your own client library.
        // For the sake of example we just print the entry.
        println!("[stdout-client] {} {:?}", entry.line, entry.structured_metadata);
        Ok(())
    }

    fn stop(&self) {
        println!("[stdout-client] stopped");
    }
}

fn main() {
    let config = SinkConfig::default().dynamic_labels(["db"]);
    let sink = init_tracing(StdoutClient, config).expect("install subscriber");

    info!("custom client example started");
    error!(db = "my-custom-db", "simulated error sent via custom client");

    sink.close();
}
