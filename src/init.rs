use crate::client::LokiClient;
use crate::config::SinkConfig;
use crate::error::InitError;
use crate::handler::Sink;
use crate::layer::LokiLayer;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for installing the global subscriber.
///
/// **Fields**
/// - `sink`: [`SinkConfig`] for the Loki layer.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`LokiLayer`] so events are also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub sink: SinkConfig,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that forwards events to `client`.
///
/// **Parameters**
/// - `client`: delivery client receiving the built push entries.
/// - `config`: [`LayerConfig`] controlling the sink and console output.
///
/// **Returns**
/// - The shared [`Sink`], so the caller can `sync` and `close` it on
///   shutdown.
/// - `Err(InitError)` if a global subscriber was already installed.
pub fn init_tracing_with_config<C>(client: C, config: LayerConfig) -> Result<Arc<Sink<C>>, InitError>
where
    C: LokiClient + 'static,
{
    let (layer, sink) = LokiLayer::new(client, config.sink);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(sink)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`] and the given sink configuration.
pub fn init_tracing<C>(client: C, sink: SinkConfig) -> Result<Arc<Sink<C>>, InitError>
where
    C: LokiClient + 'static,
{
    init_tracing_with_config(
        client,
        LayerConfig {
            sink,
            ..LayerConfig::default()
        },
    )
}
