//! Reference delivery pipeline: drain a [`ChannelClient`] receiver, batch
//! entries and post them to Loki's JSON push API.
//!
//! [`ChannelClient`]: crate::client::ChannelClient

use crate::env::{env_opt, env_or, LOKI_SINK_SERVICE_NAME_ENV, LOKI_SINK_TENANT_ENV, LOKI_SINK_URL_ENV};
use crate::labels::LabelPair;
use crate::record::PushEntry;
use async_trait::async_trait;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

/// Settings for [`spawn_pusher`] and [`HttpTransport`].
///
/// **Fields**
/// - `url`: Loki base URL, e.g. `http://127.0.0.1:3100`.
/// - `static_labels`: stream labels attached to every entry.
/// - `tenant_id`: sent as `X-Scope-OrgID` when set.
/// - `batch_size`: entries per push request.
/// - `flush_interval`: maximum delay before a partial batch is pushed.
/// - `max_retries`: attempts after the first failure before a batch is
///   dropped.
#[derive(Clone, Debug)]
pub struct PushConfig {
    pub url: String,
    pub static_labels: BTreeMap<String, String>,
    pub tenant_id: Option<String>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3100".to_string(),
            static_labels: BTreeMap::from([("job".to_string(), "tracing-loki-sink".to_string())]),
            tenant_id: None,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

impl PushConfig {
    /// Defaults overridden by `LOKI_SINK_URL`, `LOKI_SINK_TENANT` and
    /// `LOKI_SINK_SERVICE_NAME`.
    pub fn from_env() -> Self {
        let defaults = PushConfig::default();
        let mut config = PushConfig {
            url: env_or(LOKI_SINK_URL_ENV, &defaults.url),
            tenant_id: env_opt(LOKI_SINK_TENANT_ENV),
            ..defaults
        };
        if let Some(service) = env_opt(LOKI_SINK_SERVICE_NAME_ENV) {
            config.static_labels.insert("service_name".to_string(), service);
        }
        config
    }

    /// Full URL of the push endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/loki/api/v1/push", self.url.trim_end_matches('/'))
    }
}

/// Error returned by a [`PushTransport`].
#[derive(thiserror::Error, Debug)]
pub enum PushError {
    #[error("failed to encode push request: {0}")]
    Encode(#[from] serde_json::Error),

    #[cfg(feature = "http")]
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("loki rejected push with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of `POST /loki/api/v1/push`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

/// One stream: its labels and the entries pushed to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushStream {
    pub stream: BTreeMap<String, String>,
    pub values: Vec<PushValue>,
}

/// `[ "<unix ns>", "<line>", {<structured metadata>} ]`; the metadata
/// object is omitted when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PushValue {
    pub timestamp_ns: String,
    pub line: String,
    pub structured_metadata: Vec<LabelPair>,
}

impl From<PushEntry> for PushValue {
    fn from(entry: PushEntry) -> Self {
        let nanos = entry
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| entry.timestamp.timestamp_millis().saturating_mul(1_000_000));
        PushValue {
            timestamp_ns: nanos.to_string(),
            line: entry.line,
            structured_metadata: entry.structured_metadata,
        }
    }
}

impl Serialize for PushValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.structured_metadata.is_empty() { 2 } else { 3 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.timestamp_ns)?;
        seq.serialize_element(&self.line)?;
        if !self.structured_metadata.is_empty() {
            seq.serialize_element(&MetadataObject(&self.structured_metadata))?;
        }
        seq.end()
    }
}

// Serialized pair by pair so repeated names are kept as they are.
struct MetadataObject<'a>(&'a [LabelPair]);

impl Serialize for MetadataObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for pair in self.0 {
            map.serialize_entry(&pair.name, &pair.value)?;
        }
        map.end()
    }
}

impl PushRequest {
    /// A single stream with `labels` holding all of `entries`.
    pub fn single_stream(labels: BTreeMap<String, String>, entries: Vec<PushEntry>) -> Self {
        PushRequest {
            streams: vec![PushStream {
                stream: labels,
                values: entries.into_iter().map(PushValue::from).collect(),
            }],
        }
    }
}

/// Something that can deliver a [`PushRequest`] to Loki.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver one request.
    ///
    /// **Returns**
    /// - `Ok(())` if Loki accepted the request.
    /// - `Err(..)` on network, encoding or HTTP status failures. The pusher
    ///   treats every error as transient and retries with backoff.
    async fn push(&self, request: &PushRequest) -> Result<(), PushError>;
}

/// [`PushTransport`] over HTTP using `reqwest`.
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    tenant_id: Option<String>,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint(),
            tenant_id: config.tenant_id.clone(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl PushTransport for HttpTransport {
    async fn push(&self, request: &PushRequest) -> Result<(), PushError> {
        let body = serde_json::to_vec(request)?;
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(tenant) = &self.tenant_id {
            req = req.header("X-Scope-OrgID", tenant);
        }

        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(PushError::Status { status, body })
        }
    }
}

/// Spawn a background task that batches entries from `rx` and pushes them
/// through `transport`.
///
/// A batch is pushed when it reaches `batch_size` or when `flush_interval`
/// elapses. Once every sender is gone (see
/// [`LokiClient::stop`](crate::client::LokiClient::stop)) the remaining
/// entries are pushed and the task ends.
pub fn spawn_pusher(
    mut rx: mpsc::Receiver<PushEntry>,
    transport: Arc<dyn PushTransport>,
    config: PushConfig,
) -> JoinHandle<()> {
    // Enforce minimal thresholds to avoid degenerate configs.
    let batch_size = config.batch_size.max(1);
    let flush_interval = config.flush_interval.max(Duration::from_millis(10));

    tokio::spawn(async move {
        let mut batch = Vec::with_capacity(batch_size);
        let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(entry) => {
                        batch.push(entry);
                        if batch.len() >= batch_size {
                            send_batch(&*transport, &config, &mut batch).await;
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            send_batch(&*transport, &config, &mut batch).await;
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        send_batch(&*transport, &config, &mut batch).await;
                    }
                }
            }
        }
    })
}

async fn send_batch(transport: &dyn PushTransport, config: &PushConfig, batch: &mut Vec<PushEntry>) {
    let request = PushRequest::single_stream(config.static_labels.clone(), std::mem::take(batch));
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(10);

    for attempt in 0..=config.max_retries {
        match transport.push(&request).await {
            Ok(()) => return,
            Err(e) if attempt < config.max_retries => {
                eprintln!("loki push failed ({}), retrying in {:?}", e, backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
            Err(e) => {
                eprintln!(
                    "loki push failed ({}), dropping {} entries",
                    e,
                    request.streams.iter().map(|s| s.values.len()).sum::<usize>()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        requests: Mutex<Vec<PushRequest>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn push(&self, request: &PushRequest) -> Result<(), PushError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PushError::Status {
                    status: 503,
                    body: "busy".into(),
                });
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn entry(line: &str, metadata: Vec<LabelPair>) -> PushEntry {
        PushEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000, 5).unwrap(),
            line: line.to_string(),
            structured_metadata: metadata,
        }
    }

    #[test]
    fn serializes_loki_push_body() {
        let request = PushRequest::single_stream(
            BTreeMap::from([("job".to_string(), "api".to_string())]),
            vec![
                entry("plain", vec![]),
                entry(
                    "tagged",
                    vec![LabelPair::new("env", "prod"), LabelPair::new("env", "eu")],
                ),
            ],
        );

        let body = serde_json::to_string(&request).unwrap();
        assert_eq!(
            body,
            r#"{"streams":[{"stream":{"job":"api"},"values":[["1700000000000000005","plain"],["1700000000000000005","tagged",{"env":"prod","env":"eu"}]]}]}"#
        );

        let single = PushRequest::single_stream(
            BTreeMap::new(),
            vec![entry("x", vec![LabelPair::new("a", "b")])],
        );
        let value = serde_json::to_value(&single).unwrap();
        assert_eq!(value["streams"][0]["values"][0][2], json!({"a": "b"}));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let config = PushConfig {
            url: "http://loki:3100/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "http://loki:3100/loki/api/v1/push");
    }

    #[tokio::test]
    async fn pusher_batches_and_flushes_on_close() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, rx) = mpsc::channel(16);
        let config = PushConfig {
            batch_size: 2,
            flush_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let handle = spawn_pusher(rx, transport.clone(), config);

        for line in ["a", "b", "c"] {
            tx.send(entry(line, vec![])).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let lines: Vec<Vec<&str>> = requests
            .iter()
            .map(|r| r.streams[0].values.iter().map(|v| v.line.as_str()).collect())
            .collect();
        assert_eq!(lines, vec![vec!["a", "b"], vec!["c"]]);
        assert_eq!(requests[0].streams[0].stream["job"], "tracing-loki-sink");
    }

    #[tokio::test]
    async fn pusher_retries_transient_failures() {
        let transport = Arc::new(FakeTransport {
            failures_left: AtomicUsize::new(2),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_pusher(rx, transport.clone(), PushConfig::default());

        tx.send(entry("eventually", vec![])).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].streams[0].values[0].line, "eventually");
    }

    #[test]
    fn push_config_reads_environment() {
        let keys = [LOKI_SINK_URL_ENV, LOKI_SINK_TENANT_ENV, LOKI_SINK_SERVICE_NAME_ENV];
        for key in keys {
            std::env::remove_var(key);
        }

        let config = PushConfig::from_env();
        assert_eq!(config.endpoint(), "http://127.0.0.1:3100/loki/api/v1/push");
        assert_eq!(config.tenant_id, None);
        assert!(!config.static_labels.contains_key("service_name"));

        std::env::set_var(LOKI_SINK_URL_ENV, "https://loki.internal:3100/");
        std::env::set_var(LOKI_SINK_TENANT_ENV, "team-a");
        std::env::set_var(LOKI_SINK_SERVICE_NAME_ENV, "billing");

        let config = PushConfig::from_env();
        assert_eq!(config.endpoint(), "https://loki.internal:3100/loki/api/v1/push");
        assert_eq!(config.tenant_id.as_deref(), Some("team-a"));
        assert_eq!(config.static_labels.get("service_name").map(String::as_str), Some("billing"));
        assert_eq!(config.static_labels.get("job").map(String::as_str), Some("tracing-loki-sink"));

        for key in keys {
            std::env::remove_var(key);
        }
    }
}
