use crate::client::LokiClient;
use crate::config::{SinkConfig, LOKI_SINK_KEY};
use crate::error::SinkError;
use crate::field::{Field, FieldValue};
use crate::handler::Sink;
use crate::level::Level;
use crate::loki_core::{CheckDecision, LokiCore};
use crate::record::{Caller, LogEvent};
use chrono::Utc;
use std::backtrace::Backtrace;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::field::{Field as TracingField, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event field carrying the human-readable message.
const MESSAGE_FIELD: &str = "message";
/// Event field carrying a pre-rendered stack trace.
const STACKTRACE_FIELD: &str = "stacktrace";

/// `tracing_subscriber` layer that turns every event into a Loki push entry.
///
/// Span fields accumulate as context: each span stores a [`LokiCore`]
/// derived from its parent's, and events are written through the core of
/// the span they occur in. Entries are built and handed to the client on
/// the logging thread; the client decides how they reach Loki.
pub struct LokiLayer {
    core: LokiCore,
    capture_backtrace: bool,
    /// Total events seen by the layer (before level gating).
    pub total_events: Arc<AtomicU64>,
    /// Accepted by the delivery client.
    pub enqueued_events: Arc<AtomicU64>,
    /// Refused by the delivery client.
    pub dropped_events: Arc<AtomicU64>,
}

/// Span extension holding the span's derived core.
struct SpanCore(LokiCore);

impl LokiLayer {
    /// Create a layer writing through a new [`Sink`] around `client`.
    ///
    /// **Returns**
    /// - the layer, ready to be added to a `Registry`;
    /// - the shared sink, used to `sync` or `close` on shutdown.
    pub fn new<C>(client: C, config: SinkConfig) -> (Self, Arc<Sink<C>>)
    where
        C: LokiClient + 'static,
    {
        let sink = Arc::new(Sink::new(client, &config));
        let core = LokiCore::new(sink.clone(), config.min_level);
        (Self::from_core(core, config.capture_backtrace), sink)
    }

    /// Wrap an existing core, e.g. one already carrying global fields.
    pub fn from_core(core: LokiCore, capture_backtrace: bool) -> Self {
        Self {
            core,
            capture_backtrace,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Root core; spans derive theirs from it.
    pub fn core(&self) -> &LokiCore {
        &self.core
    }

    pub fn sync(&self) -> Result<(), SinkError> {
        self.core.sync()
    }
}

impl<S> Layer<S> for LokiLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        let fields = visitor.into_context_fields();

        let derived = match span.parent() {
            Some(parent) => {
                let extensions = parent.extensions();
                match extensions.get::<SpanCore>() {
                    Some(SpanCore(core)) => core.with(fields),
                    None => self.core.with(fields),
                }
            }
            None => self.core.with(fields),
        };

        span.extensions_mut().insert(SpanCore(derived));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        if let Some(SpanCore(core)) = extensions.get_mut::<SpanCore>() {
            *core = core.with(visitor.into_context_fields());
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = Level::from(meta.level());
        if !self.core.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let stack = visitor.stack.take().or_else(|| {
            (self.capture_backtrace && level.is_error_or_above())
                .then(|| Backtrace::force_capture().to_string())
        });

        let log_event = LogEvent {
            timestamp: Utc::now(),
            level,
            message: visitor.message.take().unwrap_or_default(),
            logger_name: Some(meta.target().to_string()),
            caller: meta.file().map(|file| Caller::new(file, meta.line())),
            stack,
        };

        let span = ctx.event_span(event);
        let extensions = span.as_ref().map(|s| s.extensions());
        let core = extensions
            .as_ref()
            .and_then(|ext| ext.get::<SpanCore>())
            .map(|SpanCore(core)| core)
            .unwrap_or(&self.core);

        if core.check(&log_event) == CheckDecision::Suppress {
            return;
        }

        match core.write(&log_event, visitor.fields) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("[{}] dropping log entry: {}", LOKI_SINK_KEY, e);
            }
        }
    }
}

/// Error recorded through `Visit::record_error`, kept as its message.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
struct RecordedError(String);

/// Collects tracing fields into typed [`Field`]s.
#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Vec<Field>,
    pub message: Option<String>,
    pub stack: Option<String>,
}

impl FieldVisitor {
    /// Span fields are context only; message and stack stay ordinary fields.
    fn into_context_fields(mut self) -> Vec<Field> {
        if let Some(message) = self.message.take() {
            self.fields.push(Field::new(MESSAGE_FIELD, message));
        }
        if let Some(stack) = self.stack.take() {
            self.fields.push(Field::new(STACKTRACE_FIELD, stack));
        }
        self.fields
    }

    fn push(&mut self, field: &TracingField, value: impl Into<FieldValue>) {
        self.fields.push(Field::new(field.name(), value));
    }

    fn record_text(&mut self, field: &TracingField, text: String) -> Option<String> {
        match field.name() {
            MESSAGE_FIELD => {
                self.message = Some(text);
                None
            }
            STACKTRACE_FIELD => {
                self.stack = Some(text);
                None
            }
            _ => Some(text),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field, value);
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field, value);
    }

    fn record_i128(&mut self, field: &TracingField, value: i128) {
        self.push(field, FieldValue::Stringer(Arc::new(value)));
    }

    fn record_u128(&mut self, field: &TracingField, value: u128) {
        self.push(field, FieldValue::Stringer(Arc::new(value)));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field, value);
    }

    fn record_str(&mut self, field: &TracingField, value: &str) {
        if let Some(text) = self.record_text(field, value.to_string()) {
            self.push(field, text);
        }
    }

    fn record_bytes(&mut self, field: &TracingField, value: &[u8]) {
        self.push(field, value);
    }

    fn record_error(&mut self, field: &TracingField, value: &(dyn std::error::Error + 'static)) {
        let err = RecordedError(value.to_string());
        self.push(field, FieldValue::Error(Arc::new(err)));
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn std::fmt::Debug) {
        if let Some(text) = self.record_text(field, format!("{:?}", value)) {
            self.push(field, FieldValue::Stringer(Arc::new(text)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChannelClient;
    use crate::record::PushEntry;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[test]
    fn counts_events_and_respects_min_level() {
        let (client, mut rx) = ChannelClient::<PushEntry>::new(16);
        let (layer, _sink) = LokiLayer::new(client, SinkConfig::default().min_level(Level::Warn));
        let total = layer.total_events.clone();
        let enqueued = layer.enqueued_events.clone();

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(attempt = 3u64, "retrying");
        });

        assert_eq!(total.load(Ordering::Relaxed), 2);
        assert_eq!(enqueued.load(Ordering::Relaxed), 1);
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.line, "level=warn caller=warn retrying, 3");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn refused_entries_are_counted_as_dropped() {
        let (client, _rx) = ChannelClient::<PushEntry>::new(1);
        let (layer, _sink) = LokiLayer::new(client, SinkConfig::default());
        let dropped = layer.dropped_events.clone();

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            tracing::info!("second");
        });

        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn suppressed_events_are_not_visited() {
        struct Counted(Arc<AtomicU64>);

        impl std::fmt::Debug for Counted {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fetch_add(1, Ordering::Relaxed);
                f.write_str("counted")
            }
        }

        let (client, mut rx) = ChannelClient::<PushEntry>::new(16);
        let (layer, _sink) = LokiLayer::new(client, SinkConfig::default().min_level(Level::Warn));
        let formatted = Arc::new(AtomicU64::new(0));

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(payload = ?Counted(formatted.clone()), "quiet");
            assert_eq!(formatted.load(Ordering::Relaxed), 0);
            tracing::warn!(payload = ?Counted(formatted.clone()), "loud");
        });

        assert_eq!(formatted.load(Ordering::Relaxed), 1);
        assert_eq!(rx.try_recv().unwrap().line, "level=warn caller=warn loud, counted");
        assert!(rx.try_recv().is_err());
    }
}
