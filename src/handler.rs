use crate::client::LokiClient;
use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::field::Field;
use crate::labels::{extract_dynamic_labels, LabelConfig, LabelPair};
use crate::level::Level;
use crate::line::{DefaultLineBuilder, LineBuilder};
use crate::record::{Caller, LogEvent, PushEntry};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io;
use std::sync::Arc;

/// Turns log events into push entries. [`LokiCore`](crate::loki_core::LokiCore)
/// dispatches every enabled event to one of these.
pub trait LogHandler: Send + Sync {
    /// Convert one event and its fields into an entry and hand it to the
    /// delivery client.
    fn proceed(&self, event: &LogEvent, fields: Vec<Field>) -> Result<(), SinkError>;

    /// Flush the delivery client.
    fn sync(&self) -> Result<(), SinkError>;
}

/// Assembles [`PushEntry`]s from log events and sends them through a
/// [`LokiClient`].
///
/// All work happens on the caller's thread: label extraction, line
/// building and the non-blocking hand-off to the client.
pub struct Sink<C: LokiClient> {
    client: C,
    line_builder: Arc<dyn LineBuilder>,
    dynamic_labels: LabelConfig,
}

impl<C: LokiClient> Sink<C> {
    pub fn new(client: C, config: &SinkConfig) -> Self {
        let line_builder = config.line_builder.clone().unwrap_or_else(|| {
            Arc::new(DefaultLineBuilder::new(
                config.print_field_key,
                config.caller_format,
            )) as Arc<dyn LineBuilder>
        });

        Sink {
            client,
            line_builder,
            dynamic_labels: config.dynamic_labels.clone(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Stop the client. Entries sent afterwards are refused by the client.
    pub fn close(&self) {
        self.client.stop();
    }

    /// Ingest a pre-serialized log line.
    ///
    /// The bytes are parsed with [`parse_raw`]; structured fields are not
    /// available on this path so no labels are extracted.
    ///
    /// **Returns**
    /// - `Ok(len)` with the number of bytes consumed (always all of them).
    /// - `Err(..)` if the client refused the entry.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<usize, SinkError> {
        let event = parse_raw(bytes);
        let line = self.line_builder.build(&event, &[]);
        self.push(&event, line, Vec::new())?;
        Ok(bytes.len())
    }

    fn push(
        &self,
        event: &LogEvent,
        line: String,
        structured_metadata: Vec<LabelPair>,
    ) -> Result<(), SinkError> {
        let entry = PushEntry {
            timestamp: event.timestamp,
            line,
            structured_metadata,
        };
        self.client.send(C::Entry::from(entry))?;

        if event.level.is_error_or_above() {
            // The process may be about to die; flush without letting a
            // flush failure replace the original outcome.
            let _ = self.sync();
        }
        Ok(())
    }
}

impl<C: LokiClient> LogHandler for Sink<C> {
    fn proceed(&self, event: &LogEvent, fields: Vec<Field>) -> Result<(), SinkError> {
        let (metadata, line_fields) = extract_dynamic_labels(&self.dynamic_labels, fields);
        let line = self.line_builder.build(event, &line_fields);
        self.push(event, line, metadata)
    }

    fn sync(&self) -> Result<(), SinkError> {
        self.client.flush()?;
        Ok(())
    }
}

impl<C: LokiClient> io::Write for &Sink<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_raw(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(io::Error::other)
    }
}

#[derive(Deserialize)]
struct JsonLogEntry {
    #[serde(default)]
    level: Option<String>,
    #[serde(rename = "ts", default)]
    timestamp: Option<f64>,
    #[serde(rename = "logger", default)]
    logger_name: Option<String>,
    #[serde(rename = "msg", default)]
    message: Option<String>,
    #[serde(default)]
    caller: Option<String>,
    #[serde(rename = "stacktrace", default)]
    stack: Option<String>,
}

/// Parse a raw log payload into an event.
///
/// A JSON object with the optional keys `level`, `ts` (milliseconds since
/// the epoch), `logger`, `msg`, `caller` and `stacktrace` is decoded
/// field by field. Anything else becomes an `info` event stamped now whose
/// message is the payload itself.
pub fn parse_raw(bytes: &[u8]) -> LogEvent {
    match decode_json_record(bytes) {
        Some(entry) => LogEvent {
            timestamp: entry
                .timestamp
                .and_then(millis_to_datetime)
                .unwrap_or_else(Utc::now),
            level: entry
                .level
                .and_then(|l| l.parse().ok())
                .unwrap_or(Level::Info),
            message: entry.message.unwrap_or_default(),
            logger_name: entry.logger_name,
            caller: entry.caller.map(parse_caller),
            stack: entry.stack,
        },
        None => LogEvent::new(Level::Info, String::from_utf8_lossy(bytes)),
    }
}

// Only objects count as records; serde would also accept a JSON array for
// the struct, positionally.
fn decode_json_record(bytes: &[u8]) -> Option<JsonLogEntry> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn millis_to_datetime(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return None;
    }
    let whole = ms.trunc();
    let sub_millis_nanos = ((ms - whole) * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(whole as i64)?
        .checked_add_signed(chrono::Duration::nanoseconds(sub_millis_nanos))
}

fn parse_caller(raw: String) -> Caller {
    if let Some((file, line)) = raw.rsplit_once(':') {
        if let Ok(line) = line.parse() {
            return Caller::new(file, Some(line));
        }
    }
    Caller::new(raw, None)
}
