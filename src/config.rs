use crate::env::{
    env_opt, LOKI_SINK_CALLER_FORMAT_ENV, LOKI_SINK_DYNAMIC_LABELS_ENV, LOKI_SINK_LEVEL_ENV,
    LOKI_SINK_PRINT_FIELD_KEY_ENV,
};
use crate::error::ConfigError;
use crate::labels::LabelConfig;
use crate::level::Level;
use crate::line::{CallerFormat, LineBuilder};
use std::fmt;
use std::sync::Arc;

/// Identifier of this sink, used to prefix its own diagnostics.
pub const LOKI_SINK_KEY: &str = "loki";

/// Configuration of the sink and the layer driving it.
///
/// **Fields**
/// - `print_field_key`: render inline fields as `key=value` instead of
///   just `value`.
/// - `caller_format`: what the default line shows after `caller=`.
/// - `line_builder`: replaces the default line format entirely.
/// - `dynamic_labels`: field keys promoted to structured metadata.
/// - `min_level`: events below this level are suppressed.
/// - `capture_backtrace`: attach a captured backtrace to error events
///   that carry no `stacktrace` field.
#[derive(Clone)]
pub struct SinkConfig {
    pub print_field_key: bool,
    pub caller_format: CallerFormat,
    pub line_builder: Option<Arc<dyn LineBuilder>>,
    pub dynamic_labels: LabelConfig,
    pub min_level: Level,
    pub capture_backtrace: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            print_field_key: false,
            caller_format: CallerFormat::Level,
            line_builder: None,
            dynamic_labels: LabelConfig::default(),
            min_level: Level::Info,
            capture_backtrace: false,
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("print_field_key", &self.print_field_key)
            .field("caller_format", &self.caller_format)
            .field("line_builder", &self.line_builder.as_ref().map(|_| "custom"))
            .field("dynamic_labels", &self.dynamic_labels)
            .field("min_level", &self.min_level)
            .field("capture_backtrace", &self.capture_backtrace)
            .finish()
    }
}

impl SinkConfig {
    pub fn print_field_key(mut self, yes: bool) -> Self {
        self.print_field_key = yes;
        self
    }

    pub fn caller_format(mut self, format: CallerFormat) -> Self {
        self.caller_format = format;
        self
    }

    pub fn line_builder(mut self, builder: impl LineBuilder + 'static) -> Self {
        self.line_builder = Some(Arc::new(builder));
        self
    }

    /// Promote these field keys to structured metadata with an empty default.
    pub fn dynamic_labels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dynamic_labels = LabelConfig::from_names(names);
        self
    }

    pub fn label_config(mut self, labels: LabelConfig) -> Self {
        self.dynamic_labels = labels;
        self
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn capture_backtrace(mut self, yes: bool) -> Self {
        self.capture_backtrace = yes;
        self
    }

    /// Build a config from `LOKI_SINK_*` variables, keeping defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = SinkConfig::default();

        if let Some(v) = env_opt(LOKI_SINK_PRINT_FIELD_KEY_ENV) {
            config.print_field_key = parse_bool(LOKI_SINK_PRINT_FIELD_KEY_ENV, &v)?;
        }
        if let Some(v) = env_opt(LOKI_SINK_LEVEL_ENV) {
            config.min_level = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: LOKI_SINK_LEVEL_ENV,
                value: v.clone(),
            })?;
        }
        if let Some(v) = env_opt(LOKI_SINK_CALLER_FORMAT_ENV) {
            config.caller_format = match v.to_ascii_lowercase().as_str() {
                "level" => CallerFormat::Level,
                "location" => CallerFormat::Location,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: LOKI_SINK_CALLER_FORMAT_ENV,
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = env_opt(LOKI_SINK_DYNAMIC_LABELS_ENV) {
            config.dynamic_labels = parse_labels(LOKI_SINK_DYNAMIC_LABELS_ENV, &v)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Parse `name[=default],...` into a [`LabelConfig`].
pub fn parse_labels(key: &'static str, value: &str) -> Result<LabelConfig, ConfigError> {
    let mut pairs = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, default) = match item.split_once('=') {
            Some((name, default)) => (name.trim(), default.trim()),
            None => (item, ""),
        };
        if name.is_empty() {
            return Err(ConfigError::EmptyLabelName { key });
        }
        pairs.push((name.to_string(), default.to_string()));
    }
    Ok(LabelConfig::from_defaults(pairs))
}
