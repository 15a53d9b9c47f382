/// Environment variable names read by [`SinkConfig::from_env`] and
/// [`PushConfig::from_env`].
///
/// These are purely helpers; the core sink types remain decoupled from
/// environment access.
///
/// [`SinkConfig::from_env`]: crate::config::SinkConfig::from_env
/// [`PushConfig::from_env`]: crate::push::PushConfig::from_env

/// `true`/`false`: render `key=` before inline field values.
pub const LOKI_SINK_PRINT_FIELD_KEY_ENV: &str = "LOKI_SINK_PRINT_FIELD_KEY";

/// Comma-separated field keys promoted to structured metadata, each either
/// `name` or `name=default`.
pub const LOKI_SINK_DYNAMIC_LABELS_ENV: &str = "LOKI_SINK_DYNAMIC_LABELS";

/// Minimum level forwarded to Loki, e.g. `info`.
pub const LOKI_SINK_LEVEL_ENV: &str = "LOKI_SINK_LEVEL";

/// `level` or `location`: what the `caller=` segment shows.
pub const LOKI_SINK_CALLER_FORMAT_ENV: &str = "LOKI_SINK_CALLER_FORMAT";

/// Loki base URL, e.g. `http://127.0.0.1:3100`.
pub const LOKI_SINK_URL_ENV: &str = "LOKI_SINK_URL";

/// Optional `X-Scope-OrgID` tenant header.
pub const LOKI_SINK_TENANT_ENV: &str = "LOKI_SINK_TENANT";

/// Optional logical service name, sent as the `service_name` stream label.
pub const LOKI_SINK_SERVICE_NAME_ENV: &str = "LOKI_SINK_SERVICE_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and blank values alike.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
