/// Failure reported by a delivery client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("delivery channel is full")]
    Full,

    #[error("delivery channel is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Error returned by the sink while handing an entry to its client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("failed to deliver log entry: {0}")]
    Client(#[from] ClientError),
}

/// Error returned when reading a [`SinkConfig`](crate::config::SinkConfig)
/// from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("empty label name in {key}")]
    EmptyLabelName { key: &'static str },
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}
