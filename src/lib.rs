pub mod field;
pub mod labels;
pub mod level;
pub mod line;
pub mod record;

pub mod client;
pub mod error;
pub mod handler;
pub mod loki_core;

pub mod config;
pub mod env;
pub mod init;
pub mod layer;
pub mod push;

pub use client::{ChannelClient, LokiClient, NoopClient};
pub use config::SinkConfig;
pub use field::{encode, Field, FieldValue};
pub use handler::{parse_raw, LogHandler, Sink};
pub use labels::{extract_dynamic_labels, LabelConfig, LabelPair};
pub use layer::LokiLayer;
pub use level::Level;
pub use line::{CallerFormat, DefaultLineBuilder, LineBuilder};
pub use loki_core::{CheckDecision, LevelEnabler, LokiCore};
pub use record::{Caller, LogEvent, PushEntry};
