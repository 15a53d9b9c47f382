use crate::labels::LabelPair;
use crate::level::Level;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Source location of a log call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub file: String,
    pub line: Option<u32>,
}

impl Caller {
    pub fn new(file: impl Into<String>, line: Option<u32>) -> Self {
        Caller {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => f.write_str(&self.file),
        }
    }
}

/// Metadata of a single log call. Structured fields travel next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub logger_name: Option<String>,
    pub caller: Option<Caller>,
    pub stack: Option<String>,
}

impl LogEvent {
    /// Event stamped with the current time and no caller, logger or stack.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            logger_name: None,
            caller: None,
            stack: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }
}

/// Entry handed to the delivery client: one log line plus its structured
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEntry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
    pub structured_metadata: Vec<LabelPair>,
}
