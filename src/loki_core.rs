use crate::error::SinkError;
use crate::field::Field;
use crate::handler::LogHandler;
use crate::level::Level;
use crate::record::LogEvent;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Decides which levels reach the handler.
///
/// A [`Level`] enables itself and everything more severe; closures
/// `Fn(Level) -> bool` allow arbitrary filters.
pub trait LevelEnabler: Send + Sync {
    fn enabled(&self, level: Level) -> bool;
}

impl LevelEnabler for Level {
    fn enabled(&self, level: Level) -> bool {
        level >= *self
    }
}

impl<F> LevelEnabler for F
where
    F: Fn(Level) -> bool + Send + Sync,
{
    fn enabled(&self, level: Level) -> bool {
        self(level)
    }
}

/// Outcome of [`LokiCore::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDecision {
    Dispatch,
    Suppress,
}

/// Level gate plus accumulated context fields in front of a [`LogHandler`].
///
/// Cores form a tree: [`LokiCore::with`] derives a child carrying a copy of
/// the parent's fields plus new ones, so no two cores ever share a mutable
/// field map.
#[derive(Clone)]
pub struct LokiCore {
    enabler: Arc<dyn LevelEnabler>,
    handler: Arc<dyn LogHandler>,
    fields: BTreeMap<String, Field>,
}

impl LokiCore {
    pub fn new(handler: Arc<dyn LogHandler>, enabler: impl LevelEnabler + 'static) -> Self {
        LokiCore {
            enabler: Arc::new(enabler),
            handler,
            fields: BTreeMap::new(),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.enabler.enabled(level)
    }

    /// Whether `event` should be written. Has no side effects.
    pub fn check(&self, event: &LogEvent) -> CheckDecision {
        if self.enabled(event.level) {
            CheckDecision::Dispatch
        } else {
            CheckDecision::Suppress
        }
    }

    /// Hand `event` to the handler with the accumulated context fields
    /// placed before `fields`. A context field whose key `fields` redefines
    /// is dropped. Handler errors are returned unchanged.
    pub fn write(&self, event: &LogEvent, fields: Vec<Field>) -> Result<(), SinkError> {
        self.handler.proceed(event, self.merge(fields))
    }

    /// Derive a core that also carries `fields`; later keys replace earlier
    /// ones. `self` is left untouched.
    pub fn with(&self, fields: impl IntoIterator<Item = Field>) -> LokiCore {
        let mut child = self.clone();
        for field in fields {
            child.fields.insert(field.key.clone(), field);
        }
        child
    }

    pub fn sync(&self) -> Result<(), SinkError> {
        self.handler.sync()
    }

    /// Context fields accumulated through [`LokiCore::with`], by key.
    pub fn fields(&self) -> &BTreeMap<String, Field> {
        &self.fields
    }

    fn merge(&self, fields: Vec<Field>) -> Vec<Field> {
        if self.fields.is_empty() {
            return fields;
        }
        let mut merged: Vec<Field> = self
            .fields
            .values()
            .filter(|ctx| !fields.iter().any(|f| f.key == ctx.key))
            .cloned()
            .collect();
        merged.extend(fields);
        merged
    }
}

impl fmt::Debug for LokiCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LokiCore")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
