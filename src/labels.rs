use crate::field::Field;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One structured-metadata attribute attached to a push entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        LabelPair {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Field keys promoted to structured metadata, each with the value used when
/// the field encodes to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelConfig {
    defaults: HashMap<String, String>,
}

impl LabelConfig {
    /// Labels with an empty default value.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelConfig {
            defaults: names.into_iter().map(|n| (n.into(), String::new())).collect(),
        }
    }

    pub fn from_defaults<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LabelConfig {
            defaults: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn default_for(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }
}

/// Split `fields` into structured metadata and the fields left for the line.
///
/// Fields are scanned once in order. A field whose key is configured in
/// `labels` becomes a [`LabelPair`] holding its encoded value, or the
/// configured default when that encoding is empty. Repeated keys yield
/// repeated pairs. Every other field is kept, in order, for the log line.
pub fn extract_dynamic_labels(
    labels: &LabelConfig,
    fields: Vec<Field>,
) -> (Vec<LabelPair>, Vec<Field>) {
    if labels.is_empty() {
        return (Vec::new(), fields);
    }

    let mut metadata = Vec::new();
    let mut remaining = Vec::with_capacity(fields.len());

    for field in fields {
        match labels.default_for(&field.key) {
            Some(default) => {
                let mut value = field.encode();
                if value.is_empty() {
                    value = default.to_string();
                }
                metadata.push(LabelPair { name: field.key, value });
            }
            None => remaining.push(field),
        }
    }

    (metadata, remaining)
}
