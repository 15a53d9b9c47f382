use crate::field::{Field, FieldValue};
use crate::record::LogEvent;

const SEPARATOR: &str = " ";
const FIELD_SEPARATOR: &str = ", ";

/// Renders a log event and its inline fields into one log line.
///
/// Closures of the shape `Fn(&LogEvent, &[Field]) -> String` implement this
/// trait, so a custom format can be supplied without a dedicated type.
pub trait LineBuilder: Send + Sync {
    fn build(&self, event: &LogEvent, fields: &[Field]) -> String;
}

impl<F> LineBuilder for F
where
    F: Fn(&LogEvent, &[Field]) -> String + Send + Sync,
{
    fn build(&self, event: &LogEvent, fields: &[Field]) -> String {
        self(event, fields)
    }
}

/// What the `caller=` segment of the default line shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallerFormat {
    /// Repeat the level string. Matches lines already produced by existing
    /// deployments, which dashboards and queries may depend on.
    #[default]
    Level,
    /// The call site as `file:line`, or `unknown` when none was recorded.
    Location,
}

/// `level=<level> caller=<caller> <message>[, key=value...][ <stack>]`
#[derive(Debug, Clone, Default)]
pub struct DefaultLineBuilder {
    pub print_field_key: bool,
    pub caller_format: CallerFormat,
}

impl DefaultLineBuilder {
    pub fn new(print_field_key: bool, caller_format: CallerFormat) -> Self {
        DefaultLineBuilder {
            print_field_key,
            caller_format,
        }
    }
}

impl LineBuilder for DefaultLineBuilder {
    fn build(&self, event: &LogEvent, fields: &[Field]) -> String {
        let mut line = String::with_capacity(event.message.len() + 32);

        line.push_str("level=");
        line.push_str(event.level.as_str());

        line.push_str(SEPARATOR);
        line.push_str("caller=");
        match self.caller_format {
            CallerFormat::Level => line.push_str(event.level.as_str()),
            CallerFormat::Location => match &event.caller {
                Some(caller) => line.push_str(&caller.to_string()),
                None => line.push_str("unknown"),
            },
        }

        line.push_str(SEPARATOR);
        line.push_str(&event.message);
        line.push_str(&fields_to_str(fields, self.print_field_key));

        if event.level.is_error_or_above() {
            if let Some(stack) = event.stack.as_deref().filter(|s| !s.is_empty()) {
                line.push_str(SEPARATOR);
                line.push_str(stack);
            }
        }

        line
    }
}

/// Inline suffix: `", "` before every field, optionally followed by `key=`.
/// Skip fields leave no trace, separator included.
pub fn fields_to_str(fields: &[Field], print_field_key: bool) -> String {
    let mut out = String::new();
    for field in fields.iter().filter(|f| !matches!(f.value, FieldValue::Skip)) {
        out.push_str(FIELD_SEPARATOR);
        if print_field_key {
            out.push_str(&field.key);
            out.push('=');
        }
        out.push_str(&field.encode());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::record::Caller;

    #[test]
    fn caller_segment_repeats_level_by_default() {
        let event = LogEvent::new(Level::Info, "started");
        let line = DefaultLineBuilder::default().build(&event, &[]);
        assert_eq!(line, "level=info caller=info started");
    }

    #[test]
    fn caller_segment_can_show_location() {
        let builder = DefaultLineBuilder::new(false, CallerFormat::Location);
        let event = LogEvent::new(Level::Warn, "slow").with_caller(Caller::new("src/db.rs", Some(42)));
        assert_eq!(builder.build(&event, &[]), "level=warn caller=src/db.rs:42 slow");

        let bare = LogEvent::new(Level::Warn, "slow");
        assert_eq!(builder.build(&bare, &[]), "level=warn caller=unknown slow");
    }

    #[test]
    fn suffix_follows_field_order() {
        let fields = vec![
            Field::new("a", 1i64),
            Field::new("b", "two"),
            Field::new("c", true),
        ];
        let event = LogEvent::new(Level::Info, "done");

        let plain = DefaultLineBuilder::default().build(&event, &fields);
        assert_eq!(plain, "level=info caller=info done, 1, two, true");

        let keyed = DefaultLineBuilder::new(true, CallerFormat::Level).build(&event, &fields);
        assert_eq!(keyed, "level=info caller=info done, a=1, b=two, c=true");
    }

    #[test]
    fn skip_fields_leave_no_separator() {
        let event = LogEvent::new(Level::Info, "started");

        let trailing = DefaultLineBuilder::default().build(&event, &[Field::skip("gone")]);
        assert_eq!(trailing, "level=info caller=info started");

        let fields = vec![Field::new("a", 1i64), Field::skip("gone"), Field::new("b", "x")];
        let keyed = DefaultLineBuilder::new(true, CallerFormat::Level).build(&event, &fields);
        assert_eq!(keyed, "level=info caller=info started, a=1, b=x");
    }

    #[test]
    fn stack_appended_only_for_errors() {
        let error = LogEvent::new(Level::Error, "failed").with_stack("main.rs:1\nlib.rs:2");
        let line = DefaultLineBuilder::default().build(&error, &[Field::new("id", 7u32)]);
        assert_eq!(line, "level=error caller=error failed, 7 main.rs:1\nlib.rs:2");
        assert!(line.ends_with("main.rs:1\nlib.rs:2"));

        let fatal = LogEvent::new(Level::Fatal, "bye").with_stack("trace");
        assert!(DefaultLineBuilder::default().build(&fatal, &[]).ends_with(" trace"));

        let warn = LogEvent::new(Level::Warn, "meh").with_stack("trace");
        assert_eq!(DefaultLineBuilder::default().build(&warn, &[]), "level=warn caller=warn meh");

        let empty = LogEvent::new(Level::Error, "x").with_stack("");
        assert_eq!(DefaultLineBuilder::default().build(&empty, &[]), "level=error caller=error x");
    }

    #[test]
    fn closures_are_line_builders() {
        let builder = |event: &LogEvent, fields: &[Field]| format!("{}|{}", event.message, fields.len());
        let event = LogEvent::new(Level::Debug, "m");
        assert_eq!(LineBuilder::build(&builder, &event, &[Field::skip("s")]), "m|1");
    }
}
