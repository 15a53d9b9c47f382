//! Typed structured fields and their canonical string encoding.
//!
//! Every value attached to a log event is carried as a [`Field`]: a key and a
//! [`FieldValue`] drawn from a closed set of kinds. [`encode`] renders any
//! field to the string form used both for structured metadata values and for
//! the inline `key=value` suffix of the log line. Encoding never fails; a
//! payload that cannot be rendered degrades to a bracketed placeholder.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Payload of a [`Field`], one variant per supported kind.
#[derive(Clone)]
pub enum FieldValue {
    Bool(bool),
    /// Raw bytes rendered as UTF-8 text without escaping.
    ByteString(Vec<u8>),
    Complex64 { re: f32, im: f32 },
    Complex128 { re: f64, im: f64 },
    /// Rendered as a count of nanoseconds.
    Duration(chrono::Duration),
    Float32(f32),
    Float64(f64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    String(String),
    /// Instant as nanoseconds since the Unix epoch, shown in `offset` or in
    /// the local zone when no offset is attached.
    Time { unix_nanos: i64, offset: Option<FixedOffset> },
    /// Full timestamp carrying its own offset.
    TimeFull(DateTime<FixedOffset>),
    Stringer(Arc<dyn fmt::Display + Send + Sync>),
    Error(Arc<dyn StdError + Send + Sync>),
    /// No-op marker, contributes nothing to the output.
    Skip,
    /// A payload of a kind this encoder does not know; holds its type name.
    Unsupported(String),
}

/// One structured logging attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Field {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn stringer<T>(key: impl Into<String>, value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        Field::new(key, FieldValue::Stringer(Arc::new(value)))
    }

    pub fn error<E>(key: impl Into<String>, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Field::new(key, FieldValue::Error(Arc::new(err)))
    }

    pub fn skip(key: impl Into<String>) -> Self {
        Field::new(key, FieldValue::Skip)
    }

    /// Canonical string form of this field's value.
    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Render a field's value to its canonical string.
///
/// Total over every [`FieldValue`]: `Skip` yields the empty string and a
/// value that cannot be rendered yields `<unsupported field "KEY" value>`.
pub fn encode(field: &Field) -> String {
    match &field.value {
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::ByteString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        FieldValue::Complex64 { re, im } => {
            format_complex(format_f32(*re), format_f32(*im))
        }
        FieldValue::Complex128 { re, im } => {
            format_complex(format_f64(*re), format_f64(*im))
        }
        FieldValue::Duration(d) => match d.num_nanoseconds() {
            Some(nanos) => nanos.to_string(),
            None => unsupported(&field.key),
        },
        FieldValue::Float32(v) => format_f32(*v),
        FieldValue::Float64(v) => format_f64(*v),
        FieldValue::Int8(v) => v.to_string(),
        FieldValue::Int16(v) => v.to_string(),
        FieldValue::Int32(v) => v.to_string(),
        FieldValue::Int64(v) => v.to_string(),
        FieldValue::Uint8(v) => v.to_string(),
        FieldValue::Uint16(v) => v.to_string(),
        FieldValue::Uint32(v) => v.to_string(),
        FieldValue::Uint64(v) => v.to_string(),
        FieldValue::String(s) => s.clone(),
        FieldValue::Time { unix_nanos, offset } => {
            let utc = DateTime::<Utc>::from_timestamp_nanos(*unix_nanos);
            match offset {
                Some(offset) => rfc3339(&utc.with_timezone(offset)),
                None => rfc3339(&utc.with_timezone(&Local)),
            }
        }
        FieldValue::TimeFull(t) => rfc3339(t),
        FieldValue::Stringer(v) => v.to_string(),
        FieldValue::Error(e) => e.to_string(),
        FieldValue::Skip => String::new(),
        FieldValue::Unsupported(_) => unsupported(&field.key),
    }
}

fn unsupported(key: &str) -> String {
    format!("<unsupported field \"{}\" value>", key)
}

fn rfc3339<Tz>(t: &DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: fmt::Display,
{
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn special_float(is_nan: bool, is_infinite: bool, positive: bool) -> Option<&'static str> {
    if is_nan {
        Some("NaN")
    } else if is_infinite {
        Some(if positive { "+Inf" } else { "-Inf" })
    } else {
        None
    }
}

// Display on floats is already shortest round-trip and never uses exponents.
fn format_f64(v: f64) -> String {
    special_float(v.is_nan(), v.is_infinite(), v.is_sign_positive())
        .map(str::to_string)
        .unwrap_or_else(|| v.to_string())
}

fn format_f32(v: f32) -> String {
    special_float(v.is_nan(), v.is_infinite(), v.is_sign_positive())
        .map(str::to_string)
        .unwrap_or_else(|| v.to_string())
}

fn format_complex(re: String, im: String) -> String {
    let sign = if im.starts_with('+') || im.starts_with('-') {
        ""
    } else {
        "+"
    };
    format!("({}{}{}i)", re, sign, im)
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::ByteString(v) => f.debug_tuple("ByteString").field(v).finish(),
            FieldValue::Complex64 { re, im } => f
                .debug_struct("Complex64")
                .field("re", re)
                .field("im", im)
                .finish(),
            FieldValue::Complex128 { re, im } => f
                .debug_struct("Complex128")
                .field("re", re)
                .field("im", im)
                .finish(),
            FieldValue::Duration(v) => f.debug_tuple("Duration").field(v).finish(),
            FieldValue::Float32(v) => f.debug_tuple("Float32").field(v).finish(),
            FieldValue::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            FieldValue::Int8(v) => f.debug_tuple("Int8").field(v).finish(),
            FieldValue::Int16(v) => f.debug_tuple("Int16").field(v).finish(),
            FieldValue::Int32(v) => f.debug_tuple("Int32").field(v).finish(),
            FieldValue::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            FieldValue::Uint8(v) => f.debug_tuple("Uint8").field(v).finish(),
            FieldValue::Uint16(v) => f.debug_tuple("Uint16").field(v).finish(),
            FieldValue::Uint32(v) => f.debug_tuple("Uint32").field(v).finish(),
            FieldValue::Uint64(v) => f.debug_tuple("Uint64").field(v).finish(),
            FieldValue::String(v) => f.debug_tuple("String").field(v).finish(),
            FieldValue::Time { unix_nanos, offset } => f
                .debug_struct("Time")
                .field("unix_nanos", unix_nanos)
                .field("offset", offset)
                .finish(),
            FieldValue::TimeFull(v) => f.debug_tuple("TimeFull").field(v).finish(),
            FieldValue::Stringer(v) => f.debug_tuple("Stringer").field(&v.to_string()).finish(),
            FieldValue::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
            FieldValue::Skip => f.write_str("Skip"),
            FieldValue::Unsupported(ty) => f.debug_tuple("Unsupported").field(ty).finish(),
        }
    }
}

// Floats compare bitwise so NaN payloads equal themselves; opaque payloads
// compare by their rendered text.
impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (ByteString(a), ByteString(b)) => a == b,
            (Complex64 { re: ar, im: ai }, Complex64 { re: br, im: bi }) => {
                ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits()
            }
            (Complex128 { re: ar, im: ai }, Complex128 { re: br, im: bi }) => {
                ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits()
            }
            (Duration(a), Duration(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Uint8(a), Uint8(b)) => a == b,
            (Uint16(a), Uint16(b)) => a == b,
            (Uint32(a), Uint32(b)) => a == b,
            (Uint64(a), Uint64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (
                Time { unix_nanos: an, offset: ao },
                Time { unix_nanos: bn, offset: bo },
            ) => an == bn && ao == bo,
            (TimeFull(a), TimeFull(b)) => a == b,
            (Stringer(a), Stringer(b)) => a.to_string() == b.to_string(),
            (Error(a), Error(b)) => a.to_string() == b.to_string(),
            (Skip, Skip) => true,
            (Unsupported(a), Unsupported(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    f32 => Float32,
    f64 => Float64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    String => String,
    Vec<u8> => ByteString,
    chrono::Duration => Duration,
    DateTime<FixedOffset> => TimeFull,
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::ByteString(v.to_vec())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::TimeFull(v.fixed_offset())
    }
}

impl From<std::time::Duration> for FieldValue {
    fn from(v: std::time::Duration) -> Self {
        match chrono::Duration::from_std(v) {
            Ok(d) => FieldValue::Duration(d),
            Err(_) => FieldValue::Unsupported("std::time::Duration".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn enc(value: impl Into<FieldValue>) -> String {
        Field::new("k", value).encode()
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom: disk full")
        }
    }

    impl StdError for Boom {}

    #[test]
    fn encodes_scalars() {
        assert_eq!(enc(true), "true");
        assert_eq!(enc(false), "false");
        assert_eq!(enc(-42i64), "-42");
        assert_eq!(enc(-8i8), "-8");
        assert_eq!(enc(65535u16), "65535");
        assert_eq!(enc(u64::MAX), "18446744073709551615");
        assert_eq!(enc("plain \"text\""), "plain \"text\"");
        assert_eq!(enc(b"raw bytes".to_vec()), "raw bytes");
    }

    #[test]
    fn encodes_floats_shortest() {
        assert_eq!(enc(3.5f64), "3.5");
        assert_eq!(enc(1.0f64), "1");
        assert_eq!(enc(0.1f32), "0.1");
        assert_eq!(enc(1e21f64), "1000000000000000000000");
        assert_eq!(enc(f64::NAN), "NaN");
        assert_eq!(enc(f64::INFINITY), "+Inf");
        assert_eq!(enc(f32::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn encodes_complex() {
        assert_eq!(enc(FieldValue::Complex128 { re: 1.5, im: 2.0 }), "(1.5+2i)");
        assert_eq!(enc(FieldValue::Complex64 { re: 0.0, im: -0.25 }), "(0-0.25i)");
        assert_eq!(
            enc(FieldValue::Complex128 { re: 1.0, im: f64::NAN }),
            "(1+NaNi)"
        );
    }

    #[test]
    fn encodes_duration_as_nanoseconds() {
        assert_eq!(enc(chrono::Duration::milliseconds(1500)), "1500000000");
        assert_eq!(enc(chrono::Duration::nanoseconds(-3)), "-3");
        assert_eq!(enc(std::time::Duration::from_micros(2)), "2000");
    }

    #[test]
    fn encodes_time_in_attached_zone() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let nanos = 1_700_000_000_000_000_000i64;
        let value = FieldValue::Time { unix_nanos: nanos, offset: Some(offset) };
        assert_eq!(enc(value), "2023-11-15T00:13:20+02:00");

        let utc = FieldValue::Time { unix_nanos: nanos, offset: FixedOffset::east_opt(0) };
        assert_eq!(enc(utc), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn encodes_full_time_in_own_zone() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let t = offset.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(enc(t), "2024-03-01T08:30:00-05:00");
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(enc(utc), "2024-03-01T08:30:00Z");
    }

    #[test]
    fn encodes_stringer_and_error() {
        assert_eq!(Field::stringer("addr", "10.0.0.1:80").encode(), "10.0.0.1:80");
        assert_eq!(Field::error("err", Boom).encode(), "boom: disk full");
    }

    #[test]
    fn skip_is_empty_and_unsupported_is_placeholder() {
        assert_eq!(Field::skip("gone").encode(), "");
        let f = Field::new("weird", FieldValue::Unsupported("Box<dyn Any>".into()));
        assert_eq!(f.encode(), "<unsupported field \"weird\" value>");
    }

    #[test]
    fn overflowing_duration_is_placeholder() {
        let f = Field::new("d", chrono::Duration::MAX);
        assert_eq!(f.encode(), "<unsupported field \"d\" value>");
    }
}
