//! Conversions between driver values and JSON.
//!
//! Reads go CQL → JSON unconditionally. Writes go JSON → CQL driven by the
//! column's type tag from `system_schema.columns.type`, so prepared statements
//! receive values of the exact type the server expects.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc};
use num_bigint::BigInt;
use scylla_cql::frame::response::result::CqlValue;
use scylla_cql::frame::value::{
    CqlDate, CqlDecimal, CqlDuration, CqlTime, CqlTimestamp, CqlTimeuuid, CqlVarint,
};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

pub fn cql_value_to_json(v: &CqlValue) -> Value {
    match v {
        CqlValue::Boolean(b) => Value::Bool(*b),
        CqlValue::TinyInt(i) => Value::from(*i),
        CqlValue::SmallInt(i) => Value::from(*i),
        CqlValue::Int(i) => Value::from(*i),
        CqlValue::BigInt(i) => Value::from(*i),
        CqlValue::Counter(c) => Value::from(c.0),
        CqlValue::Float(f) => Value::from(*f),
        CqlValue::Double(f) => Value::from(*f),
        CqlValue::Ascii(s) | CqlValue::Text(s) => Value::from(s.clone()),
        CqlValue::Uuid(u) => Value::from(u.to_string()),
        CqlValue::Timeuuid(u) => Value::from(u.to_string()),
        CqlValue::Inet(addr) => Value::from(addr.to_string()),
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.0)
            .map(|d| Value::from(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .unwrap_or_else(|| Value::from(ts.0)),
        CqlValue::Date(d) => date_to_string(d).map(Value::from).unwrap_or_else(|| Value::from(d.0)),
        CqlValue::Time(t) => time_to_string(t).map(Value::from).unwrap_or_else(|| Value::from(t.0)),
        CqlValue::Duration(d) => Value::from(duration_to_string(d)),
        CqlValue::Decimal(d) => {
            let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
            Value::from(BigDecimal::new(BigInt::from_signed_bytes_be(bytes), i64::from(scale)).to_string())
        }
        CqlValue::Varint(v) => Value::from(BigInt::from_signed_bytes_be(v.as_signed_bytes_be_slice()).to_string()),
        CqlValue::Blob(bytes) => Value::from(B64.encode(bytes)),
        CqlValue::Empty => Value::Null,
        CqlValue::List(items) | CqlValue::Set(items) => {
            Value::Array(items.iter().map(cql_value_to_json).collect())
        }
        CqlValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (cql_map_key_to_string(k), cql_value_to_json(v)))
                .collect(),
        ),
        CqlValue::Tuple(values) => Value::Array(
            values
                .iter()
                .map(|opt| opt.as_ref().map(cql_value_to_json).unwrap_or(Value::Null))
                .collect(),
        ),
        CqlValue::UserDefinedType { fields, .. } => Value::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    let json = value.as_ref().map(cql_value_to_json).unwrap_or(Value::Null);
                    (name.clone(), json)
                })
                .collect(),
        ),
        #[allow(unreachable_patterns)]
        _ => Value::from(format!("{:?}", v)),
    }
}

fn cql_map_key_to_string(k: &CqlValue) -> String {
    match k {
        CqlValue::Ascii(s) | CqlValue::Text(s) => s.clone(),
        other => match cql_value_to_json(other) {
            Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

/// Parsed CQL type tag, limited to what the write path can bind.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CqlType {
    Text,
    Ascii,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Uuid,
    Timeuuid,
    Timestamp,
    Date,
    Time,
    Duration,
    Decimal,
    Varint,
    Blob,
    Inet,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
}

fn parse_type(tag: &str) -> Result<CqlType, String> {
    let tag = tag.trim();
    if let Some(inner) = generic_args(tag, "frozen") {
        return parse_type(inner);
    }
    if let Some(inner) = generic_args(tag, "list") {
        return Ok(CqlType::List(Box::new(parse_type(inner)?)));
    }
    if let Some(inner) = generic_args(tag, "set") {
        return Ok(CqlType::Set(Box::new(parse_type(inner)?)));
    }
    if let Some(inner) = generic_args(tag, "map") {
        let args = split_top_level(inner).ok_or_else(|| format!("malformed map type '{}'", tag))?;
        let [k, v] = args.as_slice() else {
            return Err(format!("malformed map type '{}'", tag));
        };
        return Ok(CqlType::Map(Box::new(parse_type(k)?), Box::new(parse_type(v)?)));
    }
    if let Some(inner) = generic_args(tag, "tuple") {
        let args = split_top_level(inner).ok_or_else(|| format!("malformed tuple type '{}'", tag))?;
        return args
            .into_iter()
            .map(parse_type)
            .collect::<Result<Vec<_>, _>>()
            .map(CqlType::Tuple);
    }
    Ok(match tag {
        "text" | "varchar" => CqlType::Text,
        "ascii" => CqlType::Ascii,
        "boolean" => CqlType::Boolean,
        "tinyint" => CqlType::TinyInt,
        "smallint" => CqlType::SmallInt,
        "int" => CqlType::Int,
        "bigint" => CqlType::BigInt,
        "float" => CqlType::Float,
        "double" => CqlType::Double,
        "uuid" => CqlType::Uuid,
        "timeuuid" => CqlType::Timeuuid,
        "timestamp" => CqlType::Timestamp,
        "date" => CqlType::Date,
        "time" => CqlType::Time,
        "duration" => CqlType::Duration,
        "decimal" => CqlType::Decimal,
        "varint" => CqlType::Varint,
        "blob" => CqlType::Blob,
        "inet" => CqlType::Inet,
        other => return Err(format!("writing '{}' columns is not supported", other)),
    })
}

fn generic_args<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    tag.strip_prefix(name)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
}

/// Splits type arguments at the commas that are not nested inside `<...>`.
fn split_top_level(args: &str) -> Option<Vec<&str>> {
    let mut depth = 0usize;
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&args[start..]);
    Some(parts)
}

/// Converts a JSON payload value into a bind value for a column of type
/// `cql_type`. JSON null binds null. The error is a human-readable reason.
pub fn json_to_cql(cql_type: &str, value: &Value) -> Result<Option<CqlValue>, String> {
    if value.is_null() {
        return Ok(None);
    }
    let ty = parse_type(cql_type)?;
    convert(&ty, value).map(Some)
}

fn convert(ty: &CqlType, value: &Value) -> Result<CqlValue, String> {
    match ty {
        CqlType::Text => Ok(CqlValue::Text(text_of(value)?)),
        CqlType::Ascii => {
            let s = text_of(value)?;
            if !s.is_ascii() {
                return Err("value is not ASCII".to_string());
            }
            Ok(CqlValue::Ascii(s))
        }
        CqlType::Boolean => match value {
            Value::Bool(b) => Ok(CqlValue::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(CqlValue::Boolean(true)),
                "false" => Ok(CqlValue::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            _ => Err(expected("a boolean", value)),
        },
        CqlType::TinyInt => narrow(integer_of(value)?).map(CqlValue::TinyInt),
        CqlType::SmallInt => narrow(integer_of(value)?).map(CqlValue::SmallInt),
        CqlType::Int => narrow(integer_of(value)?).map(CqlValue::Int),
        CqlType::BigInt => integer_of(value).map(CqlValue::BigInt),
        CqlType::Float => float_of(value).map(|f| CqlValue::Float(f as f32)),
        CqlType::Double => float_of(value).map(CqlValue::Double),
        CqlType::Uuid => uuid_of(value).map(CqlValue::Uuid),
        CqlType::Timeuuid => uuid_of(value).map(|u| CqlValue::Timeuuid(CqlTimeuuid::from(u))),
        CqlType::Timestamp => timestamp_of(value).map(|ms| CqlValue::Timestamp(CqlTimestamp(ms))),
        CqlType::Date => date_of(value).map(CqlValue::Date),
        CqlType::Time => time_of(value).map(CqlValue::Time),
        CqlType::Duration => duration_of(&text_of(value)?).map(CqlValue::Duration),
        CqlType::Decimal => {
            let s = text_of(value)?;
            let decimal = BigDecimal::from_str(s.trim())
                .map_err(|e| format!("'{}' is not a decimal: {}", s, e))?;
            let (digits, scale) = decimal.as_bigint_and_exponent();
            let scale = i32::try_from(scale).map_err(|_| format!("'{}' has too many digits", s))?;
            Ok(CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(
                digits.to_signed_bytes_be(),
                scale,
            )))
        }
        CqlType::Varint => {
            let s = text_of(value)?;
            let int = BigInt::from_str(s.trim()).map_err(|e| format!("'{}' is not an integer: {}", s, e))?;
            Ok(CqlValue::Varint(CqlVarint::from_signed_bytes_be(int.to_signed_bytes_be())))
        }
        CqlType::Blob => {
            let s = text_of(value)?;
            B64.decode(s.as_bytes())
                .map(CqlValue::Blob)
                .map_err(|e| format!("blob must be base64: {}", e))
        }
        CqlType::Inet => {
            let s = text_of(value)?;
            s.parse::<IpAddr>()
                .map(CqlValue::Inet)
                .map_err(|e| format!("'{}' is not an IP address: {}", s, e))
        }
        CqlType::List(inner) => elements(inner, value).map(CqlValue::List),
        CqlType::Set(inner) => elements(inner, value).map(CqlValue::Set),
        CqlType::Map(k, v) => match value {
            Value::Object(entries) => entries
                .iter()
                .map(|(key, val)| {
                    let key = convert(k, &Value::String(key.clone()))?;
                    let val = convert(v, val)?;
                    Ok((key, val))
                })
                .collect::<Result<Vec<_>, String>>()
                .map(CqlValue::Map),
            _ => Err(expected("an object", value)),
        },
        CqlType::Tuple(types) => match value {
            Value::Array(items) if items.len() == types.len() => types
                .iter()
                .zip(items)
                .map(|(ty, item)| match item {
                    Value::Null => Ok(None),
                    item => convert(ty, item).map(Some),
                })
                .collect::<Result<Vec<_>, String>>()
                .map(CqlValue::Tuple),
            Value::Array(items) => Err(format!(
                "expected {} tuple elements, got {}",
                types.len(),
                items.len()
            )),
            _ => Err(expected("an array", value)),
        },
    }
}

fn elements(inner: &CqlType, value: &Value) -> Result<Vec<CqlValue>, String> {
    match value {
        Value::Array(items) => items.iter().map(|item| convert(inner, item)).collect(),
        _ => Err(expected("an array", value)),
    }
}

fn expected(what: &str, value: &Value) -> String {
    format!("expected {}, got {}", what, value)
}

fn text_of(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(expected("a string", value)),
    }
}

fn integer_of(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => integer_of_number(n),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        _ => Err(expected("an integer", value)),
    }
}

fn integer_of_number(n: &Number) -> Result<i64, String> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(format!("{} is not an integer", n)),
    }
}

fn narrow<T: TryFrom<i64>>(i: i64) -> Result<T, String> {
    T::try_from(i).map_err(|_| format!("{} is out of range", i))
}

fn float_of(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{} is not a number", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", s)),
        _ => Err(expected("a number", value)),
    }
}

fn uuid_of(value: &Value) -> Result<Uuid, String> {
    let s = text_of(value)?;
    Uuid::parse_str(s.trim()).map_err(|e| format!("'{}' is not a uuid: {}", s, e))
}

/// Epoch milliseconds, an RFC 3339 timestamp, or a UTC `yyyy-mm-dd[ hh:mm:ss]`.
fn timestamp_of(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => integer_of_number(n),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Ok(ms);
            }
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Ok(d.timestamp_millis());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Ok(dt.and_utc().timestamp_millis());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
                .map_err(|_| format!("'{}' is not a timestamp", s))
        }
        _ => Err(expected("a timestamp", value)),
    }
}

/// `date` values count days from 1970-01-01, offset by 2^31.
const DATE_EPOCH_OFFSET: i64 = 1 << 31;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

fn date_to_string(date: &CqlDate) -> Option<String> {
    let days = i64::from(date.0) - DATE_EPOCH_OFFSET;
    let day = if days >= 0 {
        unix_epoch().checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        unix_epoch().checked_sub_days(Days::new(days.unsigned_abs()))
    };
    day.map(|d| d.format("%Y-%m-%d").to_string())
}

/// A `yyyy-mm-dd` string, or the raw day count the server stores.
fn date_of(value: &Value) -> Result<CqlDate, String> {
    let raw = match value {
        Value::Number(n) => integer_of_number(n)?,
        Value::String(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(d) => d.signed_duration_since(unix_epoch()).num_days() + DATE_EPOCH_OFFSET,
            Err(_) => return Err(format!("'{}' is not a date", s)),
        },
        _ => return Err(expected("a date", value)),
    };
    u32::try_from(raw)
        .map(CqlDate)
        .map_err(|_| format!("{} is out of range for a date", value))
}

fn time_to_string(time: &CqlTime) -> Option<String> {
    let secs = u32::try_from(time.0.div_euclid(NANOS_PER_SECOND)).ok()?;
    let nanos = u32::try_from(time.0.rem_euclid(NANOS_PER_SECOND)).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(|t| t.format("%H:%M:%S%.f").to_string())
}

/// `hh:mm[:ss[.fffffffff]]`, or nanoseconds since midnight.
fn time_of(value: &Value) -> Result<CqlTime, String> {
    match value {
        Value::Number(n) => integer_of_number(n).map(CqlTime),
        Value::String(s) => ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
            .map(|t| {
                CqlTime(
                    i64::from(t.num_seconds_from_midnight()) * NANOS_PER_SECOND
                        + i64::from(t.nanosecond()),
                )
            })
            .ok_or_else(|| format!("'{}' is not a time of day", s)),
        _ => Err(expected("a time of day", value)),
    }
}

const DURATION_UNITS: [(&str, i64); 6] = [
    ("h", 3_600 * NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("s", NANOS_PER_SECOND),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
];

/// Renders a duration in the unit notation `1y2mo3d4h5m6s7ms8us9ns`.
fn duration_to_string(d: &CqlDuration) -> String {
    let negative = d.months < 0 || d.days < 0 || d.nanoseconds < 0;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    let months = i64::from(d.months).abs();
    let mut nanos = d.nanoseconds.unsigned_abs();
    for (amount, unit) in [(months / 12, "y"), (months % 12, "mo"), (i64::from(d.days).abs(), "d")] {
        if amount != 0 {
            let _ = write!(out, "{}{}", amount, unit);
        }
    }
    for (unit, size) in DURATION_UNITS {
        let size = size.unsigned_abs();
        if nanos >= size {
            let _ = write!(out, "{}{}", nanos / size, unit);
            nanos %= size;
        }
    }
    if out.len() == usize::from(negative) {
        out.push_str("0s");
    }
    out
}

/// Parses `[-]` followed by `<n><unit>` groups with units `y mo w d h m s ms us µs ns`.
fn duration_of(text: &str) -> Result<CqlDuration, String> {
    let invalid = || format!("'{}' is not a duration", text);
    let trimmed = text.trim();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    let (mut months, mut days, mut nanos) = (0i64, 0i64, 0i64);
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let amount: i64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = rest[..unit_len].to_ascii_lowercase();
        rest = &rest[unit_len..];
        let (slot, factor) = match unit.as_str() {
            "y" => (&mut months, 12),
            "mo" => (&mut months, 1),
            "w" => (&mut days, 7),
            "d" => (&mut days, 1),
            "µs" => (&mut nanos, 1_000),
            other => match DURATION_UNITS.iter().find(|(u, _)| *u == other) {
                Some((_, size)) => (&mut nanos, *size),
                None => return Err(invalid()),
            },
        };
        let total = amount
            .checked_mul(factor)
            .and_then(|v| slot.checked_add(v))
            .ok_or_else(invalid)?;
        *slot = total;
    }
    let sign = if negative { -1 } else { 1 };
    Ok(CqlDuration {
        months: i32::try_from(months * sign).map_err(|_| invalid())?,
        days: i32::try_from(days * sign).map_err(|_| invalid())?,
        nanoseconds: nanos * sign,
    })
}

/// Builds a JSON row from column names and driver cells; absent cells map to null.
pub fn row_to_json<'a>(
    names: impl IntoIterator<Item = &'a str>,
    cells: &[Option<CqlValue>],
) -> Map<String, Value> {
    let mut m = Map::new();
    for (i, name) in names.into_iter().enumerate() {
        let json = match cells.get(i).and_then(|o| o.as_ref()) {
            Some(c) => cql_value_to_json(c),
            None => Value::Null,
        };
        m.insert(name.to_string(), json);
    }
    m
}
