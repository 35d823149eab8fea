//! Scalar cell values.
//!
//! Every row flowing through the pipeline (adapter output, merged rows,
//! calculated columns, aggregates) is a mapping from column name to
//! [`ScalarValue`]. The engine deliberately supports a small closed set of
//! scalar types; anything richer lives in the opaque visualization hints.
//!
//! # Comparison semantics
//!
//! `ScalarValue` carries a total order so group keys, distinct counts, and
//! result ordering are deterministic:
//!
//! - Values of different kinds order by kind: Null < Bool < numeric <
//!   Timestamp < String.
//! - `Long` and `Double` form one numeric class and compare mathematically:
//!   `Long(3)` equals `Double(3.0)`. Equal values compare as `Equal`
//!   regardless of representation.
//! - NaN is pinned into the order (negative NaN before all numbers, positive
//!   NaN after) so sorting never panics and never loses elements.
//!
//! `Hash` agrees with `Eq`: integrally-representable numerics hash through
//! their `i64` value, so `Long(3)` and `Double(3.0)` land in the same bucket.
//!
//! # Serialization
//!
//! Untagged: JSON null/bool/number/string map onto the natural variants.
//! `Timestamp` serializes as an RFC 3339 string and therefore deserializes
//! as `String`; timestamp-typed columns are re-interpreted against the
//! catalog's declared field type where comparison needs it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

/// Largest integer magnitude exactly representable as f64 (2^53).
const MAX_SAFE_F64_INT: u64 = 1 << 53;

fn i64_fits_f64(v: i64) -> bool {
    v.unsigned_abs() <= MAX_SAFE_F64_INT
}

/// Compare an i64 against an f64 without precision loss.
///
/// NaN placement follows IEEE total order: negative NaN sorts before every
/// number, positive NaN after, matching the Double/Double fallback.
fn long_double_cmp(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        return if b.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if i64_fits_f64(a) {
        return (a as f64).partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    // |a| > 2^53: f64 spacing exceeds 1 here, compare through truncation.
    if b >= i64::MAX as f64 {
        return Ordering::Less;
    }
    if b < i64::MIN as f64 {
        return Ordering::Greater;
    }
    let truncated = b.trunc() as i64;
    match a.cmp(&truncated) {
        Ordering::Equal => {
            if b.fract() > 0.0 {
                Ordering::Less
            } else if b.fract() < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        ord => ord,
    }
}

/// An f64 that is exactly an i64, if it is one.
///
/// Used to make `Hash` agree with the numeric-class `Eq`: `Double(3.0)`
/// must hash like `Long(3)`.
fn integral_i64(d: f64) -> Option<i64> {
    if d.is_finite() && d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64 {
        Some(d as i64)
    } else {
        None
    }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarValue::Long(_) | ScalarValue::Double(_))
    }

    /// Numeric view of the value; `Long` widens to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Long(n) => Some(*n as f64),
            ScalarValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ScalarValue::Timestamp(t) => Some(*t),
            // RFC 3339 strings are accepted wherever a timestamp is expected;
            // adapters store document timestamps as strings.
            ScalarValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Kind label used in error and warning messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Long(_) => "long",
            ScalarValue::Double(_) => "double",
            ScalarValue::String(_) => "string",
            ScalarValue::Timestamp(_) => "timestamp",
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Bool(_) => 1,
            ScalarValue::Long(_) | ScalarValue::Double(_) => 2,
            ScalarValue::Timestamp(_) => 3,
            ScalarValue::String(_) => 4,
        }
    }

    /// Total order over all scalar values. See the module docs.
    pub fn cmp_values(&self, other: &Self) -> Ordering {
        let rank = self.kind_rank().cmp(&other.kind_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a.cmp(b),
            (ScalarValue::Long(a), ScalarValue::Long(b)) => a.cmp(b),
            (ScalarValue::Double(a), ScalarValue::Double(b)) => {
                // partial_cmp keeps -0.0 == +0.0; total_cmp settles NaN.
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (ScalarValue::Long(a), ScalarValue::Double(b)) => long_double_cmp(*a, *b),
            (ScalarValue::Double(a), ScalarValue::Long(b)) => long_double_cmp(*b, *a).reverse(),
            (ScalarValue::Timestamp(a), ScalarValue::Timestamp(b)) => a.cmp(b),
            (ScalarValue::String(a), ScalarValue::String(b)) => a.cmp(b),
            // Unreachable: equal ranks always pair within one arm above.
            _ => Ordering::Equal,
        }
    }

    /// Convert a JSON value into a scalar.
    ///
    /// Integers become `Long`, other numbers `Double`; arrays and objects
    /// have no scalar form and collapse to `Null`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ScalarValue::Null,
            serde_json::Value::Bool(b) => ScalarValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ScalarValue::Long(i)
                } else if let Some(f) = n.as_f64() {
                    ScalarValue::Double(f)
                } else {
                    ScalarValue::Null
                }
            }
            serde_json::Value::String(s) => ScalarValue::String(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => ScalarValue::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScalarValue::Null => serde_json::Value::Null,
            ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
            ScalarValue::Long(n) => serde_json::Value::from(*n),
            ScalarValue::Double(d) => {
                serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, Into::into)
            }
            ScalarValue::String(s) => serde_json::Value::String(s.clone()),
            ScalarValue::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_values(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_values(other)
    }
}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;
        match self {
            ScalarValue::Null => state.write_u8(0),
            ScalarValue::Bool(b) => {
                state.write_u8(1);
                state.write_u8(*b as u8);
            }
            ScalarValue::Long(n) => {
                state.write_u8(2);
                state.write_i64(*n);
            }
            ScalarValue::Double(d) => {
                state.write_u8(2);
                match integral_i64(*d) {
                    Some(n) => state.write_i64(n),
                    None => {
                        let bits = if d.is_nan() {
                            CANONICAL_NAN_BITS
                        } else {
                            d.to_bits()
                        };
                        state.write_u64(bits);
                    }
                }
            }
            ScalarValue::Timestamp(t) => {
                state.write_u8(3);
                state.write_i64(t.timestamp_micros());
            }
            ScalarValue::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Long(n) => write!(f, "{n}"),
            ScalarValue::Double(d) => write!(f, "{d}"),
            ScalarValue::String(s) => write!(f, "{s}"),
            ScalarValue::Timestamp(t) => {
                write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Long(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Long(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Double(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(v: DateTime<Utc>) -> Self {
        ScalarValue::Timestamp(v)
    }
}
