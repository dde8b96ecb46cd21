//! Record types shared across steam-ml
//!
//! Upstream payloads drift: the same attribute can arrive as a number in one
//! response and as a string in the next. Records are therefore modelled as an
//! ordered map from column name to a tagged [`Scalar`] instead of fixed
//! structs, and the columnar store decides a column's physical type at write
//! time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a snapshot: column name to value.
pub type Record = BTreeMap<String, Scalar>;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer view of the value.
    ///
    /// Strings holding a plain integer and integral floats convert too, since
    /// identifier columns may have been coerced to text by an earlier write.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Str(s) => s.trim().parse().ok(),
            Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Canonical text used to compare values of a key column.
    ///
    /// `Int(42)` and `Str("42")` produce the same key. Null has no key.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            other => other.as_i64().map(|v| v.to_string()).or_else(|| Some(other.render())),
        }
    }

    /// Text rendering used when a column is coerced to strings.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s.clone(),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            other => f.write_str(&other.render()),
        }
    }
}

/// Build a [`Record`] from `(column, value)` pairs.
///
/// ```
/// use steam_ml_common::types::{record, Scalar};
///
/// let row = record([("appid", Scalar::Int(10)), ("name", "Counter-Strike".into())]);
/// assert_eq!(row["appid"], Scalar::Int(10));
/// ```
pub fn record<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Scalar)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
