//! JSON to record flattening
//!
//! Nested objects become dotted column names (`price_overview.final`).
//! Arrays are kept whole as compact JSON text, since their length varies per
//! record and they do not map onto a fixed column set.

use serde_json::{Map, Number, Value};
use steam_ml_common::types::{Record, Scalar};

/// Separator between the segments of a flattened column name
pub const PATH_SEPARATOR: char = '.';

/// Convert a JSON leaf to a scalar. Arrays and objects are rendered as
/// compact JSON text.
pub fn scalar_from_json(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => scalar_from_number(n),
        Value::String(s) => Scalar::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => Scalar::Str(value.to_string()),
    }
}

fn scalar_from_number(n: &Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::Int(i)
    } else {
        // u64 beyond i64::MAX, or a real float
        n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null)
    }
}

/// Flatten a JSON object into a record.
///
/// ```
/// use serde_json::json;
/// use steam_ml_common::types::Scalar;
/// use steam_ml_ingest::normalize::flatten_object;
///
/// let body = json!({"name": "Portal", "platforms": {"linux": true}, "dlc": [1, 2]});
/// let record = flatten_object(body.as_object().unwrap());
///
/// assert_eq!(record["platforms.linux"], Scalar::Bool(true));
/// assert_eq!(record["dlc"], Scalar::from("[1,2]"));
/// ```
pub fn flatten_object(object: &Map<String, Value>) -> Record {
    let mut record = Record::new();
    flatten_into(&mut record, None, object);
    record
}

fn flatten_into(out: &mut Record, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let column = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, PATH_SEPARATOR, key),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(out, Some(&column), nested),
            leaf => {
                out.insert(column, scalar_from_json(leaf));
            },
        }
    }
}

/// Integer identifier carried by a JSON value, if any.
///
/// Accepts integers and strings holding an integer, as upstream uses both.
pub fn json_appid(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
