use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value};
use sqlx::{mysql::MySqlRow, Column, Row, TypeInfo, ValueRef};

/// Converts a row fetched over the text protocol into a JSON object keyed by
/// column name, in result-set order.
pub fn row_to_json(row: &MySqlRow) -> Result<Value, sqlx::Error> {
    let mut object = Map::with_capacity(row.len());

    for column in row.columns() {
        let index = column.ordinal();
        let value = if row.try_get_raw(index)?.is_null() {
            Value::Null
        } else {
            let bytes: &[u8] = row.try_get_unchecked(index)?;
            column_value(column.type_info().name(), bytes)
        };

        // a repeated column name overwrites the earlier value
        object.insert(column.name().to_string(), value);
    }

    Ok(Value::Object(object))
}

/// Maps the textual form of a non-NULL cell to JSON according to its MySQL type name.
pub fn column_value(type_name: &str, bytes: &[u8]) -> Value {
    let (base, unsigned) = match type_name.strip_suffix(" UNSIGNED") {
        Some(base) => (base, true),
        None => (type_name, false),
    };

    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "BOOLEAN" | "YEAR" => {
            integer(bytes, unsigned)
        }
        "FLOAT" | "DOUBLE" => float(bytes),
        "BIT" => bit(bytes),
        "DATETIME" | "TIMESTAMP" => datetime(bytes),
        "JSON" => serde_json::from_slice(bytes).unwrap_or_else(|_| text(bytes)),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            binary(bytes)
        }
        // DECIMAL stays a string so no digits are lost
        _ => text(bytes),
    }
}

fn integer(bytes: &[u8], unsigned: bool) -> Value {
    let Ok(s) = std::str::from_utf8(bytes) else {
        return binary(bytes);
    };

    let parsed = if unsigned {
        s.parse::<u64>().map(Value::from).ok()
    } else {
        s.parse::<i64>().map(Value::from).ok()
    };

    parsed.unwrap_or_else(|| Value::String(s.to_string()))
}

fn float(bytes: &[u8]) -> Value {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| text(bytes))
}

fn bit(bytes: &[u8]) -> Value {
    let value = bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    Value::from(value)
}

fn datetime(bytes: &[u8]) -> Value {
    let Ok(s) = std::str::from_utf8(bytes) else {
        return binary(bytes);
    };

    match NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        Ok(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Err(_) => Value::String(s.to_string()),
    }
}

fn text(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => binary(bytes),
    }
}

fn binary(bytes: &[u8]) -> Value {
    Value::String(STANDARD.encode(bytes))
}
