//! Pure payload-to-record transform
//!
//! Reshapes a brand's raw poll payload into normalized [`BookRecord`]s using
//! the brand's field mapping. No I/O; the server relays payloads untouched
//! and this runs on the consuming side.

use serde_json::Value;

use crate::types::{BookRecord, TransformSchema};

/// Transform a raw poll payload into normalized records.
///
/// `payload` is the poll response body (the object carrying the brand's
/// `data_path` field). Rows missing the mapped title field are dropped;
/// every other field is optional.
pub fn transform(payload: &Value, schema: &TransformSchema) -> Vec<BookRecord> {
    let Some(rows) = payload.get(&schema.data_path).and_then(Value::as_array) else {
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| {
            let title = field(row, &schema.fields.title)?;
            Some(BookRecord {
                title,
                date: field(row, &schema.fields.date),
                image: field(row, &schema.fields.image),
                url: field(row, &schema.fields.url),
                rating: field(row, &schema.fields.rating),
            })
        })
        .collect()
}

fn field(row: &Value, name: &str) -> Option<String> {
    row.get(name).and_then(Value::as_str).map(str::to_string)
}
