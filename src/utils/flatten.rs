//! JSON to one-row CSV flattening, used by the `json-to-csv` binary.

use crate::utils::error::{EtlError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Flattens nested objects into `parent_child` keys and array items into
/// `key_<index>` keys. Array items are not flattened further.
pub fn flatten_json(object: &Map<String, Value>, prefix: &str) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in object {
        match value {
            Value::Object(nested) => {
                flat.extend(flatten_json(nested, &format!("{}{}_", prefix, key)));
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    flat.insert(format!("{}{}_{}", prefix, key, i), item.clone());
                }
            }
            scalar => {
                flat.insert(format!("{}{}", prefix, key), scalar.clone());
            }
        }
    }
    flat
}

/// Cell text as the converter has always written it: empty for null, bare
/// strings, `True`/`False` for booleans and Python literal syntax for
/// containers left inside arrays.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => py_literal(other),
    }
}

fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_str(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_literal(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
    }
}

/// Single quotes unless the text holds `'` and no `"`.
fn py_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Writes `<stem>.csv` next to `json_path` and returns its path.
pub fn convert_json_file(json_path: &Path) -> Result<PathBuf> {
    let content = fs::read_to_string(json_path)?;
    let data: Value = serde_json::from_str(&content)?;
    let object = match data {
        Value::Object(object) => object,
        _ => {
            return Err(EtlError::ProcessingError {
                message: format!("{} does not hold a JSON object", json_path.display()),
            })
        }
    };

    let flat = flatten_json(&object, "");
    let csv_path = json_path.with_extension("csv");

    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record(flat.keys())?;
    writer.write_record(flat.values().map(cell))?;
    writer.flush()?;

    Ok(csv_path)
}

/// Recursively collects `*.json` files under `folder`, sorted by path.
pub fn find_json_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![folder.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
