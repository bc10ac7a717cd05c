use std::{fs, path::Path};

use anyhow::Context;
use serde_json::{Map, Value};

/// Hierarchical key-then-value JSON sink used by every report writer.
///
/// Objects and arrays are opened and closed explicitly; the caller decides whether a
/// value is keyed (inside an object) or positional (inside an array). The document is
/// built in memory and rendered once complete.
#[derive(Debug, Default)]
pub struct JsonWriter {
    stack: Vec<Frame>,
    root: Option<Value>,
}

#[derive(Debug)]
enum Frame {
    Object { key: Option<String>, fields: Map<String, Value> },
    Array { key: Option<String>, items: Vec<Value> },
}

impl JsonWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an anonymous object (document root or array element).
    pub fn begin_object(&mut self) {
        debug_assert!(!matches!(self.stack.last(), Some(Frame::Object { .. })));
        self.stack.push(Frame::Object {
            key: None,
            fields: Map::new(),
        });
    }

    /// Opens an object under `key` of the current object.
    pub fn begin_key_object(&mut self, key: &str) {
        debug_assert!(matches!(self.stack.last(), Some(Frame::Object { .. })));
        self.stack.push(Frame::Object {
            key: Some(key.to_owned()),
            fields: Map::new(),
        });
    }

    /// Opens an anonymous array (array element).
    pub fn begin_array(&mut self) {
        self.stack.push(Frame::Array {
            key: None,
            items: Vec::new(),
        });
    }

    /// Opens an array under `key` of the current object.
    pub fn begin_key_array(&mut self, key: &str) {
        debug_assert!(matches!(self.stack.last(), Some(Frame::Object { .. })));
        self.stack.push(Frame::Array {
            key: Some(key.to_owned()),
            items: Vec::new(),
        });
    }

    /// Closes the current object.
    pub fn end_object(&mut self) {
        match self.stack.pop() {
            Some(Frame::Object { key, fields }) => self.attach(key, Value::Object(fields)),
            other => {
                debug_assert!(false, "end_object without open object");
                if let Some(frame) = other {
                    self.stack.push(frame);
                }
            }
        }
    }

    /// Closes the current array.
    pub fn end_array(&mut self) {
        match self.stack.pop() {
            Some(Frame::Array { key, items }) => self.attach(key, Value::Array(items)),
            other => {
                debug_assert!(false, "end_array without open array");
                if let Some(frame) = other {
                    self.stack.push(frame);
                }
            }
        }
    }

    /// Writes any JSON value under `key`.
    pub fn write_key_value(&mut self, key: &str, value: Value) {
        if let Some(Frame::Object { fields, .. }) = self.stack.last_mut() {
            fields.insert(key.to_owned(), value);
        } else {
            debug_assert!(false, "keyed value outside an object");
        }
    }

    /// Writes a string field.
    pub fn write_key_string(&mut self, key: &str, value: &str) {
        self.write_key_value(key, Value::String(value.to_owned()));
    }

    /// Writes an integer field.
    pub fn write_key_int(&mut self, key: &str, value: i64) {
        self.write_key_value(key, Value::from(value));
    }

    /// Writes a count field.
    pub fn write_key_count(&mut self, key: &str, value: usize) {
        self.write_key_value(key, Value::from(value));
    }

    /// Writes a floating-point field; non-finite values become `null`.
    pub fn write_key_double(&mut self, key: &str, value: f64) {
        self.write_key_value(key, Value::from(value));
    }

    /// Writes a boolean field.
    pub fn write_key_boolean(&mut self, key: &str, value: bool) {
        self.write_key_value(key, Value::Bool(value));
    }

    /// Appends a value to the current array.
    pub fn write_value(&mut self, value: Value) {
        if let Some(Frame::Array { items, .. }) = self.stack.last_mut() {
            items.push(value);
        } else {
            debug_assert!(false, "positional value outside an array");
        }
    }

    /// Appends a string to the current array.
    pub fn write_string(&mut self, value: &str) {
        self.write_value(Value::String(value.to_owned()));
    }

    /// Appends a number to the current array.
    pub fn write_double(&mut self, value: f64) {
        self.write_value(Value::from(value));
    }

    /// Appends a count to the current array.
    pub fn write_count(&mut self, value: usize) {
        self.write_value(Value::from(value));
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Completed document, `None` while frames are still open.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        if self.stack.is_empty() {
            self.root.as_ref()
        } else {
            None
        }
    }

    /// Consumes the writer and returns the document.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.root.unwrap_or(Value::Null)
    }

    /// Renders the completed document to a file.
    pub fn write_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if !self.stack.is_empty() {
            anyhow::bail!("json document has {} unclosed frame(s)", self.stack.len());
        }
        let text = serde_json::to_string_pretty(self.root.as_ref().unwrap_or(&Value::Null))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn attach(&mut self, key: Option<String>, value: Value) {
        match (self.stack.last_mut(), key) {
            (None, _) => self.root = Some(value),
            (Some(Frame::Object { fields, .. }), Some(key)) => {
                fields.insert(key, value);
            }
            (Some(Frame::Array { items, .. }), None) => items.push(value),
            (Some(_), _) => debug_assert!(false, "keyed/positional mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builds_nested_document() {
        let mut json = JsonWriter::new();
        json.begin_object();
        json.write_key_string("tool", "MODL");
        json.begin_key_array("variables");
        json.begin_object();
        json.write_key_count("rank", 1);
        json.write_key_double("level", 0.25);
        json.end_object();
        json.end_array();
        json.begin_key_object("summary");
        json.write_key_boolean("supervised", true);
        json.end_object();
        json.end_object();
        let value = json.into_value();
        assert_eq!(value["tool"], "MODL");
        assert_eq!(value["variables"][0]["level"], 0.25);
        assert_eq!(value["summary"]["supervised"], true);
    }

    #[test]
    fn keys_keep_their_writing_order() {
        let dir = tempdir().unwrap();
        let mut json = JsonWriter::new();
        json.begin_object();
        json.write_key_count("values", 3);
        json.write_key_double("min", 1.0);
        json.write_key_double("max", 3.0);
        json.end_object();
        assert_eq!(
            serde_json::to_string(json.value().unwrap()).unwrap(),
            r#"{"values":3,"min":1.0,"max":3.0}"#
        );

        let path = dir.path().join("stats.json");
        json.write_file(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let values = text.find("\"values\"").unwrap();
        let min = text.find("\"min\"").unwrap();
        let max = text.find("\"max\"").unwrap();
        assert!(values < min && min < max);
    }

    #[test]
    fn refuses_to_write_unclosed_document() {
        let dir = tempdir().unwrap();
        let mut json = JsonWriter::new();
        json.begin_object();
        assert!(json.write_file(dir.path().join("report.json")).is_err());
        json.end_object();
        json.write_file(dir.path().join("report.json")).unwrap();
        assert!(dir.path().join("report.json").exists());
    }
}
