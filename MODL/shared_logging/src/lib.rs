#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging and error records shared by the MODL crates.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

/// Gravity of a record sent through the user error channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    /// Plain message, also used for section markers.
    Message,
    /// Warning, the operation continues.
    Warning,
    /// Error, the enclosing operation fails.
    Error,
}

impl Gravity {
    /// Label used when displaying a record.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Log level matching the gravity.
    #[must_use]
    pub const fn log_level(self) -> LogLevel {
        match self {
            Self::Message => LogLevel::Info,
            Self::Warning => LogLevel::Warn,
            Self::Error => LogLevel::Error,
        }
    }
}

/// Structured error record: gravity, category, localisation and label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Severity.
    pub gravity: Gravity,
    /// Emitting component category (e.g. `Variable`, `Benchmark`).
    pub category: String,
    /// Localisation inside the category (e.g. a variable name).
    pub localisation: String,
    /// Human-readable label.
    pub label: String,
}

impl ErrorRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        gravity: Gravity,
        category: impl Into<String>,
        localisation: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            gravity,
            category: category.into(),
            localisation: localisation.into(),
            label: label.into(),
        }
    }

    /// Builds the message shown to users.
    ///
    /// Messages show their label only; warnings and errors are prefixed with their
    /// gravity and with the non-empty parts of category and localisation.
    #[must_use]
    pub fn display_message(&self) -> String {
        if self.gravity == Gravity::Message {
            return self.label.clone();
        }
        let origin = [self.category.as_str(), self.localisation.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if origin.is_empty() {
            format!("{} : {}", self.gravity.label(), self.label)
        } else {
            format!("{} : {} : {}", self.gravity.label(), origin, self.label)
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_message())
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload (counts, costs, timings).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Converts an error-channel record into a log record.
    #[must_use]
    pub fn from_error(module: impl Into<String>, error: &ErrorRecord) -> Self {
        let mut record = Self::new(module, error.gravity.log_level(), error.label.clone());
        if !error.category.is_empty() {
            record
                .metadata
                .insert("category".into(), error.category.clone().into());
        }
        if !error.localisation.is_empty() {
            record
                .metadata
                .insert("localisation".into(), error.localisation.clone().into());
        }
        record
    }

    /// Merges the fields of a JSON object into the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &serde_json::Value) -> Self {
        if let Some(fields) = metadata.as_object() {
            for (key, value) in fields {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Writes a log record as one JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes an error-channel record.
    pub fn log_error(&self, module: &str, error: &ErrorRecord) -> Result<()> {
        self.log(&LogRecord::from_error(module, error))
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("logs/test.log")).unwrap();
        logger
            .log(&LogRecord::new("stats", LogLevel::Info, "compute"))
            .unwrap();
        logger
            .log(&LogRecord::new("stats", LogLevel::Debug, "done"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"message\":\"compute\""));
        assert!(content.contains("\"level\":\"DEBUG\""));
    }

    #[test]
    fn error_records_keep_origin_in_metadata() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("errors.log")).unwrap();
        let error = ErrorRecord::new(Gravity::Warning, "Variable", "Age", "no valid value");
        logger.log_error("learning", &error).unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"level\":\"WARN\""));
        assert!(content.contains("\"localisation\":\"Age\""));
    }

    #[test]
    fn display_message_skips_empty_parts() {
        let warning = ErrorRecord::new(Gravity::Warning, "", "", "empty database");
        assert_eq!(warning.display_message(), "warning : empty database");
        let error = ErrorRecord::new(Gravity::Error, "Dictionary", "Iris", "unknown variable");
        assert_eq!(
            error.to_string(),
            "error : Dictionary Iris : unknown variable"
        );
        let message = ErrorRecord::new(Gravity::Message, "Error section", "", "Modeling");
        assert_eq!(message.display_message(), "Modeling");
    }

    #[test]
    fn metadata_merge_keeps_existing_fields() {
        let record = LogRecord::new("m", LogLevel::Info, "x")
            .with_metadata(&serde_json::json!({ "folds": 10 }))
            .with_metadata(&serde_json::json!({ "seed": 1 }));
        assert_eq!(record.metadata.len(), 2);
    }
}
