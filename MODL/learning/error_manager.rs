use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use shared_logging::{ErrorRecord, Gravity};

use crate::{errors::LearningError, json_writer::JsonWriter, telemetry::LearningTelemetry};

/// Category of the synthetic records that open a task section.
pub const SECTION_CATEGORY: &str = "Error section";

/// Display callback invoked for every record as soon as it is added.
pub type DisplayFn = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;

/// User error channel with an explicit collection lifecycle.
///
/// The manager is a cheap handle passed to every component that reports warnings
/// or errors. Records are displayed immediately; between
/// [`begin_error_collection`](Self::begin_error_collection) and
/// [`end_error_collection`](Self::end_error_collection) they are also kept so that a
/// JSON report can list them, grouped by task section.
#[derive(Clone)]
pub struct LearningErrorManager {
    state: Arc<Mutex<CollectionState>>,
    display: DisplayFn,
}

#[derive(Debug, Default)]
struct CollectionState {
    collecting: bool,
    task_number: usize,
    records: Vec<ErrorRecord>,
}

impl fmt::Debug for LearningErrorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LearningErrorManager")
            .field("collecting", &state.collecting)
            .field("task_number", &state.task_number)
            .field("records", &state.records.len())
            .finish()
    }
}

impl Default for LearningErrorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LearningErrorManager {
    /// Creates a manager printing warnings and errors on stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_display(Arc::new(|record: &ErrorRecord| {
            if record.gravity != Gravity::Message {
                eprintln!("{}", record.display_message());
            }
        }))
    }

    /// Creates a manager using a custom display function.
    #[must_use]
    pub fn with_display(display: DisplayFn) -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectionState::default())),
            display,
        }
    }

    /// Creates a manager that displays records through telemetry logs.
    #[must_use]
    pub fn with_telemetry(telemetry: LearningTelemetry) -> Self {
        Self::with_display(Arc::new(move |record: &ErrorRecord| {
            let _ = telemetry.log_error(record);
        }))
    }

    /// Starts collecting records.
    pub fn begin_error_collection(&self) -> Result<(), LearningError> {
        let mut state = self.state.lock();
        if state.collecting {
            return Err(LearningError::Collection(
                "error collection already active".into(),
            ));
        }
        if state.task_number != 0 {
            return Err(LearningError::Collection(format!(
                "{} task section(s) left from a previous collection",
                state.task_number
            )));
        }
        state.collecting = true;
        state.records.clear();
        Ok(())
    }

    /// Stops collecting and discards the collected records.
    pub fn end_error_collection(&self) {
        let mut state = self.state.lock();
        state.collecting = false;
        state.task_number = 0;
        state.records.clear();
    }

    /// Whether records are being collected.
    #[must_use]
    pub fn is_error_collection_active(&self) -> bool {
        self.state.lock().collecting
    }

    /// Opens a new task section.
    pub fn add_task(&self, title: &str) {
        let mut state = self.state.lock();
        debug_assert!(state.collecting, "add_task outside error collection");
        if state.collecting {
            state.task_number += 1;
            state.records.push(ErrorRecord::new(
                Gravity::Message,
                SECTION_CATEGORY,
                "",
                title,
            ));
        }
    }

    /// Number of task sections opened since collection began.
    #[must_use]
    pub fn task_number(&self) -> usize {
        self.state.lock().task_number
    }

    /// Reports a message.
    pub fn add_message(&self, category: &str, localisation: &str, label: &str) {
        self.add_record(ErrorRecord::new(Gravity::Message, category, localisation, label));
    }

    /// Reports a warning.
    pub fn add_warning(&self, category: &str, localisation: &str, label: &str) {
        self.add_record(ErrorRecord::new(Gravity::Warning, category, localisation, label));
    }

    /// Reports an error.
    pub fn add_error(&self, category: &str, localisation: &str, label: &str) {
        self.add_record(ErrorRecord::new(Gravity::Error, category, localisation, label));
    }

    /// Displays a record and collects it when collection is active.
    pub fn add_record(&self, record: ErrorRecord) {
        (self.display)(&record);
        let mut state = self.state.lock();
        if state.collecting {
            state.records.push(record);
        }
    }

    /// Snapshot of the collected records, section markers included.
    #[must_use]
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.state.lock().records.clone()
    }

    /// Number of collected records of the given gravity, section markers excluded.
    #[must_use]
    pub fn count(&self, gravity: Gravity) -> usize {
        self.state
            .lock()
            .records
            .iter()
            .filter(|record| record.gravity == gravity && !is_section(record))
            .count()
    }

    /// Writes the collected warnings and errors grouped by task section.
    ///
    /// Sections without any warning or error produce no node, and nothing at all is
    /// written when every section is empty.
    pub fn write_json_key_report(&self, json: &mut JsonWriter, key: &str) {
        let sections = self.collected_sections();
        if sections.is_empty() {
            return;
        }
        json.begin_key_array(key);
        for (title, messages) in sections {
            json.begin_object();
            json.write_key_string("taskName", &title);
            json.begin_key_array("messages");
            for message in messages {
                json.write_string(&message);
            }
            json.end_array();
            json.end_object();
        }
        json.end_array();
    }

    fn collected_sections(&self) -> Vec<(String, Vec<String>)> {
        let state = self.state.lock();
        let mut sections: Vec<(String, Vec<String>)> = Vec::new();
        let mut current = (String::new(), Vec::new());
        for record in &state.records {
            if is_section(record) {
                let previous = std::mem::replace(&mut current, (record.label.clone(), Vec::new()));
                if !previous.1.is_empty() {
                    sections.push(previous);
                }
            } else if record.gravity != Gravity::Message {
                current.1.push(record.display_message());
            }
        }
        if !current.1.is_empty() {
            sections.push(current);
        }
        sections
    }
}

fn is_section(record: &ErrorRecord) -> bool {
    record.gravity == Gravity::Message && record.category == SECTION_CATEGORY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent() -> LearningErrorManager {
        LearningErrorManager::with_display(Arc::new(|_: &ErrorRecord| {}))
    }

    #[test]
    fn collection_lifecycle_is_exclusive() {
        let manager = silent();
        manager.begin_error_collection().unwrap();
        assert!(manager.begin_error_collection().is_err());
        manager.add_task("Data preparation");
        assert_eq!(manager.task_number(), 1);
        manager.end_error_collection();
        assert!(!manager.is_error_collection_active());
        assert!(manager.records().is_empty());
        manager.begin_error_collection().unwrap();
    }

    #[test]
    fn records_outside_collection_are_only_displayed() {
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let manager = LearningErrorManager::with_display(Arc::new(move |_: &ErrorRecord| {
            *counter.lock() += 1;
        }));
        manager.add_warning("Variable", "Age", "constant value");
        assert_eq!(*seen.lock(), 1);
        assert!(manager.records().is_empty());
    }

    #[test]
    fn json_report_skips_empty_sections() {
        let manager = silent();
        manager.begin_error_collection().unwrap();
        manager.add_task("Data preparation");
        manager.add_message("Variable", "", "computed");
        manager.add_task("Modeling");
        manager.add_warning("Predictor", "Naive Bayes", "no informative variable");
        manager.add_error("Database", "iris.txt", "bad field");
        manager.add_task("Train evaluation");

        let mut json = JsonWriter::new();
        json.begin_object();
        manager.write_json_key_report(&mut json, "warnings");
        json.end_object();
        let value = json.into_value();
        let sections = value["warnings"].as_array().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0]["taskName"], "Modeling");
        assert_eq!(
            sections[0]["messages"][0],
            "warning : Predictor Naive Bayes : no informative variable"
        );
        assert_eq!(manager.count(Gravity::Error), 1);
    }

    #[test]
    fn nothing_written_without_warnings() {
        let manager = silent();
        manager.begin_error_collection().unwrap();
        manager.add_task("Modeling");
        let mut json = JsonWriter::new();
        json.begin_object();
        manager.write_json_key_report(&mut json, "warnings");
        json.end_object();
        assert!(json.into_value().get("warnings").is_none());
    }

    #[test]
    fn records_before_first_section_use_empty_title() {
        let manager = silent();
        manager.begin_error_collection().unwrap();
        manager.add_warning("", "", "early");
        manager.add_task("Modeling");
        let mut json = JsonWriter::new();
        json.begin_object();
        manager.write_json_key_report(&mut json, "warnings");
        json.end_object();
        let value = json.into_value();
        assert_eq!(value["warnings"][0]["taskName"], "");
    }
}
