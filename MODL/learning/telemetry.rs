use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::{json, Value};
use shared_event_bus::{ProgressEvent, ProgressKind, ProgressPublisher};
use shared_logging::{ErrorRecord, JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Handle, Runtime};
use uuid::Uuid;

/// Builder for learning telemetry sinks.
pub struct LearningTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    progress_publisher: Option<Arc<dyn ProgressPublisher>>,
}

impl LearningTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            progress_publisher: None,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the progress publisher.
    #[must_use]
    pub fn progress_publisher(mut self, publisher: Arc<dyn ProgressPublisher>) -> Self {
        self.progress_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<LearningTelemetry> {
        LearningTelemetry::new(self.module, self.log_path, self.progress_publisher)
    }
}

/// Telemetry handle shared across learning components.
#[derive(Clone)]
pub struct LearningTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for LearningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    progress: Option<ProgressHandle>,
}

struct ProgressHandle {
    runtime: Runtime,
    publisher: Arc<dyn ProgressPublisher>,
}

impl ProgressHandle {
    fn new(publisher: Arc<dyn ProgressPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            publisher,
        })
    }

    fn publish(&self, event: ProgressEvent) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(event).await {
                    eprintln!("progress publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(event))
        }
    }
}

impl LearningTelemetry {
    fn new(
        module: impl Into<String>,
        log_path: Option<PathBuf>,
        progress_publisher: Option<Arc<dyn ProgressPublisher>>,
    ) -> Result<Self> {
        let logger = log_path.map(JsonLogger::new).transpose()?;
        let progress = progress_publisher.map(ProgressHandle::new).transpose()?;
        Ok(Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                logger,
                progress,
            }),
        })
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> LearningTelemetryBuilder {
        LearningTelemetryBuilder::new(module)
    }

    /// Module name stamped on every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Logs a record of the user error channel.
    pub fn log_error(&self, error: &ErrorRecord) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            logger.log_error(&self.inner.module, error)?;
        }
        Ok(())
    }

    /// Publishes a progress event.
    pub fn progress(&self, kind: ProgressKind, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.progress {
            handle.publish(ProgressEvent {
                id: format!("evt-{}", Uuid::new_v4()),
                source: self.inner.module.clone(),
                kind,
                timestamp: chrono::Utc::now().to_rfc3339(),
                payload,
            })?;
        }
        Ok(())
    }

    /// Publishes the title of the running task.
    pub fn main_label(&self, label: &str) -> Result<()> {
        self.progress(ProgressKind::MainLabel, json!({ "label": label }))
    }

    /// Publishes the current step.
    pub fn label(&self, label: &str) -> Result<()> {
        self.progress(ProgressKind::Label, json!({ "label": label }))
    }

    /// Publishes a progression percentage.
    pub fn progression(&self, percent: f64) -> Result<()> {
        self.progress(
            ProgressKind::Progression,
            json!({ "percent": percent.clamp(0.0, 100.0) }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryProgressBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_progress() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("learning.log");
        let bus = Arc::new(MemoryProgressBus::new(16));
        let telemetry = LearningTelemetry::builder("learning")
            .log_path(&path)
            .progress_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "class_stats.start", json!({ "attributes": 4 }))
            .unwrap();
        telemetry.main_label("Iris").unwrap();
        telemetry.progression(150.0).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("class_stats.start"));
        assert_eq!(bus.snapshot().len(), 2);
        let last = bus.last_of(ProgressKind::Progression).unwrap();
        assert_eq!(last.percent(), Some(100.0));
    }
}
