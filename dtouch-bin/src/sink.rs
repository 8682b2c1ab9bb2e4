use dtouch_sdk::{PublishError, PublishResult, PublishedValue, Publisher};
use std::{
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};

/// Writes each value as a structured log event.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn try_publish(&self, value: Arc<PublishedValue>) -> PublishResult<()> {
        tracing::info!(
            target: "dtouch::values",
            entity = %value.entity,
            value = %value.display_value(),
            unit = value.unit,
            cycle = value.cycle,
            "value"
        );
        Ok(())
    }
}

/// Appends one JSON object per value to a writer.
pub struct JsonLinesPublisher {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesPublisher {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(io::LineWriter::new(file))))
    }
}

impl fmt::Debug for JsonLinesPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesPublisher").finish_non_exhaustive()
    }
}

impl Publisher for JsonLinesPublisher {
    fn try_publish(&self, value: Arc<PublishedValue>) -> PublishResult<()> {
        let mut line = serde_json::to_vec(value.as_ref())?;
        line.push(b'\n');
        let mut writer = self.writer.lock().map_err(|_| PublishError::Closed)?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}
