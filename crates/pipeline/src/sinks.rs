//! Event sinks.
//!
//! Sinks are shared handles (the pipeline and the caller may both hold
//! one), so emission takes `&self` with interior locking where needed. A
//! sink failure is reported per event and never stops processing.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use s1scope_core::Event;

/// Consumes emitted events.
pub trait Sink: Send + Sync {
    fn emit(&self, event: &Event) -> io::Result<()>;

    /// Flush any buffered output; default is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// One JSON object per line, appended to a file.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlSink {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Sink for JsonlSink {
    fn emit(&self, event: &Event) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().unwrap().flush()
    }
}

/// Events as JSON lines on stdout.
#[derive(Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn emit(&self, event: &Event) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        println!("{}", line);
        Ok(())
    }
}

/// Collects events in memory; the testing seam.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Sink for MemorySink {
    fn emit(&self, event: &Event) -> io::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
