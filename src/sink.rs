//! Tick hook that appends simulation events to a JSON Lines file

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::engine::{TickHook, TickOutcome};

pub struct JsonLinesEventSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesEventSink {
    /// Open `path` for appending, creating it if needed
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TickHook for JsonLinesEventSink {
    fn name(&self) -> &str {
        "jsonl-event-sink"
    }

    fn on_tick(&self, outcome: &TickOutcome) -> Result<()> {
        if outcome.events.is_empty() {
            return Ok(());
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("event log writer poisoned"))?;
        for event in &outcome.events {
            serde_json::to_writer(&mut *writer, event)
                .with_context(|| format!("Failed to encode event for {}", self.path.display()))?;
            writer.write_all(b"\n")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}
