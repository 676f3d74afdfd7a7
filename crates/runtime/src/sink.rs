//! Action sinks: where confirmed commands leave the pipeline.
//!
//! The system-control collaborator is external; the worker only needs a
//! synchronous `deliver`. The JSONL sink writes an append-only command log
//! that downstream tools or tests can read back.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use gazectl_common::{now_rfc3339, GazeError, GazeResult};
use gazectl_frame_model::{ActionCommand, ScreenSize};
use serde::{Deserialize, Serialize};

/// Receiver of outgoing action commands.
pub trait ActionSink: Send {
    /// Deliver one command. Errors are logged by the worker and never stop
    /// the processing loop.
    fn deliver(&mut self, command: &ActionCommand) -> GazeResult<()>;

    /// Push buffered commands out.
    fn flush(&mut self) -> GazeResult<()> {
        Ok(())
    }

    /// Sink name for logs.
    fn name(&self) -> &str;
}

/// Logs every command through `tracing`. Used when no output is configured.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ActionSink for TracingSink {
    fn deliver(&mut self, command: &ActionCommand) -> GazeResult<()> {
        match command.position() {
            Some(p) => tracing::debug!(
                action = command.kind.as_str(),
                x = p.x,
                y = p.y,
                t = command.timestamp_ms,
                "Action"
            ),
            None => tracing::info!(
                action = command.kind.as_str(),
                payload = ?command.payload,
                t = command.timestamp_ms,
                "Action"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Collects commands in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    commands: Arc<Mutex<Vec<ActionCommand>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn commands(&self) -> Vec<ActionCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl ActionSink for RecordingSink {
    fn deliver(&mut self, command: &ActionCommand) -> GazeResult<()> {
        self.commands
            .lock()
            .map_err(|_| GazeError::sink("recording buffer poisoned"))?
            .push(command.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// First line of an action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogHeader {
    pub schema_version: String,
    /// Wall clock at session start (RFC 3339).
    pub epoch_wall: String,
    pub screen: ScreenSize,
}

impl ActionLogHeader {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            epoch_wall: now_rfc3339(),
            screen,
        }
    }
}

/// Writes commands to a JSONL file in append-only mode.
pub struct JsonlActionSink {
    writer: BufWriter<File>,
    path: PathBuf,
    commands_written: u64,
    flush_every: u64,
}

impl JsonlActionSink {
    /// Create the log, writing the header as a `#` comment line.
    pub fn create(path: PathBuf, header: &ActionLogHeader) -> GazeResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);

        let header_json = serde_json::to_string(header)?;
        writeln!(writer, "# {header_json}")
            .map_err(|e| GazeError::sink(format!("Failed to write header: {e}")))?;

        Ok(Self {
            writer,
            path,
            commands_written: 0,
            flush_every: 64,
        })
    }

    /// Flush after every `n` commands (minimum 1).
    pub fn with_flush_every(mut self, n: u64) -> Self {
        self.flush_every = n.max(1);
        self
    }

    pub fn commands_written(&self) -> u64 {
        self.commands_written
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ActionSink for JsonlActionSink {
    fn deliver(&mut self, command: &ActionCommand) -> GazeResult<()> {
        let json = serde_json::to_string(command)?;
        writeln!(self.writer, "{json}")
            .map_err(|e| GazeError::sink(format!("Failed to write action: {e}")))?;
        self.commands_written += 1;

        if self.commands_written % self.flush_every == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> GazeResult<()> {
        self.writer
            .flush()
            .map_err(|e| GazeError::sink(format!("Failed to flush actions: {e}")))
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

impl Drop for JsonlActionSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Read an action log back, skipping the header and comment lines.
pub fn read_action_log(content: &str) -> Result<Vec<ActionCommand>, serde_json::Error> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}
