//! JSON Lines journal of engine events.
//!
//! One file per UTC day (`events_YYYYMMDD.jsonl`), opened in append mode so
//! a restart never truncates what was written. Each line is a complete
//! event; an interrupted write only damages the last line.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use updown_engine::EngineEvent;

use crate::error::AppResult;

/// Journal line: an event stamped with the time it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EngineEvent,
}

struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Buffered, daily-rotated event writer.
pub struct EventJournal {
    base_dir: PathBuf,
    buffer: Vec<JournalRecord>,
    max_buffer_size: usize,
    active: Option<ActiveFile>,
}

impl EventJournal {
    pub fn new(base_dir: impl Into<PathBuf>, max_buffer_size: usize) -> AppResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size: max_buffer_size.max(1),
            active: None,
        })
    }

    /// Buffer `event`, writing the buffer out once it is full.
    pub fn record(&mut self, event: EngineEvent, at: DateTime<Utc>) -> AppResult<()> {
        self.buffer.push(JournalRecord {
            recorded_at: at,
            event,
        });
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write buffered records to the file for their day.
    ///
    /// On an I/O error the unwritten records stay buffered for the next
    /// flush.
    pub fn flush(&mut self) -> AppResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut written = 0;
        let result = self.write_buffered(&mut written);
        self.buffer.drain(..written);
        if let Err(e) = &result {
            warn!(
                written,
                unwritten = self.buffer.len(),
                error = %e,
                "Journal flush incomplete, keeping unwritten records"
            );
            return result;
        }

        debug!(records = written, "Flushed events to journal");
        Ok(())
    }

    fn write_buffered(&mut self, written: &mut usize) -> AppResult<()> {
        for i in 0..self.buffer.len() {
            let record = &self.buffer[i];
            let date = record.recorded_at.format("%Y%m%d").to_string();
            let line = match serde_json::to_string(record) {
                Ok(line) => line,
                Err(e) => {
                    warn!(?e, kind = record.event.kind(), "Dropping unserializable event");
                    *written += 1;
                    continue;
                }
            };
            let active = self.writer_for(&date)?;
            writeln!(active.writer, "{line}")?;
            active.records_written += 1;
            *written += 1;
        }
        if let Some(active) = self.active.as_mut() {
            active.writer.flush()?;
        }
        Ok(())
    }

    /// Flush and close the current file.
    pub fn close(&mut self) -> AppResult<()> {
        self.flush()?;
        self.close_active();
        Ok(())
    }

    fn writer_for(&mut self, date: &str) -> AppResult<&mut ActiveFile> {
        let active = match self.active.take() {
            Some(active) if active.date == date => active,
            previous => {
                if let Some(previous) = previous {
                    close_file(previous);
                }
                let path = self.base_dir.join(format!("events_{date}.jsonl"));
                info!(path = %path.display(), "Opening event journal (append mode)");
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveFile {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                    records_written: 0,
                }
            }
        };
        Ok(self.active.insert(active))
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            close_file(active);
        }
    }
}

fn close_file(mut active: ActiveFile) {
    if let Err(e) = active.writer.flush() {
        warn!(?e, "Failed to flush journal on close");
    }
    info!(
        date = %active.date,
        records = active.records_written,
        "Closed event journal"
    );
}

impl Drop for EventJournal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush journal on drop");
        }
        self.close_active();
    }
}

/// Drain `events` into `journal` until `cancel` fires, then close it.
pub async fn run_journal(
    mut journal: EventJournal,
    mut events: broadcast::Receiver<EngineEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if let Err(e) = journal.record(event, Utc::now()) {
                        warn!(?e, "Failed to journal event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Journal lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = journal.close() {
        warn!(?e, "Failed to close event journal");
    }
}
