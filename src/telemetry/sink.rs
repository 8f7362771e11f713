//! Append-only daily log file.
//!
//! One JSON object per line in `<dir>/<prefix>-YYYY-MM-DD.log`, keyed by the
//! UTC date of each record. Writes run on a background task so producers
//! never block; a failing disk is reported once per failure streak and the
//! affected lines are dropped.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::telemetry::record::LogRecord;

/// File name for a given day.
pub fn daily_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.log", prefix, date.format("%Y-%m-%d"))
}

/// Handle to the background file writer.
#[derive(Debug)]
pub struct DailyFileSink {
    tx: mpsc::UnboundedSender<LogRecord>,
    task: JoinHandle<()>,
}

impl DailyFileSink {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = SinkWriter {
            dir: dir.into(),
            prefix: prefix.into(),
            current: None,
            failing: false,
        };
        let task = tokio::spawn(writer.run(rx));
        Self { tx, task }
    }

    /// Queue a record for writing. Never blocks, never fails.
    pub fn write(&self, record: &LogRecord) {
        let _ = self.tx.send(record.clone());
    }

    /// Close the queue and wait until everything queued so far is on disk.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

struct SinkWriter {
    dir: PathBuf,
    prefix: String,
    current: Option<(NaiveDate, File)>,
    failing: bool,
}

impl SinkWriter {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LogRecord>) {
        while let Some(record) = rx.recv().await {
            match self.append(&record).await {
                Ok(()) => {
                    if self.failing {
                        self.failing = false;
                        tracing::info!(dir = %self.dir.display(), "Log file sink recovered");
                    }
                }
                Err(e) => {
                    // Drop the handle so the next record reopens the file.
                    self.current = None;
                    if !self.failing {
                        self.failing = true;
                        tracing::warn!(
                            dir = %self.dir.display(),
                            error = %e,
                            "Failed to write log file, dropping entries until it recovers"
                        );
                    }
                }
            }
        }

        if let Some((_, mut file)) = self.current.take() {
            let _ = file.flush().await;
        }
    }

    async fn append(&mut self, record: &LogRecord) -> std::io::Result<()> {
        let date = record.timestamp.date_naive();
        let stale = !matches!(&self.current, Some((day, _)) if *day == date);
        if stale {
            let file = open_for_append(&self.dir, &daily_file_name(&self.prefix, date)).await?;
            self.current = Some((date, file));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some((_, file)) = self.current.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

async fn open_for_append(dir: &Path, name: &str) -> std::io::Result<File> {
    fs::create_dir_all(dir).await?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))
        .await
}
