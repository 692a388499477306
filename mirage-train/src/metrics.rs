//! Append-only scalar metrics stream.
//!
//! Scalars are written as JSON lines under the run's `train/` directory and
//! mirrored in memory so the driver can hand the full history back to its
//! caller.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur while logging scalars.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scalar encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One sample of a tagged scalar time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f32,
    pub step: usize,
}

/// Append-only scalar logger keyed by `(tag, step)`.
pub struct MetricsLogger {
    path: PathBuf,
    writer: BufWriter<fs::File>,
    events: Vec<ScalarEvent>,
}

impl MetricsLogger {
    /// Recreate `dir` and open a fresh stream inside it.
    ///
    /// Any previous stream in the directory is discarded, matching a fresh
    /// run of the trainer.
    pub fn create(dir: &Path) -> Result<Self, MetricsError> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        let path = dir.join("scalars.jsonl");
        let writer = BufWriter::new(fs::File::create(&path)?);
        debug!(path = %path.display(), "scalar stream opened");
        Ok(Self {
            path,
            writer,
            events: Vec::new(),
        })
    }

    /// Append one scalar event.
    pub fn scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<(), MetricsError> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.events.push(event);
        Ok(())
    }

    /// Every event logged so far, in order.
    pub fn events(&self) -> &[ScalarEvent] {
        &self.events
    }

    /// Path of the on-disk stream.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the logger, keeping the in-memory history.
    pub fn into_events(self) -> Vec<ScalarEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mirage-metrics-{name}-{}", std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        dir
    }

    #[test]
    fn test_events_round_trip_through_disk() {
        let dir = scratch_dir("roundtrip");
        let mut logger = MetricsLogger::create(&dir).unwrap();
        logger.scalar("train/loss", 0.5, 0).unwrap();
        logger.scalar("train/lr", 5e-4, 0).unwrap();
        logger.scalar("train/loss", 0.25, 1).unwrap();
        assert_eq!(logger.events().len(), 3);

        let contents = fs::read_to_string(logger.path()).unwrap();
        let parsed: Vec<ScalarEvent> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, logger.into_events());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_create_discards_previous_stream() {
        let dir = scratch_dir("recreate");
        let mut logger = MetricsLogger::create(&dir).unwrap();
        logger.scalar("train/loss", 1.0, 0).unwrap();
        drop(logger);

        let logger = MetricsLogger::create(&dir).unwrap();
        assert!(logger.events().is_empty());
        let contents = fs::read_to_string(logger.path()).unwrap();
        assert!(contents.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_events_keep_insertion_order() {
        let dir = scratch_dir("order");
        let mut logger = MetricsLogger::create(&dir).unwrap();
        for step in 0..5 {
            logger.scalar("train/loss", step as f32, step).unwrap();
        }
        let steps: Vec<usize> = logger.events().iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
        fs::remove_dir_all(&dir).unwrap();
    }
}
