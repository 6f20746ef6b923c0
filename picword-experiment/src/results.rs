//! Append-only results file, one fixed-width row per answered trial.

use crate::error::EngineError;
use chrono::{DateTime, Local};
use picword_core::trial::header_row;
use picword_core::TrialRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RESULTS_FILE: &str = "results.txt";

/// Name of the per-participant folder for a run started at `started`.
pub fn participant_folder(started: &DateTime<Local>) -> String {
    started.format("%Y%m%d-%H%M%S").to_string()
}

pub struct ResultsLog<W: Write> {
    writer: W,
    path: PathBuf,
    rows: usize,
}

impl ResultsLog<BufWriter<File>> {
    /// Creates `<responses>/<YYYYMMDD-HHMMSS>/results.txt` and writes the
    /// header.
    ///
    /// A failure to create the folder is only logged; opening the file is
    /// still attempted and its failure is fatal.
    pub async fn create(
        responses: &Path,
        started: &DateTime<Local>,
    ) -> Result<Self, EngineError> {
        let dir = responses.join(participant_folder(started));
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), %err, "could not create participant folder");
        }
        let path = dir.join(RESULTS_FILE);
        let file = match tokio::fs::File::create(&path).await {
            Ok(file) => file.into_std().await,
            Err(source) => return Err(EngineError::ResultsLog { path, source }),
        };
        info!(path = %path.display(), "results log opened");
        Self::new(BufWriter::new(file), path)
    }
}

impl<W: Write> ResultsLog<W> {
    pub fn new(writer: W, path: PathBuf) -> Result<Self, EngineError> {
        let mut log = Self {
            writer,
            path,
            rows: 0,
        };
        log.write_line(&header_row())?;
        Ok(log)
    }

    pub fn append(&mut self, record: &TrialRecord) -> Result<(), EngineError> {
        self.write_line(&record.row())?;
        self.rows += 1;
        Ok(())
    }

    /// Trial rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and hands back the writer.
    pub fn close(mut self) -> Result<W, EngineError> {
        self.writer.flush().map_err(|source| EngineError::ResultsLog {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.writer)
    }

    fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| EngineError::ResultsLog {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use picword_cache::Atom;

    fn record(trial: usize, images: [&str; 3], target: &str, response: usize, speaker: &str) -> TrialRecord {
        let images = images.map(Atom::from);
        TrialRecord {
            trial,
            response: images[response].clone(),
            images,
            target: target.into(),
            speaker: speaker.into(),
        }
    }

    #[test]
    fn rows_follow_the_header() {
        let mut log = ResultsLog::new(Vec::new(), PathBuf::from("mem")).unwrap();
        log.append(&record(1, ["dog", "bird", "cat"], "cat", 2, "t1"))
            .unwrap();
        assert_eq!(log.rows(), 1);

        let text = String::from_utf8(log.close().unwrap()).unwrap();
        let lines: Vec<Vec<&str>> = text
            .lines()
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(
            lines,
            vec![
                vec!["trial", "image1", "image2", "image3", "target", "response", "speaker"],
                vec!["1", "dog", "bird", "cat", "cat", "cat", "t1"],
            ]
        );
    }

    #[test]
    fn folder_is_named_by_local_start_time() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(participant_folder(&started), "20240307-090502");
    }

    #[tokio::test]
    async fn create_makes_the_participant_folder() {
        let responses = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let log = ResultsLog::create(responses.path(), &started).await.unwrap();
        let path = log.path().to_path_buf();
        log.close().unwrap();

        assert_eq!(
            path,
            responses.path().join("20240102-030405").join(RESULTS_FILE)
        );
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("     trial"));
    }

    #[tokio::test]
    async fn unwritable_location_is_fatal() {
        let responses = tempfile::tempdir().unwrap();
        let blocker = responses.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let started = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let err = ResultsLog::create(&blocker, &started).await.err().unwrap();
        assert!(matches!(err, EngineError::ResultsLog { .. }));
    }
}
