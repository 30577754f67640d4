//! Per-run artifacts on disk.
//!
//! A run lives in `<output_root>/run_<YYYYmmdd_HHMMSS>/` and holds the run
//! log, every captured challenge image and the results CSV.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::challenges::core::ChallengeImage;
use crate::challenges::pipeline::ChallengeArchive;
use crate::config::Defaults;
use crate::modules::events::{EventHandler, LookupEvent};
use crate::results::{CSV_FIELDNAMES, CertificateRecord};

pub const LOG_FILE: &str = "run.log";
pub const RESULTS_FILE: &str = "resultados.csv";

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Error)]
pub enum RunRecordError {
    #[error("run directory I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to write results: {0}")]
    Csv(#[from] csv::Error),
}

/// In-memory run log, written out once on [`RunLog::finish`].
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    entries: Mutex<Vec<String>>,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let log = Self {
            path: path.into(),
            entries: Mutex::new(Vec::new()),
        };
        log.info(format!("Run started: {}", Local::now().format(ISO_FORMAT)));
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.push(message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.push(&format!("ERROR: {}", message.as_ref()));
    }

    fn push(&self, message: &str) {
        let entry = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        self.entries.lock().expect("run log lock poisoned").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("run log lock poisoned").clone()
    }

    /// Append the completion line and write every entry to disk.
    pub fn finish(&self) -> io::Result<()> {
        self.info(format!("Run completed: {}", Local::now().format(ISO_FORMAT)));
        let contents = self.entries().join("\n");
        fs::write(&self.path, contents)
    }
}

impl EventHandler for RunLog {
    fn handle(&self, event: &LookupEvent) {
        let Some(line) = event.describe() else {
            return;
        };
        if event.is_error() {
            self.error(line);
        } else {
            self.info(line);
        }
    }
}

/// Directory layout and writers for one batch run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    run_dir: PathBuf,
    challenge_dir: PathBuf,
    log: Arc<RunLog>,
}

impl RunRecord {
    /// Create `run_<now>` under `output_root`.
    pub fn create(output_root: impl AsRef<Path>) -> Result<Self, RunRecordError> {
        Self::create_at(output_root, Local::now())
    }

    pub fn create_at(
        output_root: impl AsRef<Path>,
        started_at: DateTime<Local>,
    ) -> Result<Self, RunRecordError> {
        let output_root = output_root.as_ref();
        fs::create_dir_all(output_root)?;
        let stamp = started_at.format("%Y%m%d_%H%M%S").to_string();
        let run_dir = claim_run_dir(output_root, &stamp)?;
        let challenge_dir = run_dir.join(Defaults::CHALLENGE_DIR);
        fs::create_dir(&challenge_dir)?;

        let log = Arc::new(RunLog::new(run_dir.join(LOG_FILE)));
        Ok(Self {
            run_dir,
            challenge_dir,
            log,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn challenge_dir(&self) -> &Path {
        &self.challenge_dir
    }

    pub fn csv_path(&self) -> PathBuf {
        self.run_dir.join(RESULTS_FILE)
    }

    pub fn log(&self) -> Arc<RunLog> {
        self.log.clone()
    }

    /// Write all records to `resultados.csv`. The header row is written even
    /// when there are no records.
    pub fn write_csv(&self, records: &[CertificateRecord]) -> Result<PathBuf, RunRecordError> {
        let path = self.csv_path();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(CSV_FIELDNAMES)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn finish(&self) -> Result<(), RunRecordError> {
        Ok(self.log.finish()?)
    }
}

/// Create a fresh `run_<stamp>` directory. Runs started within the same
/// second get `_2`, `_3`, ... suffixes instead of sharing a directory.
fn claim_run_dir(output_root: &Path, stamp: &str) -> io::Result<PathBuf> {
    let mut suffix = 1;
    loop {
        let name = if suffix == 1 {
            format!("run_{stamp}")
        } else {
            format!("run_{stamp}_{suffix}")
        };
        let candidate = output_root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => return Err(err),
        }
    }
}

impl ChallengeArchive for RunRecord {
    fn store(&self, image: &ChallengeImage) -> io::Result<PathBuf> {
        let path = self.challenge_dir.join(image.file_name());
        fs::write(&path, image.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn creates_timestamped_layout() {
        let root = tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();
        let record = RunRecord::create_at(root.path(), started).unwrap();

        assert_eq!(record.run_dir(), root.path().join("run_20240305_090701"));
        assert!(record.challenge_dir().is_dir());
        assert_eq!(record.csv_path(), record.run_dir().join("resultados.csv"));
    }

    #[test]
    fn runs_started_in_the_same_second_get_their_own_directory() {
        let root = tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();

        let first = RunRecord::create_at(root.path(), started).unwrap();
        let second = RunRecord::create_at(root.path(), started).unwrap();
        let third = RunRecord::create_at(root.path(), started).unwrap();

        assert_eq!(first.run_dir(), root.path().join("run_20240305_090701"));
        assert_eq!(second.run_dir(), root.path().join("run_20240305_090701_2"));
        assert_eq!(third.run_dir(), root.path().join("run_20240305_090701_3"));
        assert!(second.challenge_dir().is_dir());
    }

    #[test]
    fn creates_missing_output_root() {
        let root = tempdir().unwrap();
        let nested = root.path().join("outputs").join("sat");
        let record = RunRecord::create(&nested).unwrap();
        assert!(record.run_dir().starts_with(&nested));
        assert!(record.challenge_dir().is_dir());
    }

    #[test]
    fn stores_challenges_by_identifier_and_attempt() {
        let root = tempdir().unwrap();
        let record = RunRecord::create(root.path()).unwrap();
        let image = ChallengeImage::new("ABC010101AAA", 2, vec![1u8, 2, 3]);

        let path = record.store(&image).unwrap();
        assert!(path.ends_with("captchas/ABC010101AAA_attempt2.png"));
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn csv_always_has_header() {
        let root = tempdir().unwrap();
        let record = RunRecord::create(root.path()).unwrap();

        let path = record.write_csv(&[]).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.trim_end(),
            "rfc,razon_social,numero_serie,estado,tipo,fecha_inicial,fecha_final,url_certificado"
        );

        let rows = [
            CertificateRecord::captcha_error("ABC010101AAA"),
            CertificateRecord::error("XYZ020202BBB", "boom, again"),
        ];
        record.write_csv(&rows).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "ABC010101AAA,,,CAPTCHA_ERROR,,,,");
        assert_eq!(lines[2], "XYZ020202BBB,,,\"ERROR: boom, again\",,,,");
    }

    #[test]
    fn log_brackets_entries_and_flags_errors() {
        let root = tempdir().unwrap();
        let record = RunRecord::create(root.path()).unwrap();
        let log = record.log();
        log.info("[1] ABC010101AAA");
        log.error("ABC010101AAA: All 5 captcha attempts failed");
        record.finish().unwrap();

        let contents = fs::read_to_string(record.run_dir().join(LOG_FILE)).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("] Run started: "));
        assert!(lines[1].ends_with("] [1] ABC010101AAA"));
        assert!(lines[2].contains("] ERROR: ABC010101AAA: All 5"));
        assert!(lines[3].contains("] Run completed: "));
        assert!(lines.iter().all(|line| line.starts_with('[') && line.as_bytes()[9] == b']'));
    }
}
