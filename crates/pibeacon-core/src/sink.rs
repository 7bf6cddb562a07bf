//! Append-only CSV stream for scan results.
//!
//! One file per run, named from the configured prefix and the run's start
//! time so repeated runs on the same prefix never collide. Records are
//! flushed to the OS as they are appended — nothing is buffered across the
//! process lifetime, which bounds data loss on abrupt termination to at
//! most the record being written.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::radio::Observation;

/// Column header written once at stream open.
pub const CSV_HEADER: &str = "SCAN,ADDRESS,TIMESTAMP,UUID,MAJOR,MINOR,TX POWER,RSSI";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const FILENAME_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One accepted observation, bound to the scan pass that produced it.
/// Immutable once created; owned by the sink from creation until flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    /// Scan pass counter, starting at 1, strictly increasing per run.
    pub scan: u64,
    /// Transmitting device address.
    pub address: String,
    /// Scanner-local wall-clock time of the observation.
    pub timestamp: DateTime<Local>,
    /// Beacon UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated TX power (dBm).
    pub tx_power: i8,
    /// Received signal strength (dBm).
    pub rssi: i16,
}

impl ScanRecord {
    /// Bind an observation to its scan pass.
    #[must_use]
    pub fn new(scan: u64, observation: Observation) -> Self {
        Self {
            scan,
            address: observation.address,
            timestamp: observation.timestamp,
            uuid: observation.uuid,
            major: observation.major,
            minor: observation.minor,
            tx_power: observation.tx_power,
            rssi: observation.rssi,
        }
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.scan,
            self.address,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.uuid,
            self.major,
            self.minor,
            self.tx_power,
            self.rssi
        )
    }
}

/// Exclusive, append-only CSV stream for one scanner run.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    writer: Option<BufWriter<std::fs::File>>,
}

impl CsvSink {
    /// Create the record stream for a run that started at `started`,
    /// writing the header row. Parent directories of the prefix are created
    /// as needed; an already existing stream file is an error, never
    /// silently overwritten.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be created or
    /// the header cannot be written.
    pub fn open(prefix: &str, started: DateTime<Local>) -> io::Result<Self> {
        let path = PathBuf::from(format!(
            "{prefix}_{}.csv",
            started.format(FILENAME_STAMP_FORMAT)
        ));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    /// Path of the stream file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to the OS before returning.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, or one with
    /// [`io::ErrorKind::Other`] when the stream was already closed.
    pub fn append(&mut self, record: &ScanRecord) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("scan stream already closed"))?;
        writeln!(writer, "{}", record.csv_row())?;
        writer.flush()
    }

    /// Flush and sync the stream. Safe to call any number of times, from
    /// both the normal completion path and error paths.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error from the final flush or sync.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(scan: u64, address: &str, rssi: i16) -> ScanRecord {
        ScanRecord {
            scan,
            address: address.to_string(),
            timestamp: Local.with_ymd_and_hms(2026, 8, 8, 10, 30, 0).unwrap(),
            uuid: "f7826da6-4fa2-4e98-8024-bc5b71e0893e".parse().unwrap(),
            major: 3,
            minor: 8,
            tx_power: -4,
            rssi,
        }
    }

    fn start_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 8, 10, 29, 59).unwrap()
    }

    #[test]
    fn test_filename_carries_prefix_and_start_time() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("lab_scan").to_string_lossy().into_owned();
        let sink = CsvSink::open(&prefix, start_time()).unwrap();
        assert_eq!(
            sink.path().file_name().unwrap().to_str().unwrap(),
            "lab_scan_20260808T102959.csv"
        );
    }

    #[test]
    fn test_header_then_rows_in_append_order() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("scan").to_string_lossy().into_owned();
        let mut sink = CsvSink::open(&prefix, start_time()).unwrap();
        sink.append(&record(1, "AA:AA", -40)).unwrap();
        sink.append(&record(1, "BB:BB", -55)).unwrap();
        sink.append(&record(2, "AA:AA", -42)).unwrap();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "1,AA:AA,2026-08-08 10:30:00.000,f7826da6-4fa2-4e98-8024-bc5b71e0893e,3,8,-4,-40"
        );
        assert!(lines[3].starts_with("2,AA:AA,"));
    }

    #[test]
    fn test_rows_are_durable_before_close() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("scan").to_string_lossy().into_owned();
        let mut sink = CsvSink::open(&prefix, start_time()).unwrap();
        sink.append(&record(1, "AA:AA", -40)).unwrap();

        // Readable by another handle before the sink is closed.
        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_late_appends() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("scan").to_string_lossy().into_owned();
        let mut sink = CsvSink::open(&prefix, start_time()).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.append(&record(1, "AA:AA", -40)).is_err());
    }

    #[test]
    fn test_second_open_for_same_start_time_fails() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("scan").to_string_lossy().into_owned();
        let _first = CsvSink::open(&prefix, start_time()).unwrap();
        assert!(CsvSink::open(&prefix, start_time()).is_err());
    }

    #[test]
    fn test_parent_directories_created() {
        let dir = TempDir::new().unwrap();
        let prefix = dir
            .path()
            .join("nested/dir/scan")
            .to_string_lossy()
            .into_owned();
        let sink = CsvSink::open(&prefix, start_time()).unwrap();
        assert!(sink.path().exists());
    }
}
