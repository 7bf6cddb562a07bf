//! Run orchestration.
//!
//! Wires the resolved configuration to the stop controller, the
//! role-specific engine, and (for scanners) the record sink, then blocks
//! until the run terminates. Configuration errors never reach this module —
//! resolution happens first and has no side effects — so the control file
//! reset here is the run's first touch of the filesystem.

use std::path::PathBuf;

use chrono::Local;
use tracing::{info, warn};

use crate::advertiser::Advertiser;
use crate::config::{RoleConfig, RunConfig};
use crate::error::BeaconError;
use crate::radio::Radio;
use crate::scanner::Scanner;
use crate::sink::CsvSink;
use crate::stop::{self, StopController, StopReason};

/// What a completed run reports back.
#[derive(Debug)]
pub struct RunOutcome {
    /// Why the run terminated.
    pub reason: StopReason,
    /// Records written (always 0 for an advertiser run).
    pub records: u64,
    /// Path of the scan record stream, for scanner runs.
    pub output: Option<PathBuf>,
}

/// Execute one run to completion on the given radio.
///
/// # Errors
///
/// Returns the fatal [`BeaconError`] of whichever component aborted the
/// run; the sink, when open, is closed on both success and error paths.
pub async fn execute<R: Radio>(config: &RunConfig, radio: &R) -> Result<RunOutcome, BeaconError> {
    stop::reset_control_file(&config.control_file).map_err(|source| BeaconError::ControlFile {
        path: config.control_file.clone(),
        source,
    })?;
    let stop = StopController::start(config.timeout, &config.control_file);
    info!(
        timeout = ?config.timeout,
        control_file = %config.control_file.display(),
        "run armed"
    );

    let outcome = match &config.role {
        RoleConfig::Advertiser(params) => {
            info!("beacon advertiser mode selected");
            let mut advertiser = Advertiser::new(params.clone());
            let reason = advertiser.run(radio, &stop).await?;
            RunOutcome {
                reason,
                records: 0,
                output: None,
            }
        }
        RoleConfig::Scanner(params) => {
            info!("beacon scanner mode selected");
            let mut sink =
                CsvSink::open(&params.scan_prefix, Local::now()).map_err(|source| {
                    BeaconError::Sink {
                        context: "opening".into(),
                        source,
                    }
                })?;
            info!(output = %sink.path().display(), "scan record stream opened");
            let output = sink.path().to_path_buf();

            let mut scanner = Scanner::new(params.clone());
            let result = scanner.run(radio, &stop, &mut sink).await;
            let closed = sink.close();
            let summary = result?;
            closed.map_err(|source| BeaconError::Sink {
                context: "closing".into(),
                source,
            })?;
            RunOutcome {
                reason: summary.reason,
                records: summary.records,
                output: Some(output),
            }
        }
    };

    if let Err(error) = stop::reset_control_file(&config.control_file) {
        warn!(error = %error, "failed to reset control file after run");
    }
    info!(reason = %outcome.reason, records = outcome.records, "run complete");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdvertiserParams, ScanFilters, ScannerParams};
    use crate::radio::{Observation, SimRadio};
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn observation(address: &str, rssi: i16) -> Observation {
        Observation {
            address: address.to_string(),
            uuid: Uuid::nil(),
            major: 1,
            minor: 1,
            tx_power: 0,
            rssi,
            timestamp: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_advertiser_run_to_timeout() {
        let dir = TempDir::new().unwrap();
        let control = dir.path().join("control");
        let config = RunConfig {
            control_file: control.clone(),
            timeout: Some(Duration::from_millis(300)),
            role: RoleConfig::Advertiser(AdvertiserParams {
                uuid: Uuid::nil(),
                major: 1,
                minor: 1,
                tx_power: 1,
                interval_ms: 20,
            }),
        };
        let radio = SimRadio::new();

        let outcome = execute(&config, &radio).await.unwrap();
        assert_eq!(outcome.reason, StopReason::Timeout);
        assert_eq!(outcome.records, 0);
        assert!(outcome.output.is_none());
        assert_eq!(radio.withdraw_calls(), 1);
        assert_eq!(
            std::fs::read_to_string(&control).unwrap(),
            "0",
            "control file reset after the run"
        );
    }

    #[tokio::test]
    async fn test_scanner_run_writes_stream_and_reports_count() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            control_file: dir.path().join("control"),
            timeout: Some(Duration::from_millis(300)),
            role: RoleConfig::Scanner(ScannerParams {
                scan_prefix: dir.path().join("scan").to_string_lossy().into_owned(),
                revisit_secs: 1,
                filters: ScanFilters::default(),
            }),
        };
        let radio = SimRadio::with_passes(vec![
            vec![observation("AA:AA", -40)],
            vec![observation("BB:BB", -50)],
        ])
        .with_scan_latency(Duration::from_millis(10));

        let outcome = execute(&config, &radio).await.unwrap();
        assert_eq!(outcome.reason, StopReason::Timeout);
        assert_eq!(outcome.records, 2);

        let output = outcome.output.expect("scanner runs name their output");
        let contents = std::fs::read_to_string(output).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3, "header plus one row per record");
        assert_eq!(lines[0], crate::sink::CSV_HEADER);
    }

    #[tokio::test]
    async fn test_unusable_control_file_aborts_before_any_output() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            control_file: dir.path().join("missing/control"),
            timeout: None,
            role: RoleConfig::Scanner(ScannerParams {
                scan_prefix: dir.path().join("scan").to_string_lossy().into_owned(),
                revisit_secs: 1,
                filters: ScanFilters::default(),
            }),
        };
        let radio = SimRadio::new();

        let error = execute(&config, &radio).await.unwrap_err();
        assert!(matches!(error, BeaconError::ControlFile { .. }));
        assert!(
            std::fs::read_dir(dir.path()).unwrap().next().is_none(),
            "no partial files created"
        );
    }
}
