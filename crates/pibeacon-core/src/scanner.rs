//! Beacon scanner engine.
//!
//! Repeats scan passes at the revisit cadence: each pass asks the radio for
//! one window of observations, filters them, and appends the survivors to
//! the scan record stream in reception order. The stop latch is honored at
//! pass boundaries only — an in-flight pass always completes. A failed pass
//! yields zero records and is retried; sink failures abort immediately.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ScannerParams;
use crate::engine::{FaultTracker, RunState, MAX_CONSECUTIVE_RADIO_FAULTS};
use crate::error::BeaconError;
use crate::radio::Radio;
use crate::sink::{CsvSink, ScanRecord};
use crate::stop::{StopController, StopReason};

/// What a finished scanner run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Why the run terminated.
    pub reason: StopReason,
    /// Number of scan passes executed.
    pub passes: u64,
    /// Number of records written to the sink.
    pub records: u64,
}

/// Scanner engine for one run.
#[derive(Debug)]
pub struct Scanner {
    params: ScannerParams,
    state: RunState,
}

impl Scanner {
    /// Prepare a scanner for the given parameters.
    #[must_use]
    pub fn new(params: ScannerParams) -> Self {
        info!(
            revisit_secs = params.revisit_secs,
            address_filter = ?params.filters.address,
            rssi_filter = ?params.filters.rssi_floor,
            "initialized beacon scanner"
        );
        Self {
            params,
            state: RunState::Initialized,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Scan until the stop controller latches a reason, appending every
    /// accepted observation to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Sink`] when a record cannot be written and
    /// [`BeaconError::Scanner`] when scan passes keep failing beyond the
    /// consecutive-fault bound.
    pub async fn run<R: Radio>(
        &mut self,
        radio: &R,
        stop: &StopController,
        sink: &mut CsvSink,
    ) -> Result<ScanSummary, BeaconError> {
        let window = Duration::from_secs(self.params.revisit_secs);
        self.state = RunState::Running;
        info!(revisit_secs = self.params.revisit_secs, "starting beacon scanner");

        let mut faults = FaultTracker::new(MAX_CONSECUTIVE_RADIO_FAULTS);
        let mut pass: u64 = 0;
        let mut records: u64 = 0;
        while !stop.should_stop() {
            pass += 1;
            debug!(pass, "starting scan pass");
            match radio.scan_once(window).await {
                Ok(observations) => {
                    faults.reset();
                    let observed = observations.len();
                    let mut accepted = 0usize;
                    for observation in observations {
                        if !self.params.filters.accepts(&observation) {
                            continue;
                        }
                        let record = ScanRecord::new(pass, observation);
                        if let Err(source) = sink.append(&record) {
                            self.state = RunState::Stopped;
                            return Err(BeaconError::Sink {
                                context: format!("pass {pass}"),
                                source,
                            });
                        }
                        accepted += 1;
                        records += 1;
                    }
                    debug!(pass, observed, accepted, "scan pass complete");
                }
                Err(source) => {
                    warn!(pass, error = %source, "scan pass failed; no records this pass");
                    if faults.record() {
                        self.state = RunState::Stopped;
                        return Err(BeaconError::Scanner { pass, source });
                    }
                    // Failed passes still pace at the revisit cadence.
                    stop.sleep(window).await;
                }
            }
        }

        let reason = stop.wait().await;
        self.state = RunState::Stopping;
        info!(%reason, passes = pass, records, "stopping beacon scanner");
        self.state = RunState::Stopped;
        info!("beacon scanner stopped");
        Ok(ScanSummary {
            reason,
            passes: pass,
            records,
        })
    }
}
