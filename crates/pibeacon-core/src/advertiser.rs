//! Beacon advertiser engine.
//!
//! Keeps one iBeacon advertisement registered with the radio and revisits it
//! every `interval_ms`, honoring the stop latch cooperatively at cycle
//! boundaries: an advertisement request in flight always completes before a
//! stop takes effect. A failed registration is retried on the next cycle;
//! the run only aborts after [`MAX_CONSECUTIVE_RADIO_FAULTS`] faults in a
//! row.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::beacon::BeaconPayload;
use crate::config::AdvertiserParams;
use crate::engine::{FaultTracker, RunState, MAX_CONSECUTIVE_RADIO_FAULTS};
use crate::error::BeaconError;
use crate::radio::Radio;
use crate::stop::{StopController, StopReason};

/// Advertiser engine for one run.
#[derive(Debug)]
pub struct Advertiser {
    params: AdvertiserParams,
    state: RunState,
}

impl Advertiser {
    /// Prepare an advertiser for the given parameters.
    #[must_use]
    pub fn new(params: AdvertiserParams) -> Self {
        info!(
            uuid = %params.uuid,
            major = params.major,
            minor = params.minor,
            tx_power = params.tx_power,
            "initialized beacon advertiser"
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

    /// Advertise until the stop controller latches a reason.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Advertiser`] when registration keeps failing
    /// beyond the consecutive-fault bound.
    pub async fn run<R: Radio>(
        &mut self,
        radio: &R,
        stop: &StopController,
    ) -> Result<StopReason, BeaconError> {
        let interval = Duration::from_millis(self.params.interval_ms);
        let payload = BeaconPayload::from(&self.params);
        self.state = RunState::Running;
        info!(interval_ms = self.params.interval_ms, "starting beacon advertiser");

        let mut handle = None;
        let mut faults = FaultTracker::new(MAX_CONSECUTIVE_RADIO_FAULTS);
        let mut cycle: u64 = 0;
        while !stop.should_stop() {
            cycle += 1;
            if handle.is_none() {
                match radio.advertise(&payload, interval).await {
                    Ok(acquired) => {
                        faults.reset();
                        handle = Some(acquired);
                        debug!(cycle, "advertisement registered");
                    }
                    Err(source) => {
                        warn!(cycle, error = %source, "advertisement attempt failed; retrying next cycle");
                        if faults.record() {
                            self.state = RunState::Stopped;
                            return Err(BeaconError::Advertiser { cycle, source });
                        }
                    }
                }
            }
            stop.sleep(interval).await;
        }

        let reason = stop.wait().await;
        self.state = RunState::Stopping;
        info!(%reason, cycles = cycle, "stopping beacon advertiser");
        if let Some(active) = handle.take() {
            if let Err(error) = radio.withdraw(active).await {
                warn!(error = %error, "failed to withdraw advertisement");
            }
        }
        self.state = RunState::Stopped;
        info!("beacon advertiser stopped");
        Ok(reason)
    }
}
