//! The radio capability boundary.
//!
//! The BLE stack is a host-provided collaborator, not something this crate
//! reimplements: engines are generic over [`Radio`], the production
//! implementation lives in the `bluetooth` module behind the feature of the
//! same name, and [`SimRadio`] drives the control core in tests and in
//! builds without BlueZ.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use thiserror::Error;
use uuid::Uuid;

use crate::beacon::BeaconPayload;

/// Errors surfaced by a radio implementation.
#[derive(Debug, Error)]
pub enum RadioError {
    /// No usable adapter (missing hardware, powered off, daemon absent).
    #[error("no usable Bluetooth adapter: {0}")]
    AdapterUnavailable(String),

    /// Registering the advertisement failed.
    #[error("advertisement registration failed: {0}")]
    Advertise(String),

    /// A scan pass failed.
    #[error("scan failed: {0}")]
    Scan(String),
}

/// One advertisement observed during a scan pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Transmitting device address.
    pub address: String,
    /// Beacon UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated TX power (dBm) carried in the payload.
    pub tx_power: i8,
    /// Received signal strength (dBm).
    pub rssi: i16,
    /// Scanner-local wall-clock time of the observation.
    pub timestamp: DateTime<Local>,
}

/// Host radio operations the control core depends on.
///
/// Implementations are free to take as long as `scan_once`'s window to
/// return; cancellation is cooperative and only ever happens between calls.
#[allow(async_fn_in_trait)]
pub trait Radio {
    /// Token representing one registered advertisement.
    type Handle: Send;

    /// Register (start broadcasting) an advertisement at the given interval.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::Advertise`] when the radio rejects the request.
    async fn advertise(
        &self,
        beacon: &BeaconPayload,
        interval: Duration,
    ) -> Result<Self::Handle, RadioError>;

    /// Withdraw a previously registered advertisement.
    ///
    /// # Errors
    ///
    /// Returns a [`RadioError`] when the radio rejects the request.
    async fn withdraw(&self, handle: Self::Handle) -> Result<(), RadioError>;

    /// Perform one scan pass of roughly `window` duration, returning the
    /// observed beacon advertisements in reception order.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::Scan`] when the pass cannot be executed.
    async fn scan_once(&self, window: Duration) -> Result<Vec<Observation>, RadioError>;
}

/// Scripted in-memory radio.
///
/// Scan passes pop from a scripted queue and return after `scan_latency`
/// (the full window when unset); an exhausted script behaves like empty
/// airspace for the whole window. Fault injection fails the next N calls,
/// and call counters expose what the engines actually did.
#[derive(Debug, Default)]
pub struct SimRadio {
    passes: Mutex<VecDeque<Vec<Observation>>>,
    scan_latency: Duration,
    advertise_faults: AtomicUsize,
    scan_faults: AtomicUsize,
    advertise_calls: AtomicUsize,
    withdraw_calls: AtomicUsize,
    scan_calls: AtomicUsize,
}

impl SimRadio {
    /// A quiet radio: advertising succeeds, scans observe nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A radio whose consecutive scan passes yield the given observations.
    #[must_use]
    pub fn with_passes(passes: Vec<Vec<Observation>>) -> Self {
        Self {
            passes: Mutex::new(passes.into()),
            ..Self::default()
        }
    }

    /// Shorten scripted scan passes to `latency` instead of the full window.
    #[must_use]
    pub fn with_scan_latency(mut self, latency: Duration) -> Self {
        self.scan_latency = latency;
        self
    }

    /// Fail the next `count` advertise calls.
    pub fn fail_next_advertisements(&self, count: usize) {
        self.advertise_faults.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` scan passes.
    pub fn fail_next_scans(&self, count: usize) {
        self.scan_faults.store(count, Ordering::SeqCst);
    }

    /// Number of advertise calls made so far.
    #[must_use]
    pub fn advertise_calls(&self) -> usize {
        self.advertise_calls.load(Ordering::SeqCst)
    }

    /// Number of withdraw calls made so far.
    #[must_use]
    pub fn withdraw_calls(&self) -> usize {
        self.withdraw_calls.load(Ordering::SeqCst)
    }

    /// Number of scan passes requested so far.
    #[must_use]
    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }
}

impl Radio for SimRadio {
    type Handle = u64;

    async fn advertise(
        &self,
        _beacon: &BeaconPayload,
        _interval: Duration,
    ) -> Result<Self::Handle, RadioError> {
        let call = self.advertise_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if take_fault(&self.advertise_faults) {
            return Err(RadioError::Advertise("injected advertise fault".into()));
        }
        Ok(call as u64)
    }

    async fn withdraw(&self, _handle: Self::Handle) -> Result<(), RadioError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scan_once(&self, window: Duration) -> Result<Vec<Observation>, RadioError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.scan_faults) {
            return Err(RadioError::Scan("injected scan fault".into()));
        }
        let scripted = self
            .passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(observations) => {
                let wait = if self.scan_latency.is_zero() {
                    window
                } else {
                    self.scan_latency.min(window)
                };
                tokio::time::sleep(wait).await;
                Ok(observations)
            }
            None => {
                tokio::time::sleep(window).await;
                Ok(Vec::new())
            }
        }
    }
}

fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
            remaining.checked_sub(1)
        })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(address: &str) -> Observation {
        Observation {
            address: address.to_string(),
            uuid: Uuid::nil(),
            major: 1,
            minor: 1,
            tx_power: 0,
            rssi: -50,
            timestamp: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_scripted_passes_pop_in_order() {
        let radio = SimRadio::with_passes(vec![
            vec![observation("AA:AA")],
            vec![observation("BB:BB"), observation("CC:CC")],
        ])
        .with_scan_latency(Duration::from_millis(1));

        let first = radio.scan_once(Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].address, "AA:AA");

        let second = radio.scan_once(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.len(), 2);

        let exhausted = radio.scan_once(Duration::from_millis(5)).await.unwrap();
        assert!(exhausted.is_empty());
        assert_eq!(radio.scan_calls(), 3);
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed() {
        let radio = SimRadio::new();
        radio.fail_next_scans(1);
        assert!(radio.scan_once(Duration::ZERO).await.is_err());
        assert!(radio.scan_once(Duration::ZERO).await.is_ok());

        radio.fail_next_advertisements(2);
        let payload = BeaconPayload {
            uuid: Uuid::nil(),
            major: 1,
            minor: 1,
            tx_power: 0,
        };
        assert!(radio.advertise(&payload, Duration::ZERO).await.is_err());
        assert!(radio.advertise(&payload, Duration::ZERO).await.is_err());
        assert!(radio.advertise(&payload, Duration::ZERO).await.is_ok());
        assert_eq!(radio.advertise_calls(), 3);
    }
}
