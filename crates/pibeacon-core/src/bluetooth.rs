//! BlueZ-backed radio implementation via [`bluer`].
//!
//! Linux only, and only with the `bluetooth` cargo feature. Advertising
//! registers an LE broadcast whose manufacturer data carries the iBeacon
//! payload; withdrawing is dropping the registration handle. A scan pass
//! drives the adapter's discovery stream for the pass window and keeps the
//! devices whose manufacturer data decodes as an iBeacon payload.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use bluer::adv::{Advertisement, AdvertisementHandle, Type};
use bluer::{Adapter, AdapterEvent, Address, Session};
use chrono::Local;
use futures::{pin_mut, StreamExt};
use tracing::{debug, trace};

use crate::beacon::{BeaconPayload, COMPANY_ID_APPLE};
use crate::radio::{Observation, Radio, RadioError};

/// Radio backed by the host's default BlueZ adapter.
pub struct BlueZRadio {
    _session: Session,
    adapter: Adapter,
}

impl BlueZRadio {
    /// Connect to bluetoothd and power on the default adapter.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::AdapterUnavailable`] when the session, the
    /// adapter, or powering it on fails.
    pub async fn new() -> Result<Self, RadioError> {
        let session = Session::new()
            .await
            .map_err(|err| RadioError::AdapterUnavailable(err.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|err| RadioError::AdapterUnavailable(err.to_string()))?;
        adapter
            .set_powered(true)
            .await
            .map_err(|err| RadioError::AdapterUnavailable(err.to_string()))?;
        debug!(adapter = adapter.name(), "bluetooth adapter ready");
        Ok(Self {
            _session: session,
            adapter,
        })
    }

    /// Read one discovered device; `None` when it is not an iBeacon or has
    /// gone away in the meantime.
    async fn inspect(&self, address: Address) -> Option<Observation> {
        let device = self.adapter.device(address).ok()?;
        let manufacturer_data = device.manufacturer_data().await.ok()??;
        let payload = manufacturer_data.get(&COMPANY_ID_APPLE)?;
        let beacon = BeaconPayload::decode(payload)?;
        let rssi = device.rssi().await.ok()??;
        Some(Observation {
            address: address.to_string(),
            uuid: beacon.uuid,
            major: beacon.major,
            minor: beacon.minor,
            tx_power: beacon.tx_power,
            rssi,
            timestamp: Local::now(),
        })
    }
}

impl Radio for BlueZRadio {
    type Handle = AdvertisementHandle;

    async fn advertise(
        &self,
        beacon: &BeaconPayload,
        interval: Duration,
    ) -> Result<Self::Handle, RadioError> {
        let advertisement = Advertisement {
            advertisement_type: Type::Broadcast,
            manufacturer_data: BTreeMap::from([(COMPANY_ID_APPLE, beacon.encode().to_vec())]),
            min_interval: Some(interval),
            max_interval: Some(interval),
            tx_power: Some(i16::from(beacon.tx_power)),
            ..Default::default()
        };
        self.adapter
            .advertise(advertisement)
            .await
            .map_err(|err| RadioError::Advertise(err.to_string()))
    }

    async fn withdraw(&self, handle: Self::Handle) -> Result<(), RadioError> {
        // Dropping the handle unregisters the advertisement.
        drop(handle);
        Ok(())
    }

    async fn scan_once(&self, window: Duration) -> Result<Vec<Observation>, RadioError> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|err| RadioError::Scan(err.to_string()))?;
        pin_mut!(events);

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        let mut observations = Vec::new();
        let mut seen = HashSet::new();
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        if seen.insert(address) {
                            if let Some(observation) = self.inspect(address).await {
                                trace!(%address, rssi = observation.rssi, "beacon observed");
                                observations.push(observation);
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        Ok(observations)
    }
}
