//! iBeacon manufacturer-data payload codec.
//!
//! The payload rides in the advertisement's manufacturer-specific data under
//! Apple's company identifier: a two-byte `0x02 0x15` prefix, the 16-byte
//! UUID, big-endian major and minor, and the calibrated TX power byte.

use uuid::Uuid;

use crate::config::AdvertiserParams;

/// Manufacturer (company) identifier the iBeacon payload is keyed under.
pub const COMPANY_ID_APPLE: u16 = 0x004C;

/// Exact length of an encoded iBeacon payload.
pub const PAYLOAD_LEN: usize = 23;

const TYPE_PROXIMITY: u8 = 0x02;
const DATA_LEN: u8 = 0x15;

/// The identity fields one beacon advertisement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconPayload {
    /// Beacon UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated TX power (dBm).
    pub tx_power: i8,
}

impl BeaconPayload {
    /// Encode into the on-air manufacturer-data bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[0] = TYPE_PROXIMITY;
        out[1] = DATA_LEN;
        out[2..18].copy_from_slice(self.uuid.as_bytes());
        out[18..20].copy_from_slice(&self.major.to_be_bytes());
        out[20..22].copy_from_slice(&self.minor.to_be_bytes());
        out[22] = self.tx_power.to_be_bytes()[0];
        out
    }

    /// Decode manufacturer-data bytes; `None` when the length or the
    /// `0x02 0x15` prefix does not match.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != PAYLOAD_LEN || data[0] != TYPE_PROXIMITY || data[1] != DATA_LEN {
            return None;
        }
        Some(Self {
            uuid: Uuid::from_slice(&data[2..18]).ok()?,
            major: u16::from_be_bytes([data[18], data[19]]),
            minor: u16::from_be_bytes([data[20], data[21]]),
            tx_power: i8::from_be_bytes([data[22]]),
        })
    }
}

impl From<&AdvertiserParams> for BeaconPayload {
    fn from(params: &AdvertiserParams) -> Self {
        Self {
            uuid: params.uuid,
            major: params.major,
            minor: params.minor,
            tx_power: params.tx_power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> BeaconPayload {
        BeaconPayload {
            uuid: "f7826da6-4fa2-4e98-8024-bc5b71e0893e".parse().unwrap(),
            major: 0x0102,
            minor: 0xFFFE,
            tx_power: -59,
        }
    }

    #[test]
    fn test_encode_layout() {
        let encoded = payload().encode();
        assert_eq!(encoded.len(), PAYLOAD_LEN);
        assert_eq!(encoded[0], 0x02);
        assert_eq!(encoded[1], 0x15);
        assert_eq!(&encoded[18..20], &[0x01, 0x02], "major is big-endian");
        assert_eq!(&encoded[20..22], &[0xFF, 0xFE], "minor is big-endian");
        assert_eq!(encoded[22] as i8, -59);
    }

    #[test]
    fn test_round_trip() {
        let original = payload();
        let decoded = BeaconPayload::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let good = payload().encode();
        assert!(BeaconPayload::decode(&good[..22]).is_none(), "short");

        let mut long = good.to_vec();
        long.push(0);
        assert!(BeaconPayload::decode(&long).is_none(), "long");

        let mut wrong_type = good;
        wrong_type[0] = 0x03;
        assert!(BeaconPayload::decode(&wrong_type).is_none(), "type byte");

        let mut wrong_len_byte = good;
        wrong_len_byte[1] = 0x14;
        assert!(BeaconPayload::decode(&wrong_len_byte).is_none(), "len byte");
    }

    #[test]
    fn test_from_params() {
        let params = AdvertiserParams {
            uuid: Uuid::nil(),
            major: 10,
            minor: 20,
            tx_power: 4,
            interval_ms: 200,
        };
        let payload = BeaconPayload::from(&params);
        assert_eq!(payload.major, 10);
        assert_eq!(payload.minor, 20);
        assert_eq!(payload.tx_power, 4);
    }
}
