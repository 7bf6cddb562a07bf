//! Layered run configuration.
//!
//! A run's configuration is assembled once at startup from three layers:
//! built-in defaults, an optional YAML document, and explicit command line
//! overrides. Presence is tracked per field with `Option` wrappers — an
//! override that was actually given always wins over the file value for the
//! same key, and an absent override never changes it. The resolved
//! [`RunConfig`] is immutable for the rest of the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::radio::Observation;

/// Allowed iBeacon major range.
pub const MAJOR_LIMITS: (u16, u16) = (1, 65_535);
/// Allowed iBeacon minor range.
pub const MINOR_LIMITS: (u16, u16) = (1, 65_535);
/// Allowed calibrated TX power range (dBm).
pub const TX_POWER_LIMITS: (i8, i8) = (-40, 4);
/// Allowed advertising interval range (ms).
pub const INTERVAL_LIMITS_MS: (u64, u64) = (20, 10_000);
/// Longest run a timeout may request.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_ADVERTISER_CONTROL_FILE: &str = "advertiser_control";
const DEFAULT_SCANNER_CONTROL_FILE: &str = "scanner_control";
const DEFAULT_SCAN_PREFIX: &str = "pibeacon_scan";
const DEFAULT_MAJOR: u16 = 1;
const DEFAULT_MINOR: u16 = 1;
const DEFAULT_TX_POWER: i8 = 1;
const DEFAULT_INTERVAL_MS: u64 = 200;
const DEFAULT_REVISIT_SECS: u64 = 1;

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The configuration file exists but is not a valid YAML document.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying parse failure.
        source: serde_yaml::Error,
    },

    /// A resolved field violates an invariant.
    #[error("invalid configuration for {field}: {message}")]
    Validation {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable explanation.
        message: String,
    },
}

/// A specialized [`Result`] type for configuration resolution.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// The role a run executes. Exactly one per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Broadcast an iBeacon advertisement.
    Advertiser,
    /// Listen for advertisements and record measurements.
    Scanner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advertiser => f.write_str("advertiser"),
            Self::Scanner => f.write_str("scanner"),
        }
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Operator stop-signal file.
    pub control_file: PathBuf,
    /// Maximum run duration; `None` means only the operator can stop the run.
    pub timeout: Option<Duration>,
    /// Parameters of the active role.
    pub role: RoleConfig,
}

impl RunConfig {
    /// The active role.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self.role {
            RoleConfig::Advertiser(_) => Role::Advertiser,
            RoleConfig::Scanner(_) => Role::Scanner,
        }
    }
}

/// Role-specific parameters; exactly one variant is active per run.
#[derive(Debug, Clone)]
pub enum RoleConfig {
    /// Advertiser parameters.
    Advertiser(AdvertiserParams),
    /// Scanner parameters.
    Scanner(ScannerParams),
}

/// Parameters of an advertiser run.
#[derive(Debug, Clone)]
pub struct AdvertiserParams {
    /// Beacon UUID carried in the advertisement.
    pub uuid: Uuid,
    /// iBeacon major value.
    pub major: u16,
    /// iBeacon minor value.
    pub minor: u16,
    /// Calibrated TX power (dBm) carried in the advertisement.
    pub tx_power: i8,
    /// Advertising interval and re-advertise cadence (ms).
    pub interval_ms: u64,
}

/// Parameters of a scanner run.
#[derive(Debug, Clone)]
pub struct ScannerParams {
    /// Prefix of the generated scan output file.
    pub scan_prefix: String,
    /// Cadence between successive scan passes (s).
    pub revisit_secs: u64,
    /// Filters applied to every observation.
    pub filters: ScanFilters,
}

/// Conjunctive per-observation filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilters {
    /// Exact-match device address, when set.
    pub address: Option<String>,
    /// Minimum accepted RSSI (dBm), when set.
    pub rssi_floor: Option<i16>,
}

impl ScanFilters {
    /// Whether an observation passes every configured filter.
    #[must_use]
    pub fn accepts(&self, observation: &Observation) -> bool {
        if let Some(address) = &self.address {
            if observation.address != *address {
                return false;
            }
        }
        if let Some(floor) = self.rssi_floor {
            if observation.rssi < floor {
                return false;
            }
        }
        true
    }
}

/// Parsed configuration file. Every section and field is optional; unknown
/// keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Advertiser section.
    pub advertiser: AdvertiserSection,
    /// Scanner section.
    pub scanner: ScannerSection,
    /// Logging section, passed through to the logging collaborator.
    pub logging: LoggingSection,
}

/// `advertiser` section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvertiserSection {
    /// Operator stop-signal file.
    pub control_file: Option<PathBuf>,
    /// Maximum run duration (s).
    pub timeout: Option<f64>,
    /// Beacon UUID in canonical textual form; empty means "generate one".
    pub uuid: Option<String>,
    /// iBeacon major value.
    pub major: Option<u16>,
    /// iBeacon minor value.
    pub minor: Option<u16>,
    /// Calibrated TX power (dBm).
    pub tx_power: Option<i8>,
    /// Advertising interval (ms).
    pub interval: Option<u64>,
}

/// `scanner` section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    /// Operator stop-signal file.
    pub control_file: Option<PathBuf>,
    /// Maximum run duration (s).
    pub timeout: Option<f64>,
    /// Prefix of the generated scan output file.
    pub scan_prefix: Option<String>,
    /// Cadence between successive scan passes (s).
    pub revisit: Option<u64>,
    /// Observation filters.
    pub filters: FilterSection,
}

/// `scanner.filters` section of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    /// Exact-match device address.
    pub address: Option<String>,
    /// Minimum accepted RSSI (dBm).
    pub rssi: Option<i16>,
}

/// `logging` section of the configuration file. Opaque to the control core;
/// the binary hands it to the logging setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default log filter when neither the environment nor the command line
    /// says otherwise.
    pub level: Option<String>,
    /// Directory for rolling log files; stdout only when absent.
    pub directory: Option<PathBuf>,
}

impl FileConfig {
    /// Load and parse a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not a valid document.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Command line overrides. `None` means "flag not given" — the file value
/// (or default) stays in effect for that field.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Operator stop-signal file.
    pub control_file: Option<PathBuf>,
    /// Maximum run duration (s).
    pub timeout: Option<f64>,
    /// Beacon UUID in canonical textual form.
    pub uuid: Option<String>,
    /// iBeacon major value.
    pub major: Option<u16>,
    /// iBeacon minor value.
    pub minor: Option<u16>,
    /// Calibrated TX power (dBm).
    pub tx_power: Option<i8>,
    /// Advertising interval (ms).
    pub interval: Option<u64>,
    /// Prefix of the generated scan output file.
    pub scan_prefix: Option<String>,
    /// Cadence between successive scan passes (s).
    pub revisit: Option<u64>,
}

/// Merge defaults, file values, and overrides into one validated
/// [`RunConfig`] for the requested role.
///
/// No side effects: nothing is created or touched on disk here.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any resolved field violates an
/// invariant (range limits, malformed UUID, non-positive cadence).
pub fn resolve(
    role: Role,
    file: Option<&FileConfig>,
    overrides: &Overrides,
) -> ConfigResult<RunConfig> {
    match role {
        Role::Advertiser => resolve_advertiser(file.map(|f| &f.advertiser), overrides),
        Role::Scanner => resolve_scanner(file.map(|f| &f.scanner), overrides),
    }
}

fn resolve_advertiser(
    section: Option<&AdvertiserSection>,
    overrides: &Overrides,
) -> ConfigResult<RunConfig> {
    let control_file = overrides
        .control_file
        .clone()
        .or_else(|| section.and_then(|s| s.control_file.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ADVERTISER_CONTROL_FILE));
    let timeout = resolve_timeout(overrides.timeout.or_else(|| section.and_then(|s| s.timeout)))?;

    let uuid_text = overrides
        .uuid
        .clone()
        .or_else(|| section.and_then(|s| s.uuid.clone()));
    let params = AdvertiserParams {
        uuid: resolve_uuid(uuid_text.as_deref())?,
        major: in_range(
            "major",
            overrides
                .major
                .or_else(|| section.and_then(|s| s.major))
                .unwrap_or(DEFAULT_MAJOR),
            MAJOR_LIMITS,
        )?,
        minor: in_range(
            "minor",
            overrides
                .minor
                .or_else(|| section.and_then(|s| s.minor))
                .unwrap_or(DEFAULT_MINOR),
            MINOR_LIMITS,
        )?,
        tx_power: in_range(
            "tx_power",
            overrides
                .tx_power
                .or_else(|| section.and_then(|s| s.tx_power))
                .unwrap_or(DEFAULT_TX_POWER),
            TX_POWER_LIMITS,
        )?,
        interval_ms: in_range(
            "interval",
            overrides
                .interval
                .or_else(|| section.and_then(|s| s.interval))
                .unwrap_or(DEFAULT_INTERVAL_MS),
            INTERVAL_LIMITS_MS,
        )?,
    };

    Ok(RunConfig {
        control_file,
        timeout,
        role: RoleConfig::Advertiser(params),
    })
}

fn resolve_scanner(
    section: Option<&ScannerSection>,
    overrides: &Overrides,
) -> ConfigResult<RunConfig> {
    let control_file = overrides
        .control_file
        .clone()
        .or_else(|| section.and_then(|s| s.control_file.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCANNER_CONTROL_FILE));
    let timeout = resolve_timeout(overrides.timeout.or_else(|| section.and_then(|s| s.timeout)))?;

    let revisit_secs = overrides
        .revisit
        .or_else(|| section.and_then(|s| s.revisit))
        .unwrap_or(DEFAULT_REVISIT_SECS);
    if revisit_secs == 0 {
        return Err(ConfigError::Validation {
            field: "revisit",
            message: "must be strictly positive".into(),
        });
    }

    let params = ScannerParams {
        scan_prefix: overrides
            .scan_prefix
            .clone()
            .or_else(|| section.and_then(|s| s.scan_prefix.clone()))
            .unwrap_or_else(|| DEFAULT_SCAN_PREFIX.to_string()),
        revisit_secs,
        filters: ScanFilters {
            address: section.and_then(|s| s.filters.address.clone()),
            rssi_floor: section.and_then(|s| s.filters.rssi),
        },
    };

    Ok(RunConfig {
        control_file,
        timeout,
        role: RoleConfig::Scanner(params),
    })
}

fn resolve_timeout(secs: Option<f64>) -> ConfigResult<Option<Duration>> {
    let Some(secs) = secs else {
        return Ok(None);
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Validation {
            field: "timeout",
            message: format!("{secs} is not strictly positive"),
        });
    }
    if secs > MAX_TIMEOUT.as_secs_f64() {
        return Err(ConfigError::Validation {
            field: "timeout",
            message: format!("{secs} exceeds the {} s maximum", MAX_TIMEOUT.as_secs()),
        });
    }
    Ok(Some(Duration::from_secs_f64(secs)))
}

fn resolve_uuid(text: Option<&str>) -> ConfigResult<Uuid> {
    match text {
        Some(text) if !text.is_empty() => {
            Uuid::parse_str(text).map_err(|err| ConfigError::Validation {
                field: "uuid",
                message: format!("{text:?} is not a canonical UUID: {err}"),
            })
        }
        _ => {
            let generated = Uuid::new_v4();
            debug!(uuid = %generated, "no beacon UUID configured; generated one");
            Ok(generated)
        }
    }
}

fn in_range<T>(field: &'static str, value: T, limits: (T, T)) -> ConfigResult<T>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value < limits.0 || value > limits.1 {
        return Err(ConfigError::Validation {
            field,
            message: format!("{value} outside allowed range [{}, {}]", limits.0, limits.1),
        });
    }
    Ok(value)
}
