//! # pibeacon-core
//!
//! Control core of the pibeacon BLE proximity-beacon tool.
//!
//! A process runs exactly one role: an **advertiser** broadcasting an
//! iBeacon-format advertisement, or a **scanner** recording observed
//! advertisements to a per-run CSV stream. Both roles share the same
//! lifecycle contract: the run terminates when an optional timeout elapses
//! or when the operator writes a non-zero value into a control file,
//! whichever is detected first, with cancellation honored cooperatively at
//! cycle boundaries.
//!
//! ## Architecture
//!
//! - [`config`] - layered configuration (defaults, YAML file, CLI overrides)
//! - [`stop`] - timeout vs. control-file stop race and the shared latch
//! - [`beacon`] - iBeacon manufacturer-data payload codec
//! - [`radio`] - injected radio capability, plus the scripted [`SimRadio`]
//! - [`bluetooth`] - BlueZ radio implementation (feature `bluetooth`)
//! - [`advertiser`] / [`scanner`] - the two role engines
//! - [`sink`] - append-only CSV record stream
//! - [`run`] - orchestration of one run to completion
//! - [`error`] - unified error taxonomy with exit-code mapping

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertiser;
pub mod beacon;
#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod engine;
pub mod error;
pub mod radio;
pub mod run;
pub mod scanner;
pub mod sink;
pub mod stop;

// Re-export primary types for convenience
pub use advertiser::Advertiser;
pub use beacon::BeaconPayload;
#[cfg(feature = "bluetooth")]
pub use bluetooth::BlueZRadio;
pub use config::{
    resolve, AdvertiserParams, ConfigError, FileConfig, LoggingSection, Overrides, Role,
    RoleConfig, RunConfig, ScanFilters, ScannerParams,
};
pub use engine::RunState;
pub use error::{BeaconError, Result};
pub use radio::{Observation, Radio, RadioError, SimRadio};
pub use run::{execute, RunOutcome};
pub use scanner::{ScanSummary, Scanner};
pub use sink::{CsvSink, ScanRecord, CSV_HEADER};
pub use stop::{StopController, StopReason};
