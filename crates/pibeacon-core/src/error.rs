//! Unified error types for the pibeacon control core.
//!
//! Configuration problems are always fatal before the run starts; radio
//! faults start out transient (logged and retried by the engines) and only
//! become a [`BeaconError`] once the bounded consecutive-failure count is
//! exceeded. Sink write failures are immediately fatal because a partially
//! flushed record stream would silently corrupt the output contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::radio::RadioError;

/// The unified error type for a beacon run.
///
/// Every variant maps to a stable process exit code via
/// [`BeaconError::exit_code`]; a clean stop (timeout or operator signal)
/// never produces one of these.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// The resolved configuration violated an invariant. Raised before any
    /// side effect of the run.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The advertiser exceeded the consecutive radio-fault bound.
    #[error("advertiser aborted at cycle {cycle}: {source}")]
    Advertiser {
        /// Advertise cycle during which the run was abandoned (0 when the
        /// radio could not be brought up at all).
        cycle: u64,
        /// Last radio fault observed.
        source: RadioError,
    },

    /// The scanner exceeded the consecutive radio-fault bound.
    #[error("scanner aborted at pass {pass}: {source}")]
    Scanner {
        /// Scan pass during which the run was abandoned (0 when the radio
        /// could not be brought up at all).
        pass: u64,
        /// Last radio fault observed.
        source: RadioError,
    },

    /// The scan record stream could not be opened, written, or closed.
    #[error("scan output stream failure ({context}): {source}")]
    Sink {
        /// Where in the stream lifecycle the failure occurred.
        context: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The operator control file could not be initialized.
    #[error("control file {} is not usable: {source}", path.display())]
    ControlFile {
        /// Configured control file path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// A specialized [`Result`] type for beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error was raised during configuration
    /// resolution, before the run had any side effect.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if this error aborted an advertiser run.
    #[inline]
    #[must_use]
    pub const fn is_advertiser_error(&self) -> bool {
        matches!(self, Self::Advertiser { .. })
    }

    /// Returns `true` if this error aborted a scanner run, including
    /// failures of the scan record stream it owns.
    #[inline]
    #[must_use]
    pub const fn is_scanner_error(&self) -> bool {
        matches!(self, Self::Scanner { .. } | Self::Sink { .. })
    }

    /// Process exit code reported for this error.
    ///
    /// `0` is reserved for a clean stop, so every variant maps to a
    /// non-zero code: general I/O 1, configuration 2, advertiser 3,
    /// scanner (and its record stream) 4.
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ControlFile { .. } => 1,
            Self::Config(_) => 2,
            Self::Advertiser { .. } => 3,
            Self::Scanner { .. } | Self::Sink { .. } => 4,
        }
    }
}
