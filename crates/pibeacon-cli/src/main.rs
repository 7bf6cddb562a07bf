//! # pibeacon
//!
//! BLE beacon advertiser or scanner. One process runs one role until an
//! optional timeout elapses or the operator writes a non-zero value into
//! the control file. Command line options override their corresponding
//! configuration file values.
//!
//! ## Running
//!
//! ```bash
//! # Advertise with defaults for ten minutes at most
//! pibeacon --advertiser --timeout 600
//!
//! # Scan with a configuration file, overriding the revisit cadence
//! pibeacon --scanner --config_yml pibeacon.yml --revisit 5
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use pibeacon_core::{config, run, BeaconError, FileConfig, Overrides, Role, RunConfig};
use tracing::{error, info};

mod logging;

#[derive(Debug, Parser)]
#[command(
    name = "pibeacon",
    version,
    about = "BLE beacon advertiser or scanner. Command line options override their \
             corresponding configuration file values.",
    group(ArgGroup::new("mode").required(true).args(["advertiser", "scanner"]))
)]
struct Args {
    /// Beacon advertiser mode.
    #[arg(short = 'a', long)]
    advertiser: bool,

    /// Beacon scanner mode.
    #[arg(short = 's', long)]
    scanner: bool,

    /// Configuration YAML.
    #[arg(long = "config_yml", value_name = "PATH")]
    config_yml: Option<PathBuf>,

    /// Control file.
    #[arg(long = "control_file", value_name = "PATH")]
    control_file: Option<PathBuf>,

    /// Scan output file prefix.
    #[arg(long = "scan_prefix", value_name = "PREFIX")]
    scan_prefix: Option<String>,

    /// Timeout (s) for both advertiser and scanner modes.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Beacon advertiser UUID.
    #[arg(long, value_name = "UUID")]
    uuid: Option<String>,

    /// Beacon advertiser major value.
    #[arg(long, value_name = "INT")]
    major: Option<u16>,

    /// Beacon advertiser minor value.
    #[arg(long, value_name = "INT")]
    minor: Option<u16>,

    /// Beacon advertiser TX power (dBm).
    #[arg(long = "tx_power", value_name = "INT", allow_negative_numbers = true)]
    tx_power: Option<i8>,

    /// Beacon advertiser interval (ms).
    #[arg(long, value_name = "MILLIS")]
    interval: Option<u64>,

    /// Beacon scanner revisit interval (s).
    #[arg(long, value_name = "SECONDS")]
    revisit: Option<u64>,
}

impl Args {
    const fn role(&self) -> Role {
        if self.scanner {
            Role::Scanner
        } else {
            Role::Advertiser
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            control_file: self.control_file.clone(),
            timeout: self.timeout,
            uuid: self.uuid.clone(),
            major: self.major,
            minor: self.minor,
            tx_power: self.tx_power,
            interval: self.interval,
            scan_prefix: self.scan_prefix.clone(),
            revisit: self.revisit,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let file = match args.config_yml.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file,
        Err(err) => {
            // Logging is configured from this file, so it is not up yet.
            eprintln!("pibeacon: {err}");
            return ExitCode::from(BeaconError::from(err).exit_code());
        }
    };

    if let Err(err) = logging::init(file.as_ref().map(|f| &f.logging)) {
        eprintln!("pibeacon: failed to initialize logging: {err}");
        return ExitCode::from(1);
    }

    let role = args.role();
    info!(%role, "mode selected");

    let config = match config::resolve(role, file.as_ref(), &args.overrides()) {
        Ok(config) => config,
        Err(err) => {
            let err = BeaconError::from(err);
            error!(error = %err, "configuration rejected");
            return ExitCode::from(err.exit_code());
        }
    };

    run_with_radio(&config).await
}

#[cfg(feature = "bluetooth")]
async fn run_with_radio(config: &RunConfig) -> ExitCode {
    let radio = match pibeacon_core::BlueZRadio::new().await {
        Ok(radio) => radio,
        Err(source) => {
            let err = match config.role() {
                Role::Advertiser => BeaconError::Advertiser { cycle: 0, source },
                Role::Scanner => BeaconError::Scanner { pass: 0, source },
            };
            error!(error = %err, "radio unavailable");
            return ExitCode::from(err.exit_code());
        }
    };
    finish(run::execute(config, &radio).await)
}

#[cfg(not(feature = "bluetooth"))]
async fn run_with_radio(config: &RunConfig) -> ExitCode {
    tracing::warn!("built without the `bluetooth` feature; using the simulated radio");
    let radio = pibeacon_core::SimRadio::new();
    finish(run::execute(config, &radio).await)
}

fn finish(result: pibeacon_core::Result<run::RunOutcome>) -> ExitCode {
    match result {
        Ok(outcome) => {
            info!(reason = %outcome.reason, records = outcome.records, "clean stop");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "fatal fault");
            ExitCode::from(err.exit_code())
        }
    }
}
