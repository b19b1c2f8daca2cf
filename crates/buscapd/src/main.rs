//! Entry point for the bus capture daemon.
//!
//! Delegates to [`buscapd::run_daemon`], which reads the command line and
//! environment, installs telemetry and serves the control socket until a
//! termination signal arrives.

use std::io::{self, Write};
use std::process::ExitCode;

use buscap_config::ConfigError;
use buscapd::{LaunchError, run_daemon};

fn main() -> ExitCode {
    match run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(LaunchError::Config {
            source: ConfigError::Cli { source },
        }) => source.exit(),
        Err(error) => {
            let mut stderr = io::stderr().lock();
            let _written = writeln!(stderr, "buscapd: {error}");
            ExitCode::FAILURE
        }
    }
}
