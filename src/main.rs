//! Driver-facing binary: stdin in, stdout out, diagnostics on stderr.

use std::io;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use tristripe::controller::{Controller, ControllerError};
use tristripe::protocol::{EventReader, EventWriter};

fn serve() -> Result<(), ControllerError> {
    let mut reader = EventReader::new(io::stdin().lock());
    let mut writer = EventWriter::new(io::stdout().lock());

    let mut controller = Controller::bootstrap(&mut reader)?;
    writer.ack_init()?;
    controller.run(&mut reader, &mut writer)
}

fn main() -> ExitCode {
    // Stdout carries the protocol; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "controller terminated");
            ExitCode::FAILURE
        }
    }
}
