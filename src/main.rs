use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use wire_lob::{App, Config};

fn main() -> ExitCode {
    // Stdout is reserved for canonical records; all tracing goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    match App::new(config).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "engine terminated");
            ExitCode::FAILURE
        }
    }
}
