//! deployd CLI entrypoint

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use deployd::cli::Cli;

/// How long to wait for leftover blocking work once the command returns.
///
/// A stdin read sits on a blocking thread that cannot be cancelled; without
/// a bound, an idle pipe would keep the process alive after shutdown.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    // Logging is initialized once the config is loaded
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(cli.execute());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    result
}
