//! mongoclient - run MongoDB operations from the command line
//!
//! Loads `~/.mongoclient/config.toml` (or `--config`), applies environment and
//! flag overrides, runs one operation and prints the result as JSON.
//!
//! # Usage
//!
//! ```bash
//! mongoclient --uri mongodb://localhost:27017 --db shop insert orders '{"item": "pen"}'
//! mongoclient --db shop find orders '{"item": "pen"}' --limit 5
//! ```

use std::io;

use mongoclient::cli::CliInterface;
use mongoclient::client::MongoClient;
use mongoclient::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, initialize logging, then run the selected operation.
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    let mut stdout = io::stdout();
    if cli.handle_local_command(&mut stdout)? {
        return Ok(());
    }

    let client = cli.connect().await?;
    let outcome = cli.execute(&client, &mut stdout).await;
    client.close().await;
    outcome
}

/// Initialize logging system based on verbosity level
///
/// Logs go to stderr so stdout carries only JSON.
fn initialize_logging(cli: &CliInterface) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .with_writer(io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
