//! Command-line harness for the statebridge facade.
//!
//! Loads the facade over the in-process stub module, subscribes a logging
//! listener to every configured event name, replays an action script
//! through `dispatch`, and prints the final container state as JSON.
//!
//! # Usage
//!
//! ```text
//! statebridge [CONFIG] [SCRIPT]
//! ```
//!
//! `CONFIG` defaults to `statebridge.yaml`; a missing file means defaults.
//! `SCRIPT` defaults to standard input.
//!
//! # Startup Sequence
//!
//! 1. Load configuration
//! 2. Initialize structured logging (tracing)
//! 3. Load the module and obtain the facade
//! 4. Subscribe logging listeners
//! 5. Replay the script
//! 6. Print the final state

mod error;
mod script;

use std::path::{Path, PathBuf};

use statebridge_core::config::{BridgeConfig, LoggingConfig};
use statebridge_core::stub::StubModule;
use statebridge_core::{Listener, Loader};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

const DEFAULT_CONFIG_PATH: &str = "statebridge.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, module loading, or the script fails.
#[tokio::main]
async fn main() -> Result<(), CliError> {
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let script_path = args.next().map(PathBuf::from);

    // 1. Load configuration.
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        module = config.module.identifier,
        init_timeout_ms = config.module.init_timeout_ms,
        "statebridge starting"
    );

    // 3. Load the module.
    let loader = Loader::new(StubModule::new(), config.module.clone());
    let container = loader.load().await?;
    info!(state = %loader.state(), "facade ready");

    // 4. Subscribe logging listeners.
    let listeners: Vec<(String, Listener)> = config
        .harness
        .subscribe
        .iter()
        .map(|event| {
            let name = event.clone();
            let listener = Listener::infallible(move |args| {
                info!(event = name, %args, "notification");
            });
            container.on(event, &listener);
            (event.clone(), listener)
        })
        .collect();
    info!(subscriptions = listeners.len(), "listeners subscribed");

    // 5. Replay the script.
    let reader: Box<dyn AsyncBufRead + Unpin> = match &script_path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let requests = script::read_requests(reader).await?;
    let dispatched = requests.len();
    for request in requests {
        container.dispatch(request);
    }
    info!(dispatched, "script replayed");

    for (event, listener) in &listeners {
        container.off(event, listener);
    }

    // 6. Print the final state.
    println!("{}", serde_json::to_string_pretty(&container.get_state())?);
    Ok(())
}

/// Read the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<BridgeConfig, CliError> {
    if path.exists() {
        Ok(BridgeConfig::from_file(path)?)
    } else {
        Ok(BridgeConfig::parse("")?)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
