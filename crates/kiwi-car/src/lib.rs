//! Kiwi Car Intersection Program
//!
//! Wires the intersection arbiter, the direction chooser and the maneuver
//! controller to one in-process bus and drives them from a detection stream.

pub mod chooser;
pub mod cli;
pub mod config;
pub mod runtime;

pub use chooser::DirectionChooser;
pub use cli::{usage, CliArgs, CliError, DirectionMode};
pub use config::{AppConfig, BusConfig};
pub use runtime::{IntersectionRuntime, RunSummary};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
