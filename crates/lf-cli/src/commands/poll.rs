//! Poll command implementation

use anyhow::{bail, Result};
use std::time::Duration;

use crate::cli::{GlobalArgs, PollArgs};
use crate::commands::common::{print_json, report_processing};
use crate::context::RuntimeContext;

/// Execute the poll command
pub async fn execute(args: &PollArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let poller = ctx.poller()?;

    if args.once {
        return match poller.run_once().await? {
            Some(result) if ctx.json => print_json(&result),
            Some(result) => report_processing("Poll", &result),
            None => {
                log::info!("A poll tick is already running");
                Ok(())
            }
        };
    }

    let period = match args.interval {
        Some(0) => bail!("--interval must be greater than zero"),
        Some(secs) => Duration::from_secs(secs),
        None => ctx.config.poller.interval(),
    };
    poller.run_forever(period, shutdown_signal()).await;
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed the poller keeps
/// running until the process is killed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown signal received"),
        Err(e) => {
            log::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}
