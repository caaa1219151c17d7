//! Logging setup.
//!
//! Human-readable console output by default; structured JSON (with source
//! locations, for log shippers) when `log_json` is set in the monitoring
//! config. `RUST_LOG` overrides the configured level either way.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::MonitoringConfig;

pub fn init_logging(config: &MonitoringConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.log_json {
        builder
            .json()
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        builder.init();
    }

    Ok(())
}
