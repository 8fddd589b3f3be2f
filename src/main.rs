//! Control API server
//!
//! Usage: `crt-harvest [--config <path>]`

use anyhow::Result;
use crt_harvest_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use crt_harvest_lib::{config_path_arg, load_app_config, run_server};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = load_app_config(config_path_arg(&args)).await?;

    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    run_server(config).await
}
