use anyhow::{Context, Result};
use env_logger::Env;

use rs485_lights::cli::{build_cli, handle_subcommands};
use rs485_lights::modbus::master::EVENT_LOG_TARGET;
use rs485_lights::Config;

fn init_logging(verbose: bool) {
    // Events are already printed by the console sink; keep them out of stderr
    // unless debugging.
    let default_filter = if verbose {
        "debug".to_string()
    } else {
        format!("info,{}=off", EVENT_LOG_TARGET)
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = Config::from_matches(&matches).context("Failed to load configuration")?;
    handle_subcommands(&matches, config).await
}
