mod cli_args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cli_args::Cli;
use rolecall_runtime::{run_discord_runtime, DiscordRuntimeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DiscordRuntimeConfig {
        config_path: cli.config,
        assets_dir: cli.assets_dir,
        api_base: cli.api_base,
        bot_token: cli.discord_bot_token,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
    };
    run_discord_runtime(config).await
}
