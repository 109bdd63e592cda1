use std::path::PathBuf;

use clap::Parser;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "rolecall",
    about = "Declarative Discord role-assignment bot driven by a TOML config",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "ROLECALL_CONFIG",
        default_value = "rolecall.toml",
        help = "Path to the role config. Assigned message ids are written back to this file."
    )]
    pub config: PathBuf,

    #[arg(
        long,
        env = "ROLECALL_ASSETS_DIR",
        default_value = "assets",
        help = "Directory holding local image assets referenced by the config."
    )]
    pub assets_dir: PathBuf,

    #[arg(
        long,
        env = "DISCORD_BOT_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for both the REST api and the gateway."
    )]
    pub discord_bot_token: String,

    #[arg(
        long,
        env = "ROLECALL_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST api base url."
    )]
    pub api_base: String,

    #[arg(
        long,
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout in milliseconds."
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Maximum attempts per REST request, counting the first."
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long,
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base backoff delay in milliseconds for retried REST requests."
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long,
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay in milliseconds before reconnecting after a gateway drop."
    )]
    pub reconnect_delay_ms: u64,
}
