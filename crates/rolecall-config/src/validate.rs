//! Load-time validation for the declaration model.

use crate::error::ConfigError;
use crate::model::RoleConfig;

/// Parses a six-hex-digit color string into its integer value.
///
/// Anything else ("red", "#FFF", seven digits) is a declared validation
/// error, never a crash downstream.
pub fn parse_color_hex(message_key: &str, value: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidColor {
        message_key: message_key.to_string(),
        value: value.to_string(),
    };
    if value.len() != 6 || !value.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u32::from_str_radix(value, 16).map_err(|_| invalid())
}

/// Checks every required field of the declaration up front so the runtime
/// never has to second-guess ids mid-flight. Color strings are re-checked
/// per message during reconciliation so one bad block only skips itself.
pub fn validate_config(config: &RoleConfig) -> Result<(), ConfigError> {
    if config.guild_id == 0 {
        return Err(ConfigError::MissingGuildId);
    }
    for (message_key, message) in &config.messages {
        if message.title.trim().is_empty() {
            return Err(ConfigError::MissingField {
                message_key: message_key.clone(),
                field: "title",
            });
        }
        if message.channel_id == 0 {
            return Err(ConfigError::MissingField {
                message_key: message_key.clone(),
                field: "channel_id",
            });
        }
        for (entry_key, entry) in &message.entries {
            if entry.role_id == 0 {
                return Err(ConfigError::MissingRoleId {
                    message_key: message_key.clone(),
                    entry_key: entry_key.clone(),
                });
            }
        }
    }
    Ok(())
}
