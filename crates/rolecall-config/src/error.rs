use thiserror::Error;

/// Declaration problems surfaced at load time (fatal) or when a single
/// message block turns out to be unusable (recoverable, that block skipped).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("guild_id must be a non-zero Discord guild id")]
    MissingGuildId,
    #[error("message block \"{message_key}\" is missing a non-empty {field}")]
    MissingField {
        message_key: String,
        field: &'static str,
    },
    #[error(
        "message block \"{message_key}\" has an invalid color \"{value}\"; \
         use six hex digits such as FFFFFF or 000000"
    )]
    InvalidColor { message_key: String, value: String },
    #[error("entry \"{entry_key}\" in message block \"{message_key}\" needs a non-zero role_id")]
    MissingRoleId {
        message_key: String,
        entry_key: String,
    },
    #[error("asset name \"{name}\" must be a bare file name inside the assets directory")]
    UnsafeAssetName { name: String },
    #[error("failed to read asset \"{name}\": {source}")]
    Asset {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
