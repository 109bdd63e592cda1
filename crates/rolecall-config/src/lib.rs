//! Declaration model and persistence for the rolecall bot.
//!
//! A `RoleConfig` describes the announcement messages rolecall keeps published
//! in a guild and the emoji/button-to-role mappings attached to them. The
//! model is loaded once at startup, validated eagerly, and written back only
//! when the runtime records a newly published message id.

pub mod classify;
pub mod error;
pub mod model;
pub mod store;
pub mod validate;

pub use classify::{EmojiSelector, IconSource};
pub use error::ConfigError;
pub use model::{
    AuthorConfig, EntryConfig, FooterConfig, MessageConfig, RoleConfig, SelectorValue,
};
pub use store::{load_asset, ConfigStore};
pub use validate::{parse_color_hex, validate_config};
