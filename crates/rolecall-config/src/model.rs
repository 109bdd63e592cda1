//! Typed declaration model mirroring the on-disk TOML layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root declaration: one guild, one global toggle policy, and the set of
/// messages rolecall keeps published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub guild_id: u64,
    #[serde(default)]
    pub remove_role_when_owned: bool,
    #[serde(default)]
    pub messages: BTreeMap<String, MessageConfig>,
}

/// One declared announcement message.
///
/// `message_id` is the only field the runtime ever mutates: it starts at 0
/// ("not yet published") and is set exactly once per publish, after which the
/// whole config is written back so restarts edit instead of re-sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    pub title: String,
    pub channel_id: u64,
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub title_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub author: AuthorConfig,
    #[serde(default)]
    pub footer: FooterConfig,
    #[serde(default)]
    pub entries: BTreeMap<String, EntryConfig>,
}

impl MessageConfig {
    pub fn is_published(&self) -> bool {
        self.message_id != 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FooterConfig {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// One selectable option inside a message: the role it toggles and the
/// selector users pick it with. A missing `emoji` means button-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub role_id: u64,
    #[serde(default)]
    pub emoji: Option<SelectorValue>,
}

/// Raw selector as written in TOML: either a custom-emoji id or a literal
/// unicode emoji. Classified into an [`crate::EmojiSelector`] at use time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    CustomId(u64),
    Literal(String),
}
