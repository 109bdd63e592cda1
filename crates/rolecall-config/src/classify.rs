//! Pure classifiers for icon fields and option selectors.

use crate::model::SelectorValue;

/// Where an icon or thumbnail value points: a remote URL passed straight to
/// the transport, or a file under the local assets directory that has to be
/// uploaded as an attachment. Classification is a prefix check, never I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    Remote(String),
    Asset(String),
}

impl IconSource {
    pub fn classify(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            IconSource::Remote(value.to_string())
        } else {
            IconSource::Asset(value.to_string())
        }
    }
}

/// A selector resolved to its emoji identity: a guild custom emoji referenced
/// by id, or a literal unicode emoji matched by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmojiSelector {
    Custom(u64),
    Unicode(String),
}

impl EmojiSelector {
    /// Numeric tokens are custom-emoji ids, everything else is taken as a
    /// literal emoji. Accepts the string form of an id too, since TOML
    /// authors write both.
    pub fn classify(value: &SelectorValue) -> Self {
        match value {
            SelectorValue::CustomId(id) => EmojiSelector::Custom(*id),
            SelectorValue::Literal(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
                    match trimmed.parse::<u64>() {
                        Ok(id) => EmojiSelector::Custom(id),
                        Err(_) => EmojiSelector::Unicode(trimmed.to_string()),
                    }
                } else {
                    EmojiSelector::Unicode(trimmed.to_string())
                }
            }
        }
    }
}
