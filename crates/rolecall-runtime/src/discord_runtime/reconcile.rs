//! Idempotent sync of declared message blocks against live channel state.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use thiserror::Error;

use rolecall_config::{
    load_asset, parse_color_hex, ConfigError, ConfigStore, EmojiSelector, IconSource,
    MessageConfig, RoleConfig,
};

use super::discord_api_client::{
    error_status, DiscordApiClient, DiscordMessage, MessageAttachment,
};

#[derive(Debug, Error)]
pub(super) enum ReconcileError {
    #[error(
        "channel {channel_id} for message block \"{message_key}\" does not exist; \
         correct channel_id in the config"
    )]
    ChannelNotFound { message_key: String, channel_id: u64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "transport rejected message block \"{message_key}\"; check that icon and thumbnail \
         links start with http or https: {detail}"
    )]
    Rejected { message_key: String, detail: String },
    #[error("message block \"{message_key}\" failed: {source}")]
    Transport {
        message_key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Counters for one reconciliation pass, logged when the pass completes.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub edited: usize,
    pub reactions_added: usize,
    pub persisted: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
}

#[derive(Debug)]
pub(super) struct SyncOutcome {
    pub(super) message_id: u64,
    pub(super) created: bool,
    pub(super) reactions_added: usize,
}

/// The `custom_id` wire contract between the button builder and the
/// selection router: the role id is encoded directly, no entry lookup on
/// the way back.
pub(super) fn role_custom_id(role_id: u64) -> String {
    format!("rolecall:role:{role_id}")
}

struct ResolvedSelector {
    /// Raw reaction value for REST calls: `name:id` or the unicode emoji.
    reaction_value: String,
    /// Emoji object embedded in a button component.
    button_emoji: Value,
}

fn resolve_selector(
    selector: &EmojiSelector,
    emoji_names: &BTreeMap<u64, String>,
) -> Option<ResolvedSelector> {
    match selector {
        EmojiSelector::Custom(id) => {
            let name = emoji_names.get(id)?;
            Some(ResolvedSelector {
                reaction_value: format!("{name}:{id}"),
                button_emoji: json!({ "id": id.to_string(), "name": name }),
            })
        }
        EmojiSelector::Unicode(emoji) => Some(ResolvedSelector {
            reaction_value: emoji.clone(),
            button_emoji: json!({ "name": emoji }),
        }),
    }
}

#[derive(Debug)]
pub(super) struct ResolvedMessage {
    pub(super) payload: Value,
    pub(super) attachments: Vec<MessageAttachment>,
    /// Reaction values to keep applied on the published message, declared order.
    pub(super) reactions: Vec<String>,
}

fn attach_icon(
    assets_dir: &Path,
    value: &str,
    attachments: &mut Vec<MessageAttachment>,
) -> Result<String, ReconcileError> {
    match IconSource::classify(value) {
        IconSource::Remote(url) => Ok(url),
        IconSource::Asset(name) => {
            let bytes = load_asset(assets_dir, &name)?;
            let url = format!("attachment://{name}");
            attachments.push(MessageAttachment { name, bytes });
            Ok(url)
        }
    }
}

/// Builds the complete outbound payload for one declared message: embed,
/// button components when entries exist, and attachment descriptors. The
/// payload always carries `components` and `attachments` so an edit replaces
/// prior state wholesale instead of merging.
pub(super) fn resolve_message(
    message_key: &str,
    message: &MessageConfig,
    emoji_names: &BTreeMap<u64, String>,
    assets_dir: &Path,
) -> Result<ResolvedMessage, ReconcileError> {
    let mut attachments = Vec::new();
    let mut embed = json!({ "title": message.title });

    if let Some(url) = &message.title_url {
        embed["url"] = Value::from(url.clone());
    }
    if let Some(description) = &message.description {
        embed["description"] = Value::from(description.clone());
    }
    if let Some(color) = &message.color {
        embed["color"] = Value::from(parse_color_hex(message_key, color)?);
    }
    if let Some(thumbnail) = &message.thumbnail {
        let url = attach_icon(assets_dir, thumbnail, &mut attachments)?;
        embed["thumbnail"] = json!({ "url": url });
    }
    if let Some(name) = &message.author.name {
        let mut author = json!({ "name": name });
        if let Some(icon) = &message.author.icon {
            let url = attach_icon(assets_dir, icon, &mut attachments)?;
            author["icon_url"] = Value::from(url);
        }
        if let Some(url) = &message.author.url {
            author["url"] = Value::from(url.clone());
        }
        embed["author"] = author;
    }
    if let Some(text) = &message.footer.text {
        let mut footer = json!({ "text": text });
        if let Some(icon) = &message.footer.icon_url {
            let url = attach_icon(assets_dir, icon, &mut attachments)?;
            footer["icon_url"] = Value::from(url);
        }
        embed["footer"] = footer;
    }

    let mut fields = Vec::new();
    let mut buttons = Vec::new();
    let mut button_keys = Vec::new();
    let mut reactions = Vec::new();
    for (entry_key, entry) in &message.entries {
        fields.push(json!({
            "name": entry.title.clone().unwrap_or_else(|| entry_key.clone()),
            "value": entry
                .description
                .clone()
                .unwrap_or_else(|| "\u{200b}".to_string()),
            "inline": false,
        }));

        let mut button = json!({
            "type": 2,
            "style": 2,
            "label": entry.title.clone().unwrap_or_else(|| entry_key.clone()),
            "custom_id": role_custom_id(entry.role_id),
        });
        if let Some(selector) = &entry.emoji {
            match resolve_selector(&EmojiSelector::classify(selector), emoji_names) {
                Some(resolved) => {
                    button["emoji"] = resolved.button_emoji;
                    reactions.push(resolved.reaction_value);
                }
                None => {
                    // Unknown custom emoji id: the entry stays usable as a
                    // plain button instead of failing the whole block.
                    eprintln!(
                        "rolecall could not resolve custom emoji for entry \"{entry_key}\" in \
                         message block \"{message_key}\"; entry degrades to button-only"
                    );
                }
            }
        }
        buttons.push(button);
        button_keys.push(entry_key.as_str());
    }
    if !fields.is_empty() {
        embed["fields"] = Value::from(fields);
    }

    // Discord caps a message at 5 action rows of 5 buttons.
    const MAX_BUTTONS: usize = 25;
    if buttons.len() > MAX_BUTTONS {
        eprintln!(
            "rolecall message block \"{message_key}\" declares {} button entries but only \
             {MAX_BUTTONS} fit; dropping: {}",
            buttons.len(),
            button_keys[MAX_BUTTONS..].join(", ")
        );
        buttons.truncate(MAX_BUTTONS);
    }
    let components = buttons
        .chunks(5)
        .map(|row| json!({ "type": 1, "components": row }))
        .collect::<Vec<_>>();

    let attachment_descriptors = attachments
        .iter()
        .enumerate()
        .map(|(index, attachment)| json!({ "id": index, "filename": attachment.name }))
        .collect::<Vec<_>>();

    let payload = json!({
        "embeds": [embed],
        "components": components,
        "attachments": attachment_descriptors,
    });

    Ok(ResolvedMessage {
        payload,
        attachments,
        reactions,
    })
}

fn classify_transport_error(
    message_key: &str,
    channel_id: u64,
    error: anyhow::Error,
) -> ReconcileError {
    match error_status(&error) {
        Some(404) => ReconcileError::ChannelNotFound {
            message_key: message_key.to_string(),
            channel_id,
        },
        Some(400) => ReconcileError::Rejected {
            message_key: message_key.to_string(),
            detail: error.to_string(),
        },
        _ => ReconcileError::Transport {
            message_key: message_key.to_string(),
            source: error,
        },
    }
}

fn reaction_values_present(message: &DiscordMessage) -> HashSet<String> {
    message
        .reactions
        .iter()
        .filter_map(|reaction| match (&reaction.emoji.id, &reaction.emoji.name) {
            (Some(id), Some(name)) => Some(format!("{name}:{id}")),
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Creates or edits one declared message. The fetch-first shape keeps the
/// pass idempotent: a live `message_id` turns into a single edit, a missing
/// one (deleted or never published) falls through to a fresh send.
pub(super) async fn sync_message(
    api: &DiscordApiClient,
    assets_dir: &Path,
    message_key: &str,
    message: &MessageConfig,
    emoji_names: &BTreeMap<u64, String>,
) -> Result<SyncOutcome, ReconcileError> {
    let resolved = resolve_message(message_key, message, emoji_names, assets_dir)?;

    let existing = if message.is_published() {
        api.fetch_message(message.channel_id, message.message_id)
            .await
            .map_err(|error| classify_transport_error(message_key, message.channel_id, error))?
    } else {
        None
    };

    let (published, created) = match existing {
        Some(_) => {
            let edited = api
                .edit_message(
                    message.channel_id,
                    message.message_id,
                    &resolved.payload,
                    &resolved.attachments,
                )
                .await
                .map_err(|error| {
                    classify_transport_error(message_key, message.channel_id, error)
                })?;
            (edited, false)
        }
        None => {
            let sent = api
                .create_message(message.channel_id, &resolved.payload, &resolved.attachments)
                .await
                .map_err(|error| {
                    classify_transport_error(message_key, message.channel_id, error)
                })?;
            (sent, true)
        }
    };

    let message_id = published.id_u64().map_err(|error| ReconcileError::Transport {
        message_key: message_key.to_string(),
        source: error,
    })?;

    let already_present = reaction_values_present(&published);
    let mut reactions_added = 0;
    for value in &resolved.reactions {
        if already_present.contains(value) {
            continue;
        }
        match api
            .create_reaction(message.channel_id, message_id, value)
            .await
        {
            Ok(()) => reactions_added += 1,
            Err(error) => eprintln!(
                "rolecall could not seed reaction {value} on message block \
                 \"{message_key}\": {error}"
            ),
        }
    }

    Ok(SyncOutcome {
        message_id,
        created,
        reactions_added,
    })
}

/// Reconciles every declared message block independently: one bad block is
/// logged and skipped, the rest still publish. Newly assigned message ids
/// are written back through the store before the next block is touched, so
/// a crash mid-pass never sends duplicates on restart. Callers must not run
/// two passes concurrently against the same model.
pub(super) async fn reconcile_all(
    api: &DiscordApiClient,
    store: &ConfigStore,
    config: &mut RoleConfig,
    assets_dir: &Path,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let emoji_names = match api.list_guild_emojis(config.guild_id).await {
        Ok(list) => list
            .into_iter()
            .filter_map(|emoji| {
                let id = emoji.id.as_deref()?.trim().parse::<u64>().ok()?;
                Some((id, emoji.name?))
            })
            .collect::<BTreeMap<u64, String>>(),
        Err(error) => {
            eprintln!(
                "rolecall could not list guild emojis; custom selectors degrade to \
                 button-only this pass: {error}"
            );
            BTreeMap::new()
        }
    };

    let keys = config.messages.keys().cloned().collect::<Vec<_>>();
    for key in keys {
        let Some(message) = config.messages.get(&key).cloned() else {
            continue;
        };
        match sync_message(api, assets_dir, &key, &message, &emoji_names).await {
            Ok(outcome) => {
                if outcome.created {
                    report.created += 1;
                } else {
                    report.edited += 1;
                }
                report.reactions_added += outcome.reactions_added;

                if outcome.message_id != message.message_id {
                    if let Some(live) = config.messages.get_mut(&key) {
                        live.message_id = outcome.message_id;
                    }
                    match store.save(config) {
                        Ok(()) => report.persisted += 1,
                        Err(error) => eprintln!(
                            "rolecall failed to persist message id {} for block \"{key}\": {error}",
                            outcome.message_id
                        ),
                    }
                }
            }
            Err(error) => {
                report.failed += 1;
                report.failed_keys.push(key.clone());
                eprintln!("rolecall reconcile skipped message block \"{key}\": {error}");
            }
        }
    }

    report
}
