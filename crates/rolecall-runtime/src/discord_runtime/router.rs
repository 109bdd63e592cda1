//! Maps incoming reaction and button events onto role toggles.

use anyhow::Result;

use rolecall_config::{EmojiSelector, RoleConfig};

use super::discord_api_client::DiscordApiClient;
use super::role_toggle::{apply_toggle, ToggleOutcome};

#[derive(Debug, Clone)]
pub(super) struct ReactionEvent {
    pub(super) channel_id: u64,
    pub(super) message_id: u64,
    pub(super) user_id: u64,
    pub(super) emoji_id: Option<u64>,
    pub(super) emoji_name: Option<String>,
}

#[derive(Debug, Clone)]
pub(super) struct InteractionEvent {
    pub(super) interaction_id: String,
    pub(super) token: String,
    pub(super) user_id: u64,
    pub(super) custom_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Selection {
    pub(super) message_key: String,
    pub(super) entry_key: String,
    pub(super) role_id: u64,
}

/// Finds the declared entry a reaction refers to. Custom selectors match on
/// the emoji id alone, unicode selectors require an id-less event with the
/// exact literal. Duplicate selectors within one message resolve to the
/// first entry in key order.
pub(super) fn resolve_reaction_selection(
    config: &RoleConfig,
    event: &ReactionEvent,
) -> Option<Selection> {
    let (message_key, message) = config
        .messages
        .iter()
        .find(|(_, message)| message.is_published() && message.message_id == event.message_id)?;

    for (entry_key, entry) in &message.entries {
        let Some(selector) = &entry.emoji else {
            continue;
        };
        let matched = match EmojiSelector::classify(selector) {
            EmojiSelector::Custom(id) => event.emoji_id == Some(id),
            EmojiSelector::Unicode(emoji) => {
                event.emoji_id.is_none() && event.emoji_name.as_deref() == Some(emoji.as_str())
            }
        };
        if matched {
            return Some(Selection {
                message_key: message_key.clone(),
                entry_key: entry_key.clone(),
                role_id: entry.role_id,
            });
        }
    }
    None
}

/// Extracts the role id from a button `custom_id`. Anything that is not
/// exactly `rolecall:role:` followed by a nonzero decimal id is rejected;
/// the wire value is attacker-reachable and never trusted as-is.
pub(super) fn parse_role_custom_id(custom_id: &str) -> Option<u64> {
    let digits = custom_id.strip_prefix("rolecall:role:")?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|id| *id != 0)
}

fn event_reaction_value(event: &ReactionEvent) -> Option<String> {
    let name = event.emoji_name.as_deref()?;
    match event.emoji_id {
        Some(id) => Some(format!("{name}:{id}")),
        None => Some(name.to_string()),
    }
}

/// Handles one reaction add. Unmatched reactions are left untouched; a
/// matched one commits the toggle first and only then clears the user's
/// reaction so the message stays a clean control surface. Cleanup failure
/// never rolls the role change back.
pub(super) async fn handle_reaction(
    api: &DiscordApiClient,
    config: &RoleConfig,
    event: &ReactionEvent,
) -> Result<Option<ToggleOutcome>> {
    let Some(selection) = resolve_reaction_selection(config, event) else {
        return Ok(None);
    };

    let outcome = apply_toggle(
        api,
        config.guild_id,
        event.user_id,
        selection.role_id,
        config.remove_role_when_owned,
    )
    .await?;

    if let Some(value) = event_reaction_value(event) {
        if let Err(error) = api
            .delete_user_reaction(event.channel_id, event.message_id, &value, event.user_id)
            .await
        {
            eprintln!(
                "rolecall could not clear reaction {value} by user {} on message {}: {error}",
                event.user_id, event.message_id
            );
        }
    }

    Ok(Some(outcome))
}

fn acknowledgment_text(outcome: ToggleOutcome, role_id: u64) -> String {
    match outcome {
        ToggleOutcome::Granted => format!("Added <@&{role_id}> to you."),
        ToggleOutcome::Revoked => format!("Removed <@&{role_id}> from you."),
        ToggleOutcome::NoOp => "You already have that role.".to_string(),
    }
}

/// Handles one button press. Malformed custom ids are ignored. The pressing
/// user always gets an ephemeral acknowledgment, including the no-op case;
/// a failed acknowledgment is logged and does not undo the role change.
pub(super) async fn handle_interaction(
    api: &DiscordApiClient,
    config: &RoleConfig,
    event: &InteractionEvent,
) -> Result<Option<ToggleOutcome>> {
    let Some(role_id) = parse_role_custom_id(&event.custom_id) else {
        return Ok(None);
    };

    let outcome = apply_toggle(
        api,
        config.guild_id,
        event.user_id,
        role_id,
        config.remove_role_when_owned,
    )
    .await?;

    let text = acknowledgment_text(outcome, role_id);
    if let Err(error) = api
        .create_interaction_response(&event.interaction_id, &event.token, &text, true)
        .await
    {
        eprintln!(
            "rolecall could not acknowledge interaction {}: {error}",
            event.interaction_id
        );
    }

    Ok(Some(outcome))
}
