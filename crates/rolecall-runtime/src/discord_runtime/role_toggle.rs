//! Role toggle decisions and their application against the guild.

use anyhow::{Context, Result};

use super::discord_api_client::DiscordApiClient;

const GRANT_REASON: &str = "Granted by rolecall";
const REVOKE_REASON: &str = "Removed by rolecall";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Granted,
    Revoked,
    NoOp,
}

impl ToggleOutcome {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            ToggleOutcome::Granted => "granted",
            ToggleOutcome::Revoked => "revoked",
            ToggleOutcome::NoOp => "noop",
        }
    }
}

/// Pure decision table. `owned` is the membership snapshot taken at event
/// time; stale snapshots resolve as if they were current.
pub(super) fn decide_toggle(owned: bool, remove_when_owned: bool) -> ToggleOutcome {
    match (owned, remove_when_owned) {
        (false, _) => ToggleOutcome::Granted,
        (true, true) => ToggleOutcome::Revoked,
        (true, false) => ToggleOutcome::NoOp,
    }
}

/// Snapshots the member's roles, decides, and applies at most one role
/// mutation. A membership fetch failure aborts the toggle with no side
/// effects.
pub(super) async fn apply_toggle(
    api: &DiscordApiClient,
    guild_id: u64,
    user_id: u64,
    role_id: u64,
    remove_when_owned: bool,
) -> Result<ToggleOutcome> {
    let member = api
        .fetch_member(guild_id, user_id)
        .await
        .with_context(|| format!("failed to snapshot member {user_id} in guild {guild_id}"))?;
    let role_value = role_id.to_string();
    let owned = member.roles.iter().any(|role| role == &role_value);

    let outcome = decide_toggle(owned, remove_when_owned);
    match outcome {
        ToggleOutcome::Granted => {
            api.add_member_role(guild_id, user_id, role_id, GRANT_REASON)
                .await
                .with_context(|| format!("failed to grant role {role_id} to user {user_id}"))?;
        }
        ToggleOutcome::Revoked => {
            api.remove_member_role(guild_id, user_id, role_id, REVOKE_REASON)
                .await
                .with_context(|| format!("failed to revoke role {role_id} from user {user_id}"))?;
        }
        ToggleOutcome::NoOp => {}
    }
    Ok(outcome)
}
