//! Tests for reconciliation, event routing, and role toggle behavior.

use std::collections::BTreeMap;
use std::path::Path;

use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use rolecall_config::ConfigStore;

use super::discord_api_client::DiscordApiClient;
use super::reconcile::{reconcile_all, resolve_message, role_custom_id, sync_message, ReconcileError};
use super::role_toggle::{decide_toggle, ToggleOutcome};
use super::router::{
    handle_interaction, handle_reaction, parse_role_custom_id, resolve_reaction_selection,
    InteractionEvent, ReactionEvent,
};
use super::{parse_gateway_frame, parse_interaction_event, parse_reaction_event};

fn test_api(server: &MockServer) -> DiscordApiClient {
    DiscordApiClient::new(server.base_url(), "test-token".to_string(), 2_000, 3, 1)
        .expect("api client")
}

fn write_config(dir: &Path, body: &str) -> ConfigStore {
    let path = dir.join("rolecall.toml");
    std::fs::write(&path, body).expect("write config");
    ConfigStore::new(path)
}

const SINGLE_MESSAGE_CONFIG: &str = r#"
guild_id = 1
remove_role_when_owned = true

[messages.colors]
title = "Pick a color"
channel_id = 10

[messages.colors.entries.red]
title = "Red"
role_id = 42
emoji = "🔴"
"#;

const PUBLISHED_MESSAGE_CONFIG: &str = r#"
guild_id = 1
remove_role_when_owned = true

[messages.colors]
title = "Pick a color"
channel_id = 10
message_id = 555

[messages.colors.entries.red]
title = "Red"
role_id = 42
emoji = "🔴"
"#;

fn mock_empty_guild_emojis(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/guilds/1/emojis");
        then.status(200).json_body(json!([]));
    })
}

#[test]
fn unit_role_custom_id_round_trips_through_parser() {
    assert_eq!(parse_role_custom_id(&role_custom_id(42)), Some(42));
    assert_eq!(
        parse_role_custom_id("rolecall:role:123456789012345678"),
        Some(123_456_789_012_345_678)
    );

    assert_eq!(parse_role_custom_id("rolecall:role:"), None);
    assert_eq!(parse_role_custom_id("rolecall:role:0"), None);
    assert_eq!(parse_role_custom_id("rolecall:role:12a"), None);
    assert_eq!(parse_role_custom_id("rolecall:role:-3"), None);
    assert_eq!(parse_role_custom_id("other:role:5"), None);
    assert_eq!(parse_role_custom_id("rolecall:role:99999999999999999999999"), None);
}

#[test]
fn unit_decide_toggle_covers_ownership_and_policy() {
    assert_eq!(decide_toggle(false, true), ToggleOutcome::Granted);
    assert_eq!(decide_toggle(false, false), ToggleOutcome::Granted);
    assert_eq!(decide_toggle(true, true), ToggleOutcome::Revoked);
    assert_eq!(decide_toggle(true, false), ToggleOutcome::NoOp);
}

#[test]
fn unit_resolve_reaction_selection_matches_custom_and_unicode() {
    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.colors]
title = "Pick a color"
channel_id = 10
message_id = 555

[messages.colors.entries.blue]
title = "Blue"
role_id = 77
emoji = 777

[messages.colors.entries.red]
title = "Red"
role_id = 42
emoji = "🔴"

[messages.unpublished]
title = "Not yet live"
channel_id = 11

[messages.unpublished.entries.red]
title = "Red"
role_id = 99
emoji = "🔴"
"#,
    );
    let config = store.load().expect("load config");

    let custom = ReactionEvent {
        channel_id: 10,
        message_id: 555,
        user_id: 5,
        emoji_id: Some(777),
        emoji_name: Some("blue".to_string()),
    };
    let selection = resolve_reaction_selection(&config, &custom).expect("custom match");
    assert_eq!(selection.message_key, "colors");
    assert_eq!(selection.entry_key, "blue");
    assert_eq!(selection.role_id, 77);

    let unicode = ReactionEvent {
        emoji_id: None,
        emoji_name: Some("🔴".to_string()),
        ..custom.clone()
    };
    let selection = resolve_reaction_selection(&config, &unicode).expect("unicode match");
    assert_eq!(selection.role_id, 42);

    // A custom emoji whose name collides with a unicode literal must not match.
    let collision = ReactionEvent {
        emoji_id: Some(123),
        emoji_name: Some("🔴".to_string()),
        ..custom.clone()
    };
    assert!(resolve_reaction_selection(&config, &collision).is_none());

    // Unknown message ids and unpublished blocks resolve to nothing, even
    // with a matching emoji. message_id zero in particular must never match.
    let unknown = ReactionEvent {
        message_id: 999,
        ..unicode.clone()
    };
    assert!(resolve_reaction_selection(&config, &unknown).is_none());
    let zero = ReactionEvent {
        message_id: 0,
        ..unicode
    };
    assert!(resolve_reaction_selection(&config, &zero).is_none());
}

#[test]
fn unit_resolve_message_builds_embed_buttons_and_reaction_plan() {
    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.colors]
title = "Pick a color"
channel_id = 10
color = "FF0000"
description = "One role per color."

[messages.colors.entries.blue]
title = "Blue"
description = "The calm one"
role_id = 77
emoji = 777

[messages.colors.entries.red]
title = "Red"
role_id = 42
emoji = "🔴"
"#,
    );
    let config = store.load().expect("load config");
    let message = &config.messages["colors"];
    let mut emoji_names = BTreeMap::new();
    emoji_names.insert(777_u64, "blue".to_string());

    let resolved =
        resolve_message("colors", message, &emoji_names, dir.path()).expect("resolve");

    let embed = &resolved.payload["embeds"][0];
    assert_eq!(embed["title"], "Pick a color");
    assert_eq!(embed["color"], 0x00FF_0000);
    assert_eq!(embed["fields"].as_array().map(Vec::len), Some(2));

    let row = &resolved.payload["components"][0]["components"];
    assert_eq!(row.as_array().map(Vec::len), Some(2));
    assert_eq!(row[0]["custom_id"], "rolecall:role:77");
    assert_eq!(row[0]["emoji"]["id"], "777");
    assert_eq!(row[1]["custom_id"], "rolecall:role:42");
    assert_eq!(row[1]["emoji"]["name"], "🔴");

    assert_eq!(resolved.reactions, vec!["blue:777".to_string(), "🔴".to_string()]);
    assert!(resolved.attachments.is_empty());
}

#[test]
fn unit_resolve_message_bundles_local_assets_as_attachments() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("logo.png"), b"png-bytes").expect("write asset");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.colors]
title = "Pick a color"
channel_id = 10
thumbnail = "logo.png"

[messages.colors.author]
name = "Role bot"
icon = "https://example.com/icon.png"
"#,
    );
    let config = store.load().expect("load config");
    let message = &config.messages["colors"];

    let resolved =
        resolve_message("colors", message, &BTreeMap::new(), dir.path()).expect("resolve");

    let embed = &resolved.payload["embeds"][0];
    assert_eq!(embed["thumbnail"]["url"], "attachment://logo.png");
    assert_eq!(embed["author"]["icon_url"], "https://example.com/icon.png");
    assert_eq!(resolved.attachments.len(), 1);
    assert_eq!(resolved.attachments[0].name, "logo.png");
    assert_eq!(
        resolved.payload["attachments"][0]["filename"],
        "logo.png"
    );
}

#[test]
fn regression_resolve_message_degrades_unknown_custom_emoji_to_button_only() {
    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.colors]
title = "Pick a color"
channel_id = 10

[messages.colors.entries.blue]
title = "Blue"
role_id = 77
emoji = 777
"#,
    );
    let config = store.load().expect("load config");
    let message = &config.messages["colors"];

    let resolved =
        resolve_message("colors", message, &BTreeMap::new(), dir.path()).expect("resolve");

    let button = &resolved.payload["components"][0]["components"][0];
    assert_eq!(button["custom_id"], "rolecall:role:77");
    assert!(button.get("emoji").is_none());
    assert!(resolved.reactions.is_empty());
}

#[test]
fn regression_resolve_message_rejects_invalid_color() {
    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.colors]
title = "Pick a color"
channel_id = 10
color = "red"
"#,
    );
    let config = store.load().expect("load config");
    let message = &config.messages["colors"];

    let error = resolve_message("colors", message, &BTreeMap::new(), dir.path())
        .expect_err("invalid color must fail");
    assert!(matches!(error, ReconcileError::Config(_)));
    assert!(error.to_string().contains("hex"));
}

#[test]
fn regression_resolve_message_caps_buttons_at_component_limit() {
    let dir = tempdir().expect("tempdir");
    let mut body =
        String::from("guild_id = 1\n\n[messages.big]\ntitle = \"Big\"\nchannel_id = 10\n");
    for index in 0..26 {
        body.push_str(&format!(
            "\n[messages.big.entries.e{index:02}]\ntitle = \"Entry {index:02}\"\nrole_id = {}\n",
            index + 1
        ));
    }
    let store = write_config(dir.path(), &body);
    let config = store.load().expect("load config");
    let message = &config.messages["big"];

    let resolved =
        resolve_message("big", message, &BTreeMap::new(), dir.path()).expect("resolve");

    let rows = resolved.payload["components"].as_array().expect("rows");
    assert_eq!(rows.len(), 5);
    let total: usize = rows
        .iter()
        .map(|row| row["components"].as_array().map_or(0, Vec::len))
        .sum();
    assert_eq!(total, 25);
    // Entries past the button cap still render as embed fields.
    assert_eq!(
        resolved.payload["embeds"][0]["fields"]
            .as_array()
            .map(Vec::len),
        Some(26)
    );
    let last = &rows[4]["components"][4];
    assert_eq!(last["custom_id"], "rolecall:role:25");
}

#[test]
fn unit_parse_gateway_frame_handles_text_binary_and_ping() {
    let text = WsMessage::text(json!({ "op": 10, "d": { "heartbeat_interval": 1000 } }).to_string());
    let frame = parse_gateway_frame(&text).expect("parse").expect("frame");
    assert_eq!(frame.op, 10);
    assert_eq!(frame.d["heartbeat_interval"], 1000);

    let binary = WsMessage::binary(
        json!({ "op": 0, "t": "READY", "s": 3, "d": {} })
            .to_string()
            .into_bytes(),
    );
    let frame = parse_gateway_frame(&binary).expect("parse").expect("frame");
    assert_eq!(frame.op, 0);
    assert_eq!(frame.t.as_deref(), Some("READY"));
    assert_eq!(frame.s, Some(3));

    let ping = WsMessage::Ping(Vec::new().into());
    assert!(parse_gateway_frame(&ping).expect("parse").is_none());
}

#[test]
fn unit_parse_dispatch_events_require_numeric_ids() {
    let reaction = parse_reaction_event(&json!({
        "channel_id": "10",
        "message_id": "555",
        "user_id": "5",
        "guild_id": "1",
        "emoji": { "id": "777", "name": "blue" }
    }))
    .expect("reaction event");
    assert_eq!(reaction.channel_id, 10);
    assert_eq!(reaction.message_id, 555);
    assert_eq!(reaction.emoji_id, Some(777));
    assert_eq!(reaction.emoji_name.as_deref(), Some("blue"));

    assert!(parse_reaction_event(&json!({
        "channel_id": "10",
        "message_id": "555",
        "user_id": "not-a-snowflake",
        "emoji": { "name": "🔴" }
    }))
    .is_none());

    let interaction = parse_interaction_event(&json!({
        "id": "i-1",
        "token": "tok",
        "guild_id": "1",
        "member": { "user": { "id": "5" } },
        "data": { "custom_id": "rolecall:role:42" }
    }))
    .expect("interaction event");
    assert_eq!(interaction.user_id, 5);
    assert_eq!(interaction.custom_id, "rolecall:role:42");

    assert!(parse_interaction_event(&json!({
        "id": "i-1",
        "token": "tok",
        "member": { "user": { "id": "5" } },
        "data": {}
    }))
    .is_none());
}

#[tokio::test]
async fn integration_reconcile_publishes_and_persists_new_message_id() {
    let server = MockServer::start();
    let emojis = mock_empty_guild_emojis(&server);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/channels/10/messages")
            .body_includes("Pick a color");
        then.status(200).json_body(json!({ "id": "900" }));
    });
    let react = server.mock(|when, then| {
        when.method(PUT)
            .path_includes("/channels/10/messages/900/reactions/");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), SINGLE_MESSAGE_CONFIG);
    let mut config = store.load().expect("load config");
    let api = test_api(&server);

    let report = reconcile_all(&api, &store, &mut config, dir.path()).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.edited, 0);
    assert_eq!(report.reactions_added, 1);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(config.messages["colors"].message_id, 900);

    let reloaded = store.load().expect("reload config");
    assert_eq!(reloaded.messages["colors"].message_id, 900);

    assert_eq!(emojis.calls(), 1);
    assert_eq!(create.calls(), 1);
    assert_eq!(react.calls(), 1);
}

#[tokio::test]
async fn integration_second_reconcile_pass_edits_without_creating() {
    let server = MockServer::start();
    mock_empty_guild_emojis(&server);
    let create = server.mock(|when, then| {
        when.method(POST).path("/channels/10/messages");
        then.status(200).json_body(json!({ "id": "900" }));
    });
    let fetch = server.mock(|when, then| {
        when.method(GET).path("/channels/10/messages/900");
        then.status(200).json_body(json!({
            "id": "900",
            "reactions": [{ "emoji": { "id": null, "name": "🔴" } }]
        }));
    });
    let edit = server.mock(|when, then| {
        when.method(PATCH).path("/channels/10/messages/900");
        then.status(200).json_body(json!({
            "id": "900",
            "reactions": [{ "emoji": { "id": null, "name": "🔴" } }]
        }));
    });
    server.mock(|when, then| {
        when.method(PUT).path_includes("/reactions/");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), SINGLE_MESSAGE_CONFIG);
    let mut config = store.load().expect("load config");
    let api = test_api(&server);

    let first = reconcile_all(&api, &store, &mut config, dir.path()).await;
    assert_eq!(first.created, 1);
    assert_eq!(first.persisted, 1);
    assert_eq!(config.messages["colors"].message_id, 900);

    let second = reconcile_all(&api, &store, &mut config, dir.path()).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.edited, 1);
    assert_eq!(second.reactions_added, 0);
    assert_eq!(second.persisted, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(config.messages["colors"].message_id, 900);

    assert_eq!(create.calls(), 1);
    assert_eq!(fetch.calls(), 1);
    assert_eq!(edit.calls(), 1);
}

#[tokio::test]
async fn integration_reconcile_edits_published_message_without_creating() {
    let server = MockServer::start();
    mock_empty_guild_emojis(&server);
    let fetch = server.mock(|when, then| {
        when.method(GET).path("/channels/10/messages/555");
        then.status(200).json_body(json!({ "id": "555" }));
    });
    let edit = server.mock(|when, then| {
        when.method(PATCH)
            .path("/channels/10/messages/555")
            .body_includes("Pick a color");
        then.status(200).json_body(json!({
            "id": "555",
            "reactions": [{ "emoji": { "id": null, "name": "🔴" } }]
        }));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/channels/10/messages");
        then.status(200).json_body(json!({ "id": "999" }));
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let mut config = store.load().expect("load config");
    let api = test_api(&server);

    let report = reconcile_all(&api, &store, &mut config, dir.path()).await;

    assert_eq!(report.created, 0);
    assert_eq!(report.edited, 1);
    // The seeded reaction already sits on the message, nothing to add.
    assert_eq!(report.reactions_added, 0);
    assert_eq!(report.persisted, 0);
    assert_eq!(config.messages["colors"].message_id, 555);

    assert_eq!(fetch.calls(), 1);
    assert_eq!(edit.calls(), 1);
    assert_eq!(create.calls(), 0);
}

#[tokio::test]
async fn regression_reconcile_recovers_when_published_message_was_deleted() {
    let server = MockServer::start();
    mock_empty_guild_emojis(&server);
    let fetch = server.mock(|when, then| {
        when.method(GET).path("/channels/10/messages/555");
        then.status(404).json_body(json!({ "message": "Unknown Message" }));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/channels/10/messages");
        then.status(200).json_body(json!({ "id": "901" }));
    });
    server.mock(|when, then| {
        when.method(PUT).path_includes("/reactions/");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let mut config = store.load().expect("load config");
    let api = test_api(&server);

    let report = reconcile_all(&api, &store, &mut config, dir.path()).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.edited, 0);
    assert_eq!(report.persisted, 1);
    assert_eq!(config.messages["colors"].message_id, 901);
    let reloaded = store.load().expect("reload config");
    assert_eq!(reloaded.messages["colors"].message_id, 901);

    assert_eq!(fetch.calls(), 1);
    assert_eq!(create.calls(), 1);
}

#[tokio::test]
async fn regression_reconcile_isolates_failing_message_blocks() {
    let server = MockServer::start();
    mock_empty_guild_emojis(&server);
    let create_first = server.mock(|when, then| {
        when.method(POST).path("/channels/10/messages");
        then.status(200).json_body(json!({ "id": "910" }));
    });
    let create_third = server.mock(|when, then| {
        when.method(POST).path("/channels/30/messages");
        then.status(200).json_body(json!({ "id": "930" }));
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1

[messages.alpha]
title = "Alpha"
channel_id = 10

[messages.broken]
title = "Broken"
channel_id = 20
color = "not-hex"

[messages.gamma]
title = "Gamma"
channel_id = 30
"#,
    );
    let mut config = store.load().expect("load config");
    let api = test_api(&server);

    let report = reconcile_all(&api, &store, &mut config, dir.path()).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_keys, vec!["broken".to_string()]);
    assert_eq!(config.messages["alpha"].message_id, 910);
    assert_eq!(config.messages["broken"].message_id, 0);
    assert_eq!(config.messages["gamma"].message_id, 930);

    assert_eq!(create_first.calls(), 1);
    assert_eq!(create_third.calls(), 1);
}

#[tokio::test]
async fn regression_create_in_missing_channel_maps_to_channel_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/channels/10/messages");
        then.status(404).json_body(json!({ "message": "Unknown Channel" }));
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), SINGLE_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let error = sync_message(
        &api,
        dir.path(),
        "colors",
        &config.messages["colors"],
        &BTreeMap::new(),
    )
    .await
    .expect_err("missing channel must fail");

    assert!(matches!(
        error,
        ReconcileError::ChannelNotFound { channel_id: 10, .. }
    ));
    assert!(error.to_string().contains("channel_id"));
}

#[tokio::test]
async fn integration_matched_reaction_toggles_role_and_clears_reaction() {
    let server = MockServer::start();
    let member = server.mock(|when, then| {
        when.method(GET).path("/guilds/1/members/5");
        then.status(200).json_body(json!({ "roles": [] }));
    });
    let grant = server.mock(|when, then| {
        when.method(PUT)
            .path("/guilds/1/members/5/roles/42")
            .header("X-Audit-Log-Reason", "Granted by rolecall");
        then.status(204);
    });
    let clear = server.mock(|when, then| {
        when.method(DELETE)
            .path_includes("/channels/10/messages/555/reactions/");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = ReactionEvent {
        channel_id: 10,
        message_id: 555,
        user_id: 5,
        emoji_id: None,
        emoji_name: Some("🔴".to_string()),
    };
    let outcome = handle_reaction(&api, &config, &event)
        .await
        .expect("handle reaction");

    assert_eq!(outcome, Some(ToggleOutcome::Granted));
    assert_eq!(member.calls(), 1);
    assert_eq!(grant.calls(), 1);
    assert_eq!(clear.calls(), 1);
}

#[tokio::test]
async fn regression_unmatched_reaction_stays_untouched() {
    let server = MockServer::start();
    let member = server.mock(|when, then| {
        when.method(GET).path_includes("/members/");
        then.status(200).json_body(json!({ "roles": [] }));
    });
    let clear = server.mock(|when, then| {
        when.method(DELETE).path_includes("/reactions/");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = ReactionEvent {
        channel_id: 10,
        message_id: 555,
        user_id: 5,
        emoji_id: None,
        emoji_name: Some("🟢".to_string()),
    };
    let outcome = handle_reaction(&api, &config, &event)
        .await
        .expect("handle reaction");

    assert_eq!(outcome, None);
    assert_eq!(member.calls(), 0);
    assert_eq!(clear.calls(), 0);
}

#[tokio::test]
async fn integration_button_press_grants_role_and_acknowledges_ephemerally() {
    let server = MockServer::start();
    let member = server.mock(|when, then| {
        when.method(GET).path("/guilds/1/members/5");
        then.status(200).json_body(json!({ "roles": ["100"] }));
    });
    let grant = server.mock(|when, then| {
        when.method(PUT).path("/guilds/1/members/5/roles/42");
        then.status(204);
    });
    let ack = server.mock(|when, then| {
        when.method(POST)
            .path("/interactions/i-1/tok/callback")
            .body_includes("\"flags\":64");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = InteractionEvent {
        interaction_id: "i-1".to_string(),
        token: "tok".to_string(),
        user_id: 5,
        custom_id: "rolecall:role:42".to_string(),
    };
    let outcome = handle_interaction(&api, &config, &event)
        .await
        .expect("handle interaction");

    assert_eq!(outcome, Some(ToggleOutcome::Granted));
    assert_eq!(member.calls(), 1);
    assert_eq!(grant.calls(), 1);
    assert_eq!(ack.calls(), 1);
}

#[tokio::test]
async fn integration_button_press_with_owned_role_follows_removal_policy() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/guilds/1/members/5");
        then.status(200).json_body(json!({ "roles": ["42"] }));
    });
    let revoke = server.mock(|when, then| {
        when.method(DELETE)
            .path("/guilds/1/members/5/roles/42")
            .header("X-Audit-Log-Reason", "Removed by rolecall");
        then.status(204);
    });
    let ack = server.mock(|when, then| {
        when.method(POST).path("/interactions/i-1/tok/callback");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = InteractionEvent {
        interaction_id: "i-1".to_string(),
        token: "tok".to_string(),
        user_id: 5,
        custom_id: "rolecall:role:42".to_string(),
    };
    let outcome = handle_interaction(&api, &config, &event)
        .await
        .expect("handle interaction");

    assert_eq!(outcome, Some(ToggleOutcome::Revoked));
    assert_eq!(revoke.calls(), 1);
    assert_eq!(ack.calls(), 1);
}

#[tokio::test]
async fn regression_button_press_noops_when_removal_is_disabled() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/guilds/1/members/5");
        then.status(200).json_body(json!({ "roles": ["42"] }));
    });
    let grant = server.mock(|when, then| {
        when.method(PUT).path_includes("/roles/");
        then.status(204);
    });
    let revoke = server.mock(|when, then| {
        when.method(DELETE).path_includes("/roles/");
        then.status(204);
    });
    let ack = server.mock(|when, then| {
        when.method(POST)
            .path("/interactions/i-1/tok/callback")
            .body_includes("already have");
        then.status(204);
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(
        dir.path(),
        r#"
guild_id = 1
remove_role_when_owned = false

[messages.colors]
title = "Pick a color"
channel_id = 10
message_id = 555

[messages.colors.entries.red]
title = "Red"
role_id = 42
emoji = "🔴"
"#,
    );
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = InteractionEvent {
        interaction_id: "i-1".to_string(),
        token: "tok".to_string(),
        user_id: 5,
        custom_id: "rolecall:role:42".to_string(),
    };
    let outcome = handle_interaction(&api, &config, &event)
        .await
        .expect("handle interaction");

    assert_eq!(outcome, Some(ToggleOutcome::NoOp));
    assert_eq!(grant.calls(), 0);
    assert_eq!(revoke.calls(), 0);
    assert_eq!(ack.calls(), 1);
}

#[tokio::test]
async fn regression_malformed_custom_id_is_ignored() {
    let server = MockServer::start();
    let member = server.mock(|when, then| {
        when.method(GET).path_includes("/members/");
        then.status(200).json_body(json!({ "roles": [] }));
    });

    let dir = tempdir().expect("tempdir");
    let store = write_config(dir.path(), PUBLISHED_MESSAGE_CONFIG);
    let config = store.load().expect("load config");
    let api = test_api(&server);

    let event = InteractionEvent {
        interaction_id: "i-1".to_string(),
        token: "tok".to_string(),
        user_id: 5,
        custom_id: "rolecall:role:42; DROP TABLE".to_string(),
    };
    let outcome = handle_interaction(&api, &config, &event)
        .await
        .expect("handle interaction");

    assert_eq!(outcome, None);
    assert_eq!(member.calls(), 0);
}

#[tokio::test]
async fn integration_api_client_retries_rate_limits() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/guilds/1/members/5")
            .header("x-rolecall-retry-attempt", "0");
        then.status(429)
            .header("retry-after", "0")
            .body("rate limit");
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/guilds/1/members/5")
            .header("x-rolecall-retry-attempt", "1");
        then.status(200).json_body(json!({ "roles": ["42"] }));
    });

    let api = test_api(&server);
    let member = api
        .fetch_member(1, 5)
        .await
        .expect("fetch eventually succeeds");

    assert_eq!(member.roles, vec!["42".to_string()]);
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
}
