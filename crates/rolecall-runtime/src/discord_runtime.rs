//! Long-running Discord runtime: connects to the gateway, reconciles the
//! declared message blocks once the session is ready, then routes reaction
//! and button events onto role toggles until shutdown.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use rolecall_config::{ConfigStore, RoleConfig};

mod discord_api_client;
mod reconcile;
mod role_toggle;
mod router;
#[cfg(test)]
mod tests;

use discord_api_client::{DiscordApiClient, EmojiIdentity};
use reconcile::reconcile_all;
pub use reconcile::ReconcileReport;
use router::{handle_interaction, handle_reaction, InteractionEvent, ReactionEvent};

// GUILDS plus GUILD_MESSAGE_REACTIONS.
const GATEWAY_INTENTS: u64 = 1 | (1 << 10);
const GATEWAY_QUERY: &str = "/?v=10&encoding=json";
const FALLBACK_HEARTBEAT_MS: u64 = 41_250;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Debug, Clone)]
pub struct DiscordRuntimeConfig {
    pub config_path: PathBuf,
    pub assets_dir: PathBuf,
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct GatewayFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

fn parse_gateway_frame(message: &WsMessage) -> Result<Option<GatewayFrame>> {
    let text = match message {
        WsMessage::Text(text) => text.as_str().to_string(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .context("discord gateway sent non-utf8 binary frame")?,
        _ => return Ok(None),
    };
    let frame = serde_json::from_str::<GatewayFrame>(&text)
        .with_context(|| format!("failed to parse discord gateway frame: {text}"))?;
    Ok(Some(frame))
}

fn parse_snowflake(value: &Value, field: &str) -> Option<u64> {
    let raw = value.get(field)?.as_str()?;
    raw.trim().parse::<u64>().ok()
}

fn parse_reaction_event(data: &Value) -> Option<ReactionEvent> {
    let emoji = data.get("emoji")?;
    let identity = serde_json::from_value::<EmojiIdentity>(emoji.clone()).ok()?;
    Some(ReactionEvent {
        channel_id: parse_snowflake(data, "channel_id")?,
        message_id: parse_snowflake(data, "message_id")?,
        user_id: parse_snowflake(data, "user_id")?,
        emoji_id: identity.id.and_then(|id| id.trim().parse::<u64>().ok()),
        emoji_name: identity.name,
    })
}

fn parse_interaction_event(data: &Value) -> Option<InteractionEvent> {
    let custom_id = data
        .get("data")?
        .get("custom_id")?
        .as_str()?
        .to_string();
    let user_id = parse_snowflake(data.get("member")?.get("user")?, "id")?;
    Some(InteractionEvent {
        interaction_id: data.get("id")?.as_str()?.to_string(),
        token: data.get("token")?.as_str()?.to_string(),
        user_id,
        custom_id,
    })
}

fn event_guild_id(data: &Value) -> Option<u64> {
    parse_snowflake(data, "guild_id")
}

pub struct DiscordRuntime {
    config: DiscordRuntimeConfig,
    api: DiscordApiClient,
    store: ConfigStore,
    model: RoleConfig,
    bot_user_id: Option<u64>,
}

impl DiscordRuntime {
    /// Loads and validates the declared config up front. A broken config is
    /// a fatal startup error, never a degraded run.
    pub fn new(config: DiscordRuntimeConfig) -> Result<Self> {
        let store = ConfigStore::new(&config.config_path);
        let model = store.load().with_context(|| {
            format!(
                "failed to load role config from {}",
                config.config_path.display()
            )
        })?;
        let api = DiscordApiClient::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;
        Ok(Self {
            config,
            api,
            store,
            model,
            bot_user_id: None,
        })
    }

    /// Outer session loop: each gateway disconnect is logged and followed by
    /// a delayed reconnect. Only Ctrl-C ends the run.
    pub async fn run(&mut self) -> Result<()> {
        println!(
            "rolecall runtime starting guild={} messages={} config={}",
            self.model.guild_id,
            self.model.messages.len(),
            self.store.path().display()
        );
        let mut failure_streak: u32 = 0;
        loop {
            let session = async {
                let gateway_url = self
                    .api
                    .get_gateway_url()
                    .await
                    .context("failed to resolve discord gateway url")?;
                self.run_gateway_session(&gateway_url).await
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("rolecall runtime stopping on interrupt");
                    return Ok(());
                }
                result = session => match result {
                    Ok(()) => {
                        println!("rolecall runtime session closed; shutting down");
                        return Ok(());
                    }
                    Err(error) => {
                        failure_streak += 1;
                        eprintln!(
                            "rolecall gateway session failed (streak={failure_streak}): {error:?}"
                        );
                    }
                },
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("rolecall runtime stopping on interrupt");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One websocket session: hello, identify, then heartbeats interleaved
    /// with dispatch events. Returns `Err` when the transport drops so the
    /// outer loop reconnects.
    async fn run_gateway_session(&mut self, gateway_url: &str) -> Result<()> {
        let url = format!("{}{GATEWAY_QUERY}", gateway_url.trim_end_matches('/'));
        let (stream, _response) = connect_async(&url)
            .await
            .with_context(|| format!("failed to connect to discord gateway at {url}"))?;
        let (mut sink, mut source) = stream.split();

        let hello = loop {
            let message = source
                .next()
                .await
                .ok_or_else(|| anyhow!("discord gateway closed before hello"))?
                .context("failed reading discord gateway hello")?;
            if let Some(frame) = parse_gateway_frame(&message)? {
                if frame.op == OP_HELLO {
                    break frame;
                }
            }
        };
        let heartbeat_interval = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or(FALLBACK_HEARTBEAT_MS);

        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.config.bot_token,
                "intents": GATEWAY_INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "rolecall",
                    "device": "rolecall",
                },
            },
        });
        sink.send(WsMessage::text(identify.to_string()))
            .await
            .context("failed to send discord identify")?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_interval));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = json!({ "op": OP_HEARTBEAT, "d": last_sequence });
                    sink.send(WsMessage::text(beat.to_string()))
                        .await
                        .context("failed to send discord heartbeat")?;
                }
                incoming = source.next() => {
                    let message = incoming
                        .ok_or_else(|| anyhow!("discord gateway stream closed"))?
                        .context("failed reading discord gateway message")?;
                    let Some(frame) = parse_gateway_frame(&message)? else {
                        continue;
                    };
                    if let Some(sequence) = frame.s {
                        last_sequence = Some(sequence);
                    }
                    match frame.op {
                        OP_DISPATCH => {
                            let event_type = frame.t.unwrap_or_default();
                            self.handle_dispatch(&event_type, frame.d).await;
                        }
                        OP_HEARTBEAT => {
                            let beat = json!({ "op": OP_HEARTBEAT, "d": last_sequence });
                            sink.send(WsMessage::text(beat.to_string()))
                                .await
                                .context("failed to send requested heartbeat")?;
                        }
                        OP_RECONNECT | OP_INVALID_SESSION => {
                            return Err(anyhow!("discord gateway requested a fresh session"));
                        }
                        OP_HEARTBEAT_ACK => {}
                        other => {
                            println!("rolecall ignoring gateway opcode {other}");
                        }
                    }
                }
            }
        }
    }

    /// Dispatch boundary. Every event is handled independently; a failing
    /// handler is logged here and never tears the session down.
    async fn handle_dispatch(&mut self, event_type: &str, data: Value) {
        match event_type {
            "READY" => {
                self.bot_user_id = data
                    .get("user")
                    .and_then(|user| parse_snowflake(user, "id"));
                println!(
                    "rolecall gateway ready bot_user={:?}; reconciling {} message blocks",
                    self.bot_user_id,
                    self.model.messages.len()
                );
                let report = self.reconcile_pass().await;
                println!(
                    "rolecall reconcile pass created={} edited={} reactions_added={} \
                     persisted={} failed={}",
                    report.created,
                    report.edited,
                    report.reactions_added,
                    report.persisted,
                    report.failed
                );
                for key in &report.failed_keys {
                    eprintln!("rolecall reconcile left message block \"{key}\" unpublished");
                }
            }
            "MESSAGE_REACTION_ADD" => {
                let Some(event) = parse_reaction_event(&data) else {
                    return;
                };
                if event_guild_id(&data).is_some_and(|guild| guild != self.model.guild_id) {
                    return;
                }
                if self.bot_user_id == Some(event.user_id) {
                    return;
                }
                match handle_reaction(&self.api, &self.model, &event).await {
                    Ok(Some(outcome)) => println!(
                        "rolecall reaction toggle message={} user={} outcome={}",
                        event.message_id,
                        event.user_id,
                        outcome.as_str()
                    ),
                    Ok(None) => {}
                    Err(error) => eprintln!(
                        "rolecall reaction event failed message={} user={}: {error:?}",
                        event.message_id, event.user_id
                    ),
                }
            }
            "INTERACTION_CREATE" => {
                let Some(event) = parse_interaction_event(&data) else {
                    return;
                };
                if event_guild_id(&data).is_some_and(|guild| guild != self.model.guild_id) {
                    return;
                }
                match handle_interaction(&self.api, &self.model, &event).await {
                    Ok(Some(outcome)) => println!(
                        "rolecall button toggle user={} custom_id={} outcome={}",
                        event.user_id,
                        event.custom_id,
                        outcome.as_str()
                    ),
                    Ok(None) => {}
                    Err(error) => eprintln!(
                        "rolecall interaction event failed user={}: {error:?}",
                        event.user_id
                    ),
                }
            }
            _ => {}
        }
    }

    async fn reconcile_pass(&mut self) -> ReconcileReport {
        reconcile_all(
            &self.api,
            &self.store,
            &mut self.model,
            &self.config.assets_dir,
        )
        .await
    }
}

pub async fn run_discord_runtime(config: DiscordRuntimeConfig) -> Result<()> {
    let mut runtime = DiscordRuntime::new(config)?;
    runtime.run().await
}
