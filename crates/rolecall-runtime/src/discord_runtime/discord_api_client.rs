//! Thin typed client for the Discord REST routes the runtime needs.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::discord_helpers::{
    is_retryable_discord_status, is_retryable_transport_error, parse_retry_after,
    percent_encode_path_segment, retry_delay, truncate_for_error,
};

/// Terminal HTTP failure for one operation, kept typed so callers can map
/// specific statuses (404 on a send means the declared channel is gone).
#[derive(Debug, Error)]
#[error("discord api {operation} failed with status {status}: {body}")]
pub(crate) struct DiscordApiStatus {
    pub(crate) operation: String,
    pub(crate) status: u16,
    pub(crate) body: String,
}

pub(crate) fn error_status(error: &anyhow::Error) -> Option<u16> {
    error
        .downcast_ref::<DiscordApiStatus>()
        .map(|status| status.status)
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GatewayBotResponse {
    pub(crate) url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct EmojiIdentity {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageReaction {
    #[serde(default)]
    pub(crate) emoji: EmojiIdentity,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscordMessage {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) reactions: Vec<MessageReaction>,
}

impl DiscordMessage {
    pub(crate) fn id_u64(&self) -> Result<u64> {
        self.id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("discord message id {} is not numeric", self.id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GuildEmoji {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DiscordMember {
    #[serde(default)]
    pub(crate) roles: Vec<String>,
}

/// A file uploaded alongside a message payload.
#[derive(Debug, Clone)]
pub(crate) struct MessageAttachment {
    pub(crate) name: String,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Clone)]
pub(crate) struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub(crate) fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("rolecall (https://github.com, 0.1)"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn auth_value(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    pub(crate) async fn get_gateway_url(&self) -> Result<String> {
        let response: GatewayBotResponse = self
            .request_json("gateway.bot", || {
                self.http
                    .get(format!("{}/gateway/bot", self.api_base))
                    .header(reqwest::header::AUTHORIZATION, self.auth_value())
            })
            .await?;
        let url = response.url.trim().to_string();
        if url.is_empty() {
            return Err(anyhow!("discord gateway.bot returned an empty url"));
        }
        Ok(url)
    }

    /// Fetches one message; a 404 means the message was deleted and maps to
    /// `None` so the caller can fall through to the create path.
    pub(crate) async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Option<DiscordMessage>> {
        self.request_optional_json("message.fetch", || {
            self.http
                .get(format!(
                    "{}/channels/{channel_id}/messages/{message_id}",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
        })
        .await
    }

    pub(crate) async fn create_message(
        &self,
        channel_id: u64,
        payload: &Value,
        attachments: &[MessageAttachment],
    ) -> Result<DiscordMessage> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        self.send_message_payload("message.create", reqwest::Method::POST, url, payload, attachments)
            .await
    }

    pub(crate) async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        payload: &Value,
        attachments: &[MessageAttachment],
    ) -> Result<DiscordMessage> {
        let url = format!(
            "{}/channels/{channel_id}/messages/{message_id}",
            self.api_base
        );
        self.send_message_payload("message.edit", reqwest::Method::PATCH, url, payload, attachments)
            .await
    }

    async fn send_message_payload(
        &self,
        operation: &str,
        method: reqwest::Method,
        url: String,
        payload: &Value,
        attachments: &[MessageAttachment],
    ) -> Result<DiscordMessage> {
        self.request_json(operation, || {
            let request = self
                .http
                .request(method.clone(), &url)
                .header(reqwest::header::AUTHORIZATION, self.auth_value());
            if attachments.is_empty() {
                request.json(payload)
            } else {
                let mut form =
                    reqwest::multipart::Form::new().text("payload_json", payload.to_string());
                for (index, attachment) in attachments.iter().enumerate() {
                    form = form.part(
                        format!("files[{index}]"),
                        reqwest::multipart::Part::bytes(attachment.bytes.clone())
                            .file_name(attachment.name.clone()),
                    );
                }
                request.multipart(form)
            }
        })
        .await
    }

    pub(crate) async fn list_guild_emojis(&self, guild_id: u64) -> Result<Vec<GuildEmoji>> {
        self.request_json("guild.emojis", || {
            self.http
                .get(format!("{}/guilds/{guild_id}/emojis", self.api_base))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
        })
        .await
    }

    pub(crate) async fn fetch_member(&self, guild_id: u64, user_id: u64) -> Result<DiscordMember> {
        self.request_json("guild.member", || {
            self.http
                .get(format!(
                    "{}/guilds/{guild_id}/members/{user_id}",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
        })
        .await
    }

    pub(crate) async fn add_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<()> {
        self.request_unit("role.add", || {
            self.http
                .put(format!(
                    "{}/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
                .header("X-Audit-Log-Reason", reason.to_string())
        })
        .await
    }

    pub(crate) async fn remove_member_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<()> {
        self.request_unit("role.remove", || {
            self.http
                .delete(format!(
                    "{}/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
                .header("X-Audit-Log-Reason", reason.to_string())
        })
        .await
    }

    /// `emoji` is the raw reaction value: `name:id` for custom emoji, the
    /// literal character otherwise. Encoding happens here.
    pub(crate) async fn create_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<()> {
        let encoded = percent_encode_path_segment(emoji);
        self.request_unit("reaction.create", || {
            self.http
                .put(format!(
                    "{}/channels/{channel_id}/messages/{message_id}/reactions/{encoded}/@me",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
        })
        .await
    }

    pub(crate) async fn delete_user_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
        user_id: u64,
    ) -> Result<()> {
        let encoded = percent_encode_path_segment(emoji);
        self.request_unit("reaction.delete", || {
            self.http
                .delete(format!(
                    "{}/channels/{channel_id}/messages/{message_id}/reactions/{encoded}/{user_id}",
                    self.api_base
                ))
                .header(reqwest::header::AUTHORIZATION, self.auth_value())
        })
        .await
    }

    pub(crate) async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        text: &str,
        ephemeral: bool,
    ) -> Result<()> {
        let mut data = serde_json::json!({ "content": text });
        if ephemeral {
            data["flags"] = Value::from(64);
        }
        let payload = serde_json::json!({ "type": 4, "data": data });
        self.request_unit("interaction.respond", || {
            self.http
                .post(format!(
                    "{}/interactions/{interaction_id}/{interaction_token}/callback",
                    self.api_base
                ))
                .json(&payload)
        })
        .await
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        match self.request_with_retry(operation, builder, false).await? {
            Some(response) => response
                .json::<T>()
                .await
                .with_context(|| format!("failed to decode discord {operation} response")),
            None => Err(anyhow!("discord {operation} unexpectedly returned 404")),
        }
    }

    async fn request_optional_json<T, F>(&self, operation: &str, builder: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        match self.request_with_retry(operation, builder, true).await? {
            Some(response) => {
                let parsed = response
                    .json::<T>()
                    .await
                    .with_context(|| format!("failed to decode discord {operation} response"))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn request_unit<F>(&self, operation: &str, builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.request_with_retry(operation, builder, false).await?;
        Ok(())
    }

    /// Shared retry loop: 429/5xx and transport errors are retried with
    /// backoff (honoring Retry-After); other failures become a typed
    /// [`DiscordApiStatus`]. With `map_not_found`, a 404 resolves to `None`.
    async fn request_with_retry<F>(
        &self,
        operation: &str,
        mut builder: F,
        map_not_found: bool,
    ) -> Result<Option<reqwest::Response>>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(
                    "x-rolecall-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(Some(response));
                    }
                    if map_not_found && status.as_u16() == 404 {
                        return Ok(None);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_discord_status(status.as_u16())
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    return Err(anyhow::Error::new(DiscordApiStatus {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    }));
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }
}
