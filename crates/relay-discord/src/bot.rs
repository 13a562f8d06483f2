//! One Discord bot account: message sending plus REST passthroughs.

use std::sync::{Arc, OnceLock};

use relay_channels::SendReceipt;
use relay_core::config::DiscordConfig;
use relay_core::stats::{BotCounters, StatsRegistry};
use relay_core::{AssetMode, CanonicalMessage, EventKind, InboundEvent, Segment};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

use crate::api::{
    Channel, Guild, GuildMember, Message, ModifyChannel, ModifyGuild, ModifyGuildMember, Role,
    RoleBody, User, Webhook, WebhookBody,
};
use crate::error::DiscordError;
use crate::http::DiscordHttp;
use crate::normalize::{self, PLATFORM};
use crate::paginate;
use crate::transcode::{render_inline, Destination, Transcoder};

pub struct DiscordBot {
    http: DiscordHttp,
    asset_mode: AssetMode,
    stats: Arc<StatsRegistry>,
    counters: OnceLock<Arc<BotCounters>>,
}

impl DiscordBot {
    pub fn new(config: &DiscordConfig, stats: Arc<StatsRegistry>) -> Result<Self, DiscordError> {
        Ok(Self {
            http: DiscordHttp::new(config)?,
            asset_mode: config.handle_external_assets,
            stats,
            counters: OnceLock::new(),
        })
    }

    pub fn http(&self) -> &DiscordHttp {
        &self.http
    }

    /// Empty until [`get_self`](Self::get_self) has succeeded.
    pub fn self_id(&self) -> &str {
        self.http.self_id().unwrap_or_default()
    }

    /// Counters exist once the bot knows its own id.
    pub fn counters(&self) -> Option<&Arc<BotCounters>> {
        self.counters.get()
    }

    /// Fetch the bot's own account and register its counters under that id.
    pub async fn get_self(&self) -> Result<User, DiscordError> {
        let user: User = self.http.get("/users/@me").await?;
        self.http.set_self_id(user.id.clone());
        let _ = self
            .counters
            .set(self.stats.register(PLATFORM, &user.id));
        info!(bot_id = %user.id, username = %user.username, "discord bot identified");
        Ok(user)
    }

    fn transcoder(&self) -> Transcoder<'_> {
        Transcoder {
            transport: &self.http,
            fetcher: &self.http,
            asset_mode: self.asset_mode,
        }
    }

    async fn deliver(
        &self,
        destination: &Destination,
        message: &CanonicalMessage,
    ) -> Result<SendReceipt, DiscordError> {
        let receipt = self.transcoder().send(destination, message).await?;
        if let Some(counters) = self.counters() {
            counters.sent.add(receipt.len() as u64);
        }
        Ok(receipt)
    }

    pub async fn send_message(
        &self,
        channel_id: &str,
        message: &CanonicalMessage,
    ) -> Result<SendReceipt, DiscordError> {
        self.deliver(&Destination::channel(channel_id), message).await
    }

    /// Post through a webhook. With `wait == false` Discord returns no
    /// message, so the receipt stays empty.
    pub async fn execute_webhook(
        &self,
        webhook_id: &str,
        token: &str,
        message: &CanonicalMessage,
        wait: bool,
    ) -> Result<SendReceipt, DiscordError> {
        let destination = Destination::Webhook {
            id: webhook_id.to_string(),
            token: token.to_string(),
            wait,
        };
        self.deliver(&destination, message).await
    }

    /// Replace a message's text. Images cannot be added by an edit.
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &CanonicalMessage,
    ) -> Result<Message, DiscordError> {
        let body = json!({ "content": edit_content(message)? });
        self.http
            .request(
                Method::PATCH,
                &format!("/channels/{channel_id}/messages/{message_id}"),
                Some(&body),
            )
            .await
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), DiscordError> {
        self.http
            .request::<(), Value>(
                Method::DELETE,
                &format!("/channels/{channel_id}/messages/{message_id}"),
                None,
            )
            .await
    }

    /// A stored message as a canonical event, with its reply target resolved.
    pub async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<InboundEvent, DiscordError> {
        let message = normalize::MessageSource::fetch_message(&self.http, channel_id, message_id).await?;
        normalize::build_event(&self.http, self.self_id(), &message, EventKind::Message).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, DiscordError> {
        self.http.get(&format!("/users/{user_id}")).await
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel, DiscordError> {
        self.http.get(&format!("/channels/{channel_id}")).await
    }

    pub async fn modify_channel(
        &self,
        channel_id: &str,
        body: &ModifyChannel,
    ) -> Result<Channel, DiscordError> {
        self.http
            .request(Method::PATCH, &format!("/channels/{channel_id}"), Some(body))
            .await
    }

    pub async fn get_guild(&self, guild_id: &str) -> Result<Guild, DiscordError> {
        self.http.get(&format!("/guilds/{guild_id}")).await
    }

    pub async fn modify_guild(&self, guild_id: &str, body: &ModifyGuild) -> Result<Guild, DiscordError> {
        self.http
            .request(Method::PATCH, &format!("/guilds/{guild_id}"), Some(body))
            .await
    }

    /// Guilds the bot belongs to.
    pub async fn list_guilds(&self) -> Result<Vec<Guild>, DiscordError> {
        self.http.get("/users/@me/guilds").await
    }

    pub async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DiscordError> {
        self.http.get(&format!("/guilds/{guild_id}/channels")).await
    }

    pub async fn guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, DiscordError> {
        self.http.get(&format!("/guilds/{guild_id}/roles")).await
    }

    pub async fn create_role(&self, guild_id: &str, body: &RoleBody) -> Result<Role, DiscordError> {
        self.http
            .request(Method::POST, &format!("/guilds/{guild_id}/roles"), Some(body))
            .await
    }

    pub async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        body: &RoleBody,
    ) -> Result<Role, DiscordError> {
        self.http
            .request(
                Method::PATCH,
                &format!("/guilds/{guild_id}/roles/{role_id}"),
                Some(body),
            )
            .await
    }

    pub async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<GuildMember, DiscordError> {
        self.http
            .get(&format!("/guilds/{guild_id}/members/{user_id}"))
            .await
    }

    pub async fn modify_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
        body: &ModifyGuildMember,
    ) -> Result<(), DiscordError> {
        self.http
            .request::<Value, _>(
                Method::PATCH,
                &format!("/guilds/{guild_id}/members/{user_id}"),
                Some(body),
            )
            .await
            .map(drop)
    }

    pub async fn set_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nick: &str,
    ) -> Result<(), DiscordError> {
        let body = ModifyGuildMember {
            nick: Some(nick.to_string()),
            ..Default::default()
        };
        self.modify_guild_member(guild_id, user_id, &body).await
    }

    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), DiscordError> {
        self.http
            .request::<(), Value>(
                Method::PUT,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
                None,
            )
            .await
    }

    pub async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), DiscordError> {
        self.http
            .request::<(), Value>(
                Method::DELETE,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
                None,
            )
            .await
    }

    /// One page of members; see [`list_all_members`](Self::list_all_members) for the rest.
    pub async fn list_guild_members(
        &self,
        guild_id: &str,
        limit: usize,
        after: &str,
    ) -> Result<Vec<GuildMember>, DiscordError> {
        paginate::MemberPages::member_page(&self.http, guild_id, limit, after).await
    }

    pub async fn list_all_members(&self, guild_id: &str) -> Result<Vec<GuildMember>, DiscordError> {
        paginate::fetch_all(&self.http, guild_id).await
    }

    /// Members holding `role_id`. Walks the whole member list.
    pub async fn role_members(
        &self,
        guild_id: &str,
        role_id: &str,
    ) -> Result<Vec<GuildMember>, DiscordError> {
        paginate::fetch_filtered(&self.http, guild_id, paginate::has_role(role_id)).await
    }

    pub async fn create_webhook(
        &self,
        channel_id: &str,
        body: &WebhookBody,
    ) -> Result<Webhook, DiscordError> {
        self.http
            .request(
                Method::POST,
                &format!("/channels/{channel_id}/webhooks"),
                Some(body),
            )
            .await
    }

    pub async fn modify_webhook(
        &self,
        webhook_id: &str,
        body: &WebhookBody,
    ) -> Result<Webhook, DiscordError> {
        self.http
            .request(Method::PATCH, &format!("/webhooks/{webhook_id}"), Some(body))
            .await
    }

    pub async fn channel_webhooks(&self, channel_id: &str) -> Result<Vec<Webhook>, DiscordError> {
        self.http
            .get(&format!("/channels/{channel_id}/webhooks"))
            .await
    }

    pub async fn guild_webhooks(&self, guild_id: &str) -> Result<Vec<Webhook>, DiscordError> {
        self.http.get(&format!("/guilds/{guild_id}/webhooks")).await
    }
}

/// Text for an edit: inline markup as usual, videos and cards as their URL.
fn edit_content(message: &CanonicalMessage) -> Result<String, DiscordError> {
    let mut content = String::new();
    for segment in message.chain.iter() {
        if let Some(markup) = render_inline(segment) {
            content.push_str(&markup);
            continue;
        }
        match segment {
            Segment::Image(_) => {
                return Err(DiscordError::Validation(
                    "images cannot be added while editing a message".to_string(),
                ))
            }
            Segment::Video(asset) => content.push_str(&asset.url),
            Segment::LinkCard(card) => {
                if let Some(url) = &card.url {
                    content.push_str(url);
                }
            }
            _ => {}
        }
    }
    Ok(content)
}
