//! Cursor pagination over a guild's member list.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::api::GuildMember;
use crate::error::DiscordError;

/// Largest page the members endpoint accepts.
pub const PAGE_SIZE: usize = 1000;

/// Cursor for the first page: every snowflake sorts after it.
pub const START_CURSOR: &str = "0";

#[async_trait]
pub trait MemberPages: Send + Sync {
    /// Up to `limit` members whose user id sorts after `after`.
    async fn member_page(
        &self,
        guild_id: &str,
        limit: usize,
        after: &str,
    ) -> Result<Vec<GuildMember>, DiscordError>;
}

/// Every member of the guild. Pages are fetched one after another; a page
/// shorter than [`PAGE_SIZE`] ends the walk.
pub async fn fetch_all(
    pages: &dyn MemberPages,
    guild_id: &str,
) -> Result<Vec<GuildMember>, DiscordError> {
    let mut members = Vec::new();
    let mut cursor = START_CURSOR.to_string();

    loop {
        let page = pages.member_page(guild_id, PAGE_SIZE, &cursor).await?;
        let len = page.len();
        let next = page.last().and_then(|m| m.user_id()).map(String::from);
        members.extend(page);
        debug!(guild_id, fetched = len, total = members.len(), "member page");

        if len < PAGE_SIZE {
            break;
        }
        match next {
            Some(next) => cursor = next,
            None => {
                warn!(guild_id, "member page ended without a user id, stopping");
                break;
            }
        }
    }

    Ok(members)
}

/// Every member matching `predicate`. The full list is enumerated first.
pub async fn fetch_filtered<P>(
    pages: &dyn MemberPages,
    guild_id: &str,
    predicate: P,
) -> Result<Vec<GuildMember>, DiscordError>
where
    P: Fn(&GuildMember) -> bool + Send,
{
    let members = fetch_all(pages, guild_id).await?;
    Ok(members.into_iter().filter(|m| predicate(m)).collect())
}

pub fn has_role(role_id: &str) -> impl Fn(&GuildMember) -> bool + Send + '_ {
    move |member| member.roles.iter().any(|r| r == role_id)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::api::User;

    /// Serves `total` members with ids 1..=total, sorted.
    struct FakeGuild {
        total: usize,
        cursors: Mutex<Vec<String>>,
    }

    impl FakeGuild {
        fn new(total: usize) -> Self {
            Self {
                total,
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    fn member(id: usize) -> GuildMember {
        GuildMember {
            user: Some(User {
                id: id.to_string(),
                ..Default::default()
            }),
            nick: None,
            roles: if id % 2 == 0 { vec!["even".into()] } else { vec![] },
        }
    }

    #[async_trait]
    impl MemberPages for FakeGuild {
        async fn member_page(
            &self,
            _guild_id: &str,
            limit: usize,
            after: &str,
        ) -> Result<Vec<GuildMember>, DiscordError> {
            self.cursors.lock().unwrap().push(after.to_string());
            let after: usize = after.parse().unwrap();
            Ok((after + 1..=self.total).take(limit).map(member).collect())
        }
    }

    #[tokio::test]
    async fn walks_until_a_short_page() {
        let guild = FakeGuild::new(2500);
        let members = fetch_all(&guild, "g").await.unwrap();

        assert_eq!(members.len(), 2500);
        assert_eq!(
            *guild.cursors.lock().unwrap(),
            vec!["0".to_string(), "1000".to_string(), "2000".to_string()]
        );
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let guild = FakeGuild::new(2000);
        let members = fetch_all(&guild, "g").await.unwrap();
        assert_eq!(members.len(), 2000);
        assert_eq!(guild.cursors.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn role_filter_applies_after_enumeration() {
        let guild = FakeGuild::new(1500);
        let members = fetch_filtered(&guild, "g", has_role("even")).await.unwrap();
        assert_eq!(members.len(), 750);
        assert_eq!(guild.cursors.lock().unwrap().len(), 2);
    }
}
