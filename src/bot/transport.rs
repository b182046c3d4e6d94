//! Discord direct-message notification transport.

use crate::core::dispatch::NotificationTransport;
use crate::core::template::RenderedNotification;
use crate::entities::Priority;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Channel name recorded in the notification log for DM deliveries
pub const DISCORD_DM_CHANNEL: &str = "discord_dm";

/// Delivers notifications as embeds in direct messages.
pub struct DiscordTransport {
    http: Arc<serenity::Http>,
}

impl DiscordTransport {
    /// Creates a transport with its own HTTP client for `token`.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(serenity::Http::new(token)),
        }
    }

    /// Creates a transport sharing an existing HTTP client.
    #[must_use]
    pub const fn from_http(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

/// Embed colour for a notification priority.
#[must_use]
pub const fn priority_colour(priority: Priority) -> u32 {
    match priority {
        Priority::Low => 0x0095_A5A6,
        Priority::Medium => 0x0034_98DB,
        Priority::High => 0x00E6_7E22,
        Priority::Urgent => 0x00E7_4C3C,
    }
}

/// Parses a stored recipient id into a Discord user id.
pub fn parse_user_id(recipient_id: &str) -> Result<serenity::UserId> {
    match recipient_id.trim().parse::<u64>() {
        // UserId::new panics on zero
        Ok(id) if id != 0 => Ok(serenity::UserId::new(id)),
        _ => Err(Error::Dispatch {
            recipient: recipient_id.to_string(),
            message: "not a Discord user id".to_string(),
        }),
    }
}

fn build_embed(notification: &RenderedNotification) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::default()
        .title(&notification.title)
        .description(&notification.message)
        .color(priority_colour(notification.priority))
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Priority: {}",
            notification.priority
        )));

    if let Some(url) = &notification.action_url {
        let label = notification
            .action_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or("Open");
        embed = embed.field(label, url, false);
    }
    embed
}

#[async_trait]
impl NotificationTransport for DiscordTransport {
    fn channel(&self) -> &str {
        DISCORD_DM_CHANNEL
    }

    async fn send(&self, recipient_id: &str, notification: &RenderedNotification) -> Result<()> {
        let user_id = parse_user_id(recipient_id)?;
        let failed = |e: serenity::Error| Error::Dispatch {
            recipient: recipient_id.to_string(),
            message: e.to_string(),
        };

        let dm = user_id
            .create_dm_channel(self.http.as_ref())
            .await
            .map_err(failed)?;
        dm.send_message(
            self.http.as_ref(),
            serenity::CreateMessage::new().embed(build_embed(notification)),
        )
        .await
        .map_err(failed)?;
        Ok(())
    }
}
