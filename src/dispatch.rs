use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{ChannelId, UserId};
use tracing::debug;

use crate::error::DispatchError;

/// Outbound side of the gateway. Channel messages only; there is no DM path.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn say(&self, channel_id: ChannelId, content: &str) -> Result<(), DispatchError>;
}

pub struct SerenityReplySink {
    http: Arc<Http>,
}

impl SerenityReplySink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReplySink for SerenityReplySink {
    async fn say(&self, channel_id: ChannelId, content: &str) -> Result<(), DispatchError> {
        channel_id.say(&self.http, content).await?;
        Ok(())
    }
}

/// Where a reply goes and who asked for it.
#[derive(Debug, Clone, Copy)]
pub struct ReplyTarget {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub is_ticket: bool,
}

/// Mentions the author outside ticket channels; tickets get the bare text.
pub fn render_reply(target: &ReplyTarget, text: &str) -> String {
    if target.is_ticket {
        text.to_string()
    } else {
        format!("<@{}> {}", target.author_id, text)
    }
}

/// The only component that sends messages.
pub struct ReplyDispatcher {
    sink: Arc<dyn ReplySink>,
}

impl ReplyDispatcher {
    pub fn new(sink: Arc<dyn ReplySink>) -> Self {
        Self { sink }
    }

    pub async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), DispatchError> {
        let content = render_reply(target, text);
        debug!(channel_id = %target.channel_id, ticket = target.is_ticket, "Dispatching reply");
        self.sink.say(target.channel_id, &content).await
    }
}
