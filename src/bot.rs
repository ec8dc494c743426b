use serenity::async_trait;
use serenity::builder::{CreateInteractionResponse, CreateInteractionResponseMessage};
use serenity::client::{Context, EventHandler};
use serenity::gateway::ShardManager;
use serenity::model::application::{Command, Interaction};
use serenity::model::gateway::Ready;
use serenity::model::prelude::*;
use serenity::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::dispatch::{ReplyDispatcher, ReplySink, ReplyTarget, SerenityReplySink};
use crate::router::{InboundMessage, MessageRouter, GENERIC_FAILURE_REPLY};

pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

pub struct Handler {
    router: Arc<MessageRouter>,
}

impl Handler {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected and ready!", ready.user.name);
        self.router.set_bot_user(ready.user.id);

        let commands = Command::set_global_commands(
            &ctx.http,
            vec![commands::register_ping(), commands::register_ticketstatus()],
        )
        .await;

        match commands {
            Ok(_) => info!("Successfully registered application commands"),
            Err(e) => error!("Failed to register application commands: {}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let result = match command.data.name.as_str() {
                "ping" => commands::ping(&ctx, &command).await,
                "ticketstatus" => commands::ticketstatus(&ctx, &command, &self.router).await,
                _ => {
                    error!("Unknown command: {}", command.data.name);
                    Ok(())
                }
            };

            if let Err(e) = result {
                error!("Error handling command {}: {}", command.data.name, e);
                let response = CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("An error occurred while processing the command.")
                        .ephemeral(true),
                );
                let _ = command.create_response(&ctx.http, response).await;
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        // Serenity runs each event in its own task; claim the message's
        // place in its channel before the first await.
        let reservation = self.router.reserve(msg.channel_id, msg.id);

        let channel_name = match msg.guild_id {
            Some(_) => msg.channel_id.name(&ctx).await.unwrap_or_else(|e| {
                warn!(channel_id = %msg.channel_id, error = %e, "Could not resolve channel name");
                String::new()
            }),
            None => String::new(),
        };

        let target = ReplyTarget {
            channel_id: msg.channel_id,
            author_id: msg.author.id,
            is_ticket: self.router.is_ticket_channel(&channel_name),
        };
        let inbound = InboundMessage {
            message_id: msg.id,
            author_id: msg.author.id,
            is_bot: msg.author.bot,
            in_guild: msg.guild_id.is_some(),
            channel_id: msg.channel_id,
            channel_name,
            content: msg.content,
            mentioned_users: msg.mentions.iter().map(|user| user.id).collect(),
        };

        let sink: Arc<dyn ReplySink> = Arc::new(SerenityReplySink::new(ctx.http.clone()));
        let router = Arc::clone(&self.router);
        let task_sink = Arc::clone(&sink);

        // Own task so a panic in the pipeline is contained to this message.
        let outcome = tokio::spawn(async move {
            let dispatcher = ReplyDispatcher::new(task_sink);
            router.handle(inbound, reservation, &dispatcher).await
        })
        .await;

        match outcome {
            Ok(Ok(Some(reply))) => {
                debug!(channel_id = %target.channel_id, reply = %reply, "Replied to message")
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                error!(channel_id = %target.channel_id, error = %e, "Failed to deliver reply");
            }
            Err(e) => {
                error!(channel_id = %target.channel_id, error = %e, "Message handler panicked");
                let dispatcher = ReplyDispatcher::new(sink);
                if let Err(e) = dispatcher.send(&target, GENERIC_FAILURE_REPLY).await {
                    error!(channel_id = %target.channel_id, error = %e, "Failed to send apology");
                }
            }
        }
    }
}
