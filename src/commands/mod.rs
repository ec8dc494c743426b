use serenity::builder::{
    CreateCommand, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse,
};
use serenity::model::prelude::*;
use serenity::model::Timestamp;
use serenity::prelude::*;
use tracing::info;

use crate::bot::ShardManagerContainer;
use crate::router::MessageRouter;
use crate::tickets::{FlowStep, TicketRecord};

const FOOTER: &str = "SMH Manager";

pub async fn ping(ctx: &Context, command: &CommandInteraction) -> Result<(), serenity::Error> {
    info!("Ping command executed by {}", command.user.tag());
    let http = ctx.http.clone();
    let start = std::time::Instant::now();

    command.defer_ephemeral(&http).await?;

    let api_latency = start.elapsed().as_millis();
    let ws_latency = {
        let data = ctx.data.read().await;
        match data.get::<ShardManagerContainer>() {
            Some(manager) => manager
                .runners
                .lock()
                .await
                .get(&ctx.shard_id)
                .and_then(|runner| runner.latency)
                .map(|d| d.as_millis())
                .unwrap_or(0),
            None => 0,
        }
    };

    info!("Ping results - API: {}ms, WebSocket: {}ms", api_latency, ws_latency);

    let embed = CreateEmbed::new()
        .title("🏓 Pong!")
        .color(0x57F287_u32)
        .field("Latency", format!("{}ms", api_latency), true)
        .field("WebSocket", format!("{}ms", ws_latency), true)
        .timestamp(Timestamp::now());

    command
        .edit_response(&http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

pub async fn ticketstatus(
    ctx: &Context,
    command: &CommandInteraction,
    router: &MessageRouter,
) -> Result<(), serenity::Error> {
    let ticket_id = command.channel_id.to_string();
    info!(ticket_id = %ticket_id, user = %command.user.tag(), "Ticket status requested");

    let message = match router.flows().record(&ticket_id).await {
        Some(record) => CreateInteractionResponseMessage::new().embed(status_embed(&record)),
        None => CreateInteractionResponseMessage::new()
            .content("No ticket flow has been started in this channel."),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message.ephemeral(true)))
        .await
}

fn step_label(step: FlowStep) -> &'static str {
    match step {
        FlowStep::Idle => "Idle",
        FlowStep::AwaitingInput => "Awaiting input",
        FlowStep::Completed => "Completed",
    }
}

fn status_embed(record: &TicketRecord) -> CreateEmbed {
    let flow = record.flow.map(|f| f.display_name()).unwrap_or("None");
    let captured = record
        .captured_value
        .as_deref()
        .map(|v| format!("`{}`", v))
        .unwrap_or_else(|| "None".to_string());

    let mut embed = CreateEmbed::new()
        .title("🎟️ Ticket Status")
        .color(match record.step {
            FlowStep::Completed => 0x57F287_u32,
            _ => 0xFEE75C_u32,
        })
        .field("Flow", flow, true)
        .field("Step", step_label(record.step), true)
        .field("Captured", captured, true)
        .field("Requested by", format!("<@{}>", record.author_id), true)
        .field("Opened", record.created_at.format("%b %d, %Y %H:%M UTC").to_string(), true)
        .footer(CreateEmbedFooter::new(FOOTER))
        .timestamp(Timestamp::now());

    if let Some(completed_at) = record.completed_at {
        embed = embed.field(
            "Completed",
            completed_at.format("%b %d, %Y %H:%M UTC").to_string(),
            true,
        );
    }
    embed
}

pub fn register_ping() -> CreateCommand {
    CreateCommand::new("ping").description("Check the bot's latency")
}

pub fn register_ticketstatus() -> CreateCommand {
    CreateCommand::new("ticketstatus").description("Show the intake status of this ticket")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_labels_are_human_readable() {
        assert_eq!(step_label(FlowStep::AwaitingInput), "Awaiting input");
        assert_eq!(step_label(FlowStep::Completed), "Completed");
    }
}
