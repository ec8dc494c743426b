//! Per-message pipeline: normalize, match rules, advance ticket flows,
//! classify, act, persist, reply.
//!
//! Replies are always dispatched after any store write they depend on.

use std::collections::BTreeSet;
use std::sync::{Arc, MutexGuard, OnceLock, PoisonError};

use dashmap::DashMap;
use serenity::model::id::{ChannelId, MessageId, UserId};
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::ai::intents::ClassifierContext;
use crate::ai::{Intent, IntentClassifier};
use crate::config::Config;
use crate::dispatch::{ReplyDispatcher, ReplyTarget};
use crate::error::RouterError;
use crate::rules::{self, GreetingTracker, RuleMatcher, RuleOutcome};
use crate::tickets::{BeginOutcome, CaptureOutcome, FlowEngine, FlowKind};

pub const THANKS_REPLY: &str = "You're welcome.";
pub const GREETING_REPLY: &str = "Hello.";
pub const ALREADY_PROCESSED_REPLY: &str = "This request has already been processed for this ticket.";
pub const GENERIC_FAILURE_REPLY: &str = "There was an issue processing your request.";

/// Gateway-independent view of a message-create event.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub author_id: UserId,
    pub is_bot: bool,
    pub in_guild: bool,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub content: String,
    pub mentioned_users: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub ticket_prefix: String,
    pub tickets_channel: String,
    pub bot_name: String,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ticket_prefix: config.ticket_prefix.clone(),
            tickets_channel: config.tickets_channel.clone(),
            bot_name: config.bot_name.clone(),
        }
    }

    fn is_ticket_channel(&self, channel_name: &str) -> bool {
        channel_name.starts_with(&self.ticket_prefix)
    }

    fn gate_reply(&self) -> String {
        format!("Please create a ticket at {}.", self.tickets_channel)
    }
}

/// Admits messages into the pipeline one at a time per channel, lowest
/// message id first.
///
/// Queues are never pruned; the map holds at most one per guild channel.
#[derive(Debug, Default)]
pub struct ChannelSequencer {
    channels: DashMap<ChannelId, Arc<ChannelQueue>>,
}

#[derive(Debug, Default)]
struct ChannelQueue {
    pending: std::sync::Mutex<BTreeSet<MessageId>>,
    advanced: Notify,
    turn: Arc<Mutex<()>>,
}

impl ChannelQueue {
    fn pending(&self) -> MutexGuard<'_, BTreeSet<MessageId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_head(&self, message_id: MessageId) -> bool {
        self.pending().first() == Some(&message_id)
    }
}

impl ChannelSequencer {
    /// Reserves a place for `message_id`. Synchronous, so the gateway handler
    /// can call it before its first `.await`.
    pub fn reserve(&self, channel_id: ChannelId, message_id: MessageId) -> Reservation {
        let queue = self.channels.entry(channel_id).or_default().clone();
        queue.pending().insert(message_id);
        Reservation { queue, message_id }
    }

    #[cfg(test)]
    fn pending_len(&self, channel_id: ChannelId) -> usize {
        self.channels
            .get(&channel_id)
            .map_or(0, |queue| queue.pending().len())
    }
}

/// A message's place in its channel queue. Dropping it gives up the place.
#[derive(Debug)]
pub struct Reservation {
    queue: Arc<ChannelQueue>,
    message_id: MessageId,
}

impl Reservation {
    /// Waits until every lower reserved id in the channel has finished, then
    /// takes the channel for the rest of the pipeline.
    pub async fn turn(self) -> ChannelTurn {
        loop {
            let advanced = self.queue.advanced.notified();
            tokio::pin!(advanced);
            advanced.as_mut().enable();
            if self.queue.is_head(self.message_id) {
                break;
            }
            advanced.await;
        }
        let guard = Arc::clone(&self.queue.turn).lock_owned().await;
        ChannelTurn {
            _guard: guard,
            _reservation: self,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.queue.pending().remove(&self.message_id);
        self.queue.advanced.notify_waiters();
    }
}

/// Exclusive hold on a channel. The lock is released before the reservation
/// so the next message wakes to a free channel.
#[derive(Debug)]
pub struct ChannelTurn {
    _guard: OwnedMutexGuard<()>,
    _reservation: Reservation,
}

pub struct MessageRouter {
    settings: RouterSettings,
    rules: RuleMatcher,
    classifier: IntentClassifier,
    flows: FlowEngine,
    greetings: GreetingTracker,
    sequencer: ChannelSequencer,
    bot_user: OnceLock<UserId>,
}

impl MessageRouter {
    pub fn new(
        settings: RouterSettings,
        rules: RuleMatcher,
        classifier: IntentClassifier,
        flows: FlowEngine,
    ) -> Self {
        Self {
            settings,
            rules,
            classifier,
            flows,
            greetings: GreetingTracker::new(),
            sequencer: ChannelSequencer::default(),
            bot_user: OnceLock::new(),
        }
    }

    pub fn set_bot_user(&self, id: UserId) {
        let _ = self.bot_user.set(id);
    }

    pub fn flows(&self) -> &FlowEngine {
        &self.flows
    }

    pub fn is_ticket_channel(&self, channel_name: &str) -> bool {
        self.settings.is_ticket_channel(channel_name)
    }

    /// Takes the message's place in its channel queue. Call this as soon as
    /// the event arrives, before anything awaits.
    pub fn reserve(&self, channel_id: ChannelId, message_id: MessageId) -> Reservation {
        self.sequencer.reserve(channel_id, message_id)
    }

    /// Runs one message through the pipeline once its reservation comes up
    /// and dispatches the reply, if any.
    ///
    /// Returns the reply text that was sent (before mention rendering).
    pub async fn handle(
        &self,
        message: InboundMessage,
        reservation: Reservation,
        dispatcher: &ReplyDispatcher,
    ) -> Result<Option<String>, RouterError> {
        if message.is_bot || !message.in_guild {
            return Ok(None);
        }

        let _turn = reservation.turn().await;

        let target = ReplyTarget {
            channel_id: message.channel_id,
            author_id: message.author_id,
            is_ticket: self.is_ticket_channel(&message.channel_name),
        };

        let reply = match self.resolve(&message, target.is_ticket).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    channel_id = %message.channel_id,
                    error = %e,
                    "Failed to process message"
                );
                Some(GENERIC_FAILURE_REPLY.to_string())
            }
        };

        if let Some(text) = &reply {
            dispatcher.send(&target, text).await?;
        }
        Ok(reply)
    }

    async fn resolve(
        &self,
        message: &InboundMessage,
        is_ticket: bool,
    ) -> Result<Option<String>, RouterError> {
        let first_message = self.greetings.observe(message.channel_id);
        let text = rules::normalize(&message.content);
        let outcome = self.rules.evaluate(&text, is_ticket, first_message);

        debug!(
            channel_id = %message.channel_id,
            ticket = is_ticket,
            rule = outcome.label(),
            "Rules evaluated"
        );

        let reply = match outcome {
            RuleOutcome::Thanks => Some(THANKS_REPLY.to_string()),
            RuleOutcome::Greeting { first: true } => Some(GREETING_REPLY.to_string()),
            RuleOutcome::Greeting { first: false } => None,
            RuleOutcome::TicketGateViolation(flow) => {
                info!(channel_id = %message.channel_id, flow = flow.display_name(), "Ticket-only request outside a ticket");
                Some(self.settings.gate_reply())
            }
            RuleOutcome::TicketTopic(flow) => Some(self.begin_flow(message, flow, None).await?),
            RuleOutcome::ClientInfoLookup { .. } | RuleOutcome::NoMatch => {
                let ticket_id = message.channel_id.to_string();
                if is_ticket && self.flows.is_awaiting(&ticket_id).await {
                    return self.capture(&ticket_id, &message.content).await;
                }
                if !is_ticket && !self.is_addressed(message, &text) {
                    return Ok(None);
                }
                if let RuleOutcome::ClientInfoLookup { keys, channels } = outcome {
                    debug!(channel_id = %message.channel_id, keys = ?keys, "Client lookup matched");
                    Some(lookup_reply(&channels))
                } else {
                    self.classify_and_act(message, is_ticket).await?
                }
            }
        };
        Ok(reply)
    }

    fn is_addressed(&self, message: &InboundMessage, text: &str) -> bool {
        let mentioned = self
            .bot_user
            .get()
            .is_some_and(|bot| message.mentioned_users.contains(bot));
        mentioned || rules::mentions_name(text, &self.settings.bot_name)
    }

    async fn classify_and_act(
        &self,
        message: &InboundMessage,
        is_ticket: bool,
    ) -> Result<Option<String>, RouterError> {
        let context = ClassifierContext {
            is_ticket,
            ticket: self.flows.record(&message.channel_id.to_string()).await,
        };
        let classification = self.classifier.classify(&message.content, &context).await;
        let intent = classification.actionable_intent();

        if let Some(flow) = intent.ticket_flow() {
            if !is_ticket {
                return Ok(Some(self.settings.gate_reply()));
            }
            let reply = self
                .begin_flow(message, flow, classification.extracted_field.as_deref())
                .await?;
            return Ok(Some(reply));
        }

        match intent {
            // Named clients were already answered by the rules.
            Intent::ClientToolbox => {
                let keys: Vec<&str> = self.rules.directory().keys().collect();
                Ok(Some(format!(
                    "Which client do you need? Known clients: {}.",
                    keys.join(", ")
                )))
            }
            _ => Ok(None),
        }
    }

    async fn begin_flow(
        &self,
        message: &InboundMessage,
        flow: FlowKind,
        value: Option<&str>,
    ) -> Result<String, RouterError> {
        let ticket_id = message.channel_id.to_string();
        let author_id = message.author_id.to_string();
        let outcome = match value {
            Some(value) => {
                self.flows
                    .begin_with_value(&ticket_id, flow, &author_id, value)
                    .await?
            }
            None => self.flows.begin(&ticket_id, flow, &author_id).await?,
        };

        Ok(match outcome {
            BeginOutcome::Prompted(flow) => flow.prompt().to_string(),
            BeginOutcome::AlreadyAwaiting { pending } => pending.prompt().to_string(),
            BeginOutcome::AlreadyCompleted => ALREADY_PROCESSED_REPLY.to_string(),
            BeginOutcome::CompletedDirectly { flow, .. } => flow.confirmation().to_string(),
        })
    }

    async fn capture(&self, ticket_id: &str, raw: &str) -> Result<Option<String>, RouterError> {
        let payload = rules::strip_mentions(raw);
        Ok(match self.flows.capture(ticket_id, &payload).await? {
            CaptureOutcome::Captured { flow, .. } => Some(flow.confirmation().to_string()),
            CaptureOutcome::NotAwaiting | CaptureOutcome::EmptyInput => None,
        })
    }
}

fn lookup_reply(channels: &[String]) -> String {
    format!(
        "The requested resources are available in {}.",
        channels.join(", ")
    )
}
