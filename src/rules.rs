//! Deterministic rules that run before the classifier.
//!
//! Anything matched here short-circuits the completion service entirely.

use dashmap::DashMap;
use serenity::model::id::ChannelId;

use crate::directory::ClientChannelDirectory;
use crate::tickets::FlowKind;

const THANKS_PHRASES: [&str; 4] = ["thank you", "thanks", "thx", "ty"];
const GREETINGS: [&str; 3] = ["hi", "hello", "hey"];

struct TopicPattern {
    words: &'static [&'static str],
    /// Match the last word by prefix ("regist" covers "registration").
    prefix_last: bool,
    flow: FlowKind,
}

const TICKET_TOPICS: [TopicPattern; 6] = [
    TopicPattern {
        words: &["known", "poll"],
        prefix_last: true,
        flow: FlowKind::KnownPolls,
    },
    TopicPattern {
        words: &["kp"],
        prefix_last: false,
        flow: FlowKind::KnownPolls,
    },
    TopicPattern {
        words: &["clan", "regist"],
        prefix_last: true,
        flow: FlowKind::ClanRegistration,
    },
    TopicPattern {
        words: &["youtube", "role"],
        prefix_last: true,
        flow: FlowKind::RoleApplication,
    },
    TopicPattern {
        words: &["youtuber", "role"],
        prefix_last: true,
        flow: FlowKind::RoleApplication,
    },
    TopicPattern {
        words: &["yt", "role"],
        prefix_last: true,
        flow: FlowKind::RoleApplication,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Thanks,
    /// Greeting token; only the first message seen in a channel gets a reply.
    Greeting { first: bool },
    /// Ticket-only topic raised outside a ticket channel.
    TicketGateViolation(FlowKind),
    /// Ticket-only topic raised inside a ticket channel.
    TicketTopic(FlowKind),
    ClientInfoLookup {
        keys: Vec<String>,
        channels: Vec<String>,
    },
    NoMatch,
}

impl RuleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Thanks => "thanks",
            Self::Greeting { .. } => "greeting",
            Self::TicketGateViolation(_) => "ticket_gate_violation",
            Self::TicketTopic(_) => "ticket_topic",
            Self::ClientInfoLookup { .. } => "client_info_lookup",
            Self::NoMatch => "no_match",
        }
    }
}

/// Lowercases, trims, drops user mentions and collapses whitespace.
pub fn normalize(text: &str) -> String {
    strip_mentions(text).to_lowercase()
}

/// Drops user mentions and collapses whitespace, keeping the original case.
pub fn strip_mentions(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| !is_user_mention(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_user_mention(token: &str) -> bool {
    token.starts_with("<@") && token.ends_with('>') && !token.starts_with("<@&")
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let phrase: Vec<&str> = phrase.split_whitespace().collect();
    words.windows(phrase.len()).any(|window| window == phrase.as_slice())
}

fn matches_topic(words: &[&str], topic: &TopicPattern) -> bool {
    let n = topic.words.len();
    words.windows(n).any(|window| {
        window.iter().zip(topic.words).enumerate().all(|(i, (word, want))| {
            if topic.prefix_last && i == n - 1 {
                word.starts_with(want)
            } else {
                word == want
            }
        })
    })
}

/// True if `name` appears in `text` as whole words.
pub fn mentions_name(text: &str, name: &str) -> bool {
    !name.trim().is_empty() && contains_phrase(&words(text), &name.to_lowercase())
}

/// Ticket-only flow named by `text`, if any.
pub fn ticket_topic(text: &str) -> Option<FlowKind> {
    let words = words(text);
    TICKET_TOPICS
        .iter()
        .find(|topic| matches_topic(&words, topic))
        .map(|topic| topic.flow)
}

pub struct RuleMatcher {
    directory: ClientChannelDirectory,
}

impl RuleMatcher {
    pub fn new(directory: ClientChannelDirectory) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &ClientChannelDirectory {
        &self.directory
    }

    /// Evaluates normalized text. First match wins:
    /// thanks, greeting, ticket topic, client lookup.
    pub fn evaluate(&self, text: &str, is_ticket: bool, first_message: bool) -> RuleOutcome {
        let words = words(text);

        if THANKS_PHRASES
            .iter()
            .any(|phrase| contains_phrase(&words, phrase))
        {
            return RuleOutcome::Thanks;
        }

        let bare = text.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
        if GREETINGS.contains(&bare) {
            return RuleOutcome::Greeting {
                first: first_message,
            };
        }

        if let Some(flow) = ticket_topic(text) {
            return if is_ticket {
                RuleOutcome::TicketTopic(flow)
            } else {
                RuleOutcome::TicketGateViolation(flow)
            };
        }

        let entries = self.directory.lookup(text);
        if !entries.is_empty() {
            return RuleOutcome::ClientInfoLookup {
                keys: entries.iter().map(|e| e.key.clone()).collect(),
                channels: entries
                    .iter()
                    .flat_map(|e| e.channels.iter().cloned())
                    .collect(),
            };
        }

        RuleOutcome::NoMatch
    }
}

/// Channels that have already had a message observed. Process lifetime only.
///
/// Never pruned; holds at most one entry per guild channel.
#[derive(Debug, Default)]
pub struct GreetingTracker {
    seen: DashMap<ChannelId, ()>,
}

impl GreetingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message in `channel_id`; true if it is the first one seen.
    pub fn observe(&self, channel_id: ChannelId) -> bool {
        self.seen.insert(channel_id, ()).is_none()
    }
}
