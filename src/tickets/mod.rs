//! Ticket records, their on-disk store, and the intake flows that fill them.

pub mod flow;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use flow::{BeginOutcome, CaptureOutcome, FlowEngine};
pub use store::TicketStore;

/// Structured intake flows that only run inside ticket channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowKind {
    KnownPolls,
    ClanRegistration,
    RoleApplication,
}

impl FlowKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::KnownPolls => "Known Polls",
            Self::ClanRegistration => "Clan Registration",
            Self::RoleApplication => "YouTube Role",
        }
    }

    /// Asks the user for the value this flow captures.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::KnownPolls => "Please provide your Minecraft IGN.",
            Self::ClanRegistration => {
                "Clan registration requirements:\n\
                 • Minimum 6 active members\n\
                 • Clan Discord server\n\
                 • Screenshot proof\n\
                 • Server invite link\n\
                 Please provide your clan name."
            }
            Self::RoleApplication => "Please provide a link to your YouTube channel.",
        }
    }

    pub fn confirmation(&self) -> &'static str {
        match self {
            Self::KnownPolls => {
                "Your IGN has been received.\nYou have been added to the Known Polls list."
            }
            Self::ClanRegistration => {
                "Your clan name has been received.\nStaff will review your registration in this ticket."
            }
            Self::RoleApplication => {
                "Your channel link has been received.\nStaff will review your application in this ticket."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStep {
    Idle,
    AwaitingInput,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub ticket_id: String,
    pub flow: Option<FlowKind>,
    pub step: FlowStep,
    #[serde(default)]
    pub captured_value: Option<String>,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TicketRecord {
    pub fn awaiting(ticket_id: impl Into<String>, flow: FlowKind, author_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            flow: Some(flow),
            step: FlowStep::AwaitingInput,
            captured_value: None,
            author_id: author_id.into(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.step == FlowStep::AwaitingInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_camel_case_and_screaming_enums() {
        let record = TicketRecord::awaiting("42", FlowKind::KnownPolls, "7");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ticketId"], "42");
        assert_eq!(json["flow"], "KNOWN_POLLS");
        assert_eq!(json["step"], "AWAITING_INPUT");
        assert_eq!(json["authorId"], "7");
        assert!(json["capturedValue"].is_null());
        assert!(json.get("completedAt").is_none());
    }

    #[test]
    fn record_accepts_missing_optional_fields() {
        let raw = r#"{
            "ticketId": "1",
            "flow": null,
            "step": "IDLE",
            "authorId": "2",
            "createdAt": "2026-01-05T10:00:00Z"
        }"#;
        let record: TicketRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.flow, None);
        assert_eq!(record.step, FlowStep::Idle);
        assert_eq!(record.captured_value, None);
    }
}
