use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::tickets::{FlowKind, FlowStep, TicketRecord, TicketStore};

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// A new record is waiting for input; reply with the flow prompt.
    Prompted(FlowKind),
    /// The ticket is already waiting for input for `pending`; re-prompt.
    AlreadyAwaiting { pending: FlowKind },
    /// The ticket already finished a flow; nothing is changed.
    AlreadyCompleted,
    /// The value arrived with the request and the flow finished in one step.
    CompletedDirectly { flow: FlowKind, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured { flow: FlowKind, value: String },
    /// Nothing is pending for this ticket.
    NotAwaiting,
    /// Input was blank after trimming; still waiting.
    EmptyInput,
}

/// Per-ticket `IDLE -> AWAITING_INPUT -> COMPLETED` machine over the store.
///
/// Every transition is persisted before the caller sees the outcome. All
/// access goes through one mutex, so two messages can never interleave a
/// read-modify-write on the file.
pub struct FlowEngine {
    store: Mutex<TicketStore>,
}

impl FlowEngine {
    pub fn new(store: TicketStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    pub async fn record(&self, ticket_id: &str) -> Option<TicketRecord> {
        self.store.lock().await.get(ticket_id).cloned()
    }

    pub async fn is_awaiting(&self, ticket_id: &str) -> bool {
        self.store
            .lock()
            .await
            .get(ticket_id)
            .is_some_and(TicketRecord::is_awaiting)
    }

    pub async fn begin(
        &self,
        ticket_id: &str,
        flow: FlowKind,
        author_id: &str,
    ) -> Result<BeginOutcome, StoreError> {
        let mut store = self.store.lock().await;

        if let Some(outcome) = existing_outcome(store.get(ticket_id)) {
            debug!(ticket_id, ?outcome, "Ticket flow already started");
            return Ok(outcome);
        }

        store
            .put(TicketRecord::awaiting(ticket_id, flow, author_id))
            .await?;
        info!(ticket_id, flow = flow.display_name(), "Ticket flow awaiting input");
        Ok(BeginOutcome::Prompted(flow))
    }

    /// Starts and finishes `flow` in one step with an already-known value.
    pub async fn begin_with_value(
        &self,
        ticket_id: &str,
        flow: FlowKind,
        author_id: &str,
        value: &str,
    ) -> Result<BeginOutcome, StoreError> {
        let value = value.trim();
        if value.is_empty() {
            return self.begin(ticket_id, flow, author_id).await;
        }

        let mut store = self.store.lock().await;
        if let Some(outcome) = existing_outcome(store.get(ticket_id)) {
            return Ok(outcome);
        }

        let mut record = TicketRecord::awaiting(ticket_id, flow, author_id);
        complete(&mut record, value);
        store.put(record).await?;
        info!(ticket_id, flow = flow.display_name(), "Ticket flow completed directly");
        Ok(BeginOutcome::CompletedDirectly {
            flow,
            value: value.to_string(),
        })
    }

    /// Treats `raw` as the payload for a ticket that is awaiting input.
    pub async fn capture(&self, ticket_id: &str, raw: &str) -> Result<CaptureOutcome, StoreError> {
        let mut store = self.store.lock().await;

        let Some(current) = store.get(ticket_id).filter(|r| r.is_awaiting()) else {
            return Ok(CaptureOutcome::NotAwaiting);
        };

        let value = raw.trim();
        if value.is_empty() {
            return Ok(CaptureOutcome::EmptyInput);
        }

        let mut record = current.clone();
        let flow = record.flow.unwrap_or(FlowKind::KnownPolls);
        record.flow = Some(flow);
        complete(&mut record, value);
        store.put(record).await?;

        info!(ticket_id, flow = flow.display_name(), "Ticket flow captured input");
        Ok(CaptureOutcome::Captured {
            flow,
            value: value.to_string(),
        })
    }
}

fn existing_outcome(record: Option<&TicketRecord>) -> Option<BeginOutcome> {
    let record = record?;
    match record.step {
        FlowStep::Completed => Some(BeginOutcome::AlreadyCompleted),
        FlowStep::AwaitingInput => Some(BeginOutcome::AlreadyAwaiting {
            pending: record.flow.unwrap_or(FlowKind::KnownPolls),
        }),
        FlowStep::Idle => None,
    }
}

fn complete(record: &mut TicketRecord, value: &str) {
    record.step = FlowStep::Completed;
    record.captured_value = Some(value.to_string());
    record.completed_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> (tempfile::TempDir, FlowEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::load(dir.path().join("known_polls.json"))
            .await
            .unwrap();
        (dir, FlowEngine::new(store))
    }

    #[tokio::test]
    async fn begin_enters_awaiting_once() {
        let (_dir, engine) = engine().await;

        let first = engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap();
        assert_eq!(first, BeginOutcome::Prompted(FlowKind::KnownPolls));
        let created_at = engine.record("9").await.unwrap().created_at;

        let second = engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap();
        assert_eq!(
            second,
            BeginOutcome::AlreadyAwaiting {
                pending: FlowKind::KnownPolls
            }
        );
        let record = engine.record("9").await.unwrap();
        assert_eq!(record.step, FlowStep::AwaitingInput);
        assert_eq!(record.created_at, created_at);
    }

    #[tokio::test]
    async fn capture_trims_and_completes() {
        let (_dir, engine) = engine().await;
        engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap();

        let outcome = engine.capture("9", "  Steve123  ").await.unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Captured {
                flow: FlowKind::KnownPolls,
                value: "Steve123".to_string()
            }
        );
        let record = engine.record("9").await.unwrap();
        assert_eq!(record.step, FlowStep::Completed);
        assert_eq!(record.captured_value.as_deref(), Some("Steve123"));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn completed_ticket_rejects_everything() {
        let (_dir, engine) = engine().await;
        engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap();
        engine.capture("9", "Steve123").await.unwrap();
        let before = engine.record("9").await.unwrap();

        assert_eq!(
            engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap(),
            BeginOutcome::AlreadyCompleted
        );
        assert_eq!(
            engine.begin("9", FlowKind::ClanRegistration, "1").await.unwrap(),
            BeginOutcome::AlreadyCompleted
        );
        assert_eq!(
            engine.capture("9", "Alex").await.unwrap(),
            CaptureOutcome::NotAwaiting
        );
        assert_eq!(
            engine
                .begin_with_value("9", FlowKind::KnownPolls, "1", "Alex")
                .await
                .unwrap(),
            BeginOutcome::AlreadyCompleted
        );
        assert_eq!(engine.record("9").await.unwrap(), before);
    }

    #[tokio::test]
    async fn blank_capture_keeps_waiting() {
        let (_dir, engine) = engine().await;
        engine.begin("9", FlowKind::RoleApplication, "1").await.unwrap();

        assert_eq!(
            engine.capture("9", "   ").await.unwrap(),
            CaptureOutcome::EmptyInput
        );
        assert!(engine.is_awaiting("9").await);
    }

    #[tokio::test]
    async fn capture_without_pending_flow_is_ignored() {
        let (_dir, engine) = engine().await;
        assert_eq!(
            engine.capture("9", "Steve123").await.unwrap(),
            CaptureOutcome::NotAwaiting
        );
        assert!(engine.record("9").await.is_none());
    }

    #[tokio::test]
    async fn begin_with_value_completes_in_one_step() {
        let (_dir, engine) = engine().await;
        let outcome = engine
            .begin_with_value("9", FlowKind::KnownPolls, "1", " Notch ")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BeginOutcome::CompletedDirectly {
                flow: FlowKind::KnownPolls,
                value: "Notch".to_string()
            }
        );
        assert_eq!(engine.record("9").await.unwrap().step, FlowStep::Completed);
    }

    #[tokio::test]
    async fn first_concurrent_capture_wins() {
        let (_dir, engine) = engine().await;
        engine.begin("9", FlowKind::KnownPolls, "1").await.unwrap();

        let (first, second) = tokio::join!(
            engine.capture("9", "Steve123"),
            engine.capture("9", "Alex")
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(matches!(first, CaptureOutcome::Captured { .. }));
        assert_eq!(second, CaptureOutcome::NotAwaiting);
        assert_eq!(
            engine.record("9").await.unwrap().captured_value.as_deref(),
            Some("Steve123")
        );
    }
}
