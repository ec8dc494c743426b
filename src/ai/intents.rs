//! Intent classification on top of the completion service.
//!
//! The model only labels messages; it never decides outcomes. Every failure
//! path (transport, timeout, schema) collapses to `Intent::Irrelevant`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::ai::{CompletionRequest, CompletionService};
use crate::error::{CompletionError, DecodeError};
use crate::tickets::{FlowKind, TicketRecord};

/// Classifier-driven actions need at least this much confidence.
pub const MIN_ACTION_CONFIDENCE: f64 = 0.6;

const CLASSIFIER_TEMPERATURE: f32 = 0.0;

/// Cap on message text sent to the model.
const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Thanks,
    KnownPollsRequest,
    ClanRegistration,
    RoleApplication,
    ClientToolbox,
    Irrelevant,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Greeting,
        Intent::Thanks,
        Intent::KnownPollsRequest,
        Intent::ClanRegistration,
        Intent::RoleApplication,
        Intent::ClientToolbox,
        Intent::Irrelevant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::Thanks => "THANKS",
            Self::KnownPollsRequest => "KNOWN_POLLS_REQUEST",
            Self::ClanRegistration => "CLAN_REGISTRATION",
            Self::RoleApplication => "ROLE_APPLICATION",
            Self::ClientToolbox => "CLIENT_TOOLBOX",
            Self::Irrelevant => "IRRELEVANT",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|intent| intent.label() == label)
    }

    /// The ticket-only flow this intent asks for, if any.
    pub fn ticket_flow(&self) -> Option<FlowKind> {
        match self {
            Self::KnownPollsRequest => Some(FlowKind::KnownPolls),
            Self::ClanRegistration => Some(FlowKind::ClanRegistration),
            Self::RoleApplication => Some(FlowKind::RoleApplication),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub extracted_field: Option<String>,
}

impl Classification {
    pub fn neutral() -> Self {
        Self {
            intent: Intent::Irrelevant,
            confidence: 0.0,
            extracted_field: None,
        }
    }

    /// The intent to act on, or `Irrelevant` when confidence is too low.
    pub fn actionable_intent(&self) -> Intent {
        if self.confidence >= MIN_ACTION_CONFIDENCE {
            self.intent
        } else {
            Intent::Irrelevant
        }
    }
}

/// What the classifier is told about the channel.
#[derive(Debug, Clone, Default)]
pub struct ClassifierContext {
    pub is_ticket: bool,
    pub ticket: Option<TicketRecord>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    confidence: Option<f64>,
    #[serde(default)]
    field: Option<String>,
}

/// Decodes model output: a strict JSON object, or a single bare label.
pub fn decode_classification(raw: &str) -> Result<Classification, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some(object) = extract_json_object(trimmed) {
        let parsed: RawClassification =
            serde_json::from_str(object).map_err(|e| DecodeError::Json(e.to_string()))?;
        let intent = Intent::from_label(&parsed.intent)
            .ok_or_else(|| DecodeError::UnknownLabel(parsed.intent.clone()))?;
        let confidence = parsed
            .confidence
            .ok_or_else(|| DecodeError::Json("missing field `confidence`".to_string()))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DecodeError::ConfidenceOutOfRange(confidence));
        }
        let extracted_field = parsed
            .field
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        return Ok(Classification {
            intent,
            confidence,
            extracted_field,
        });
    }

    let label = trimmed.trim_end_matches(['.', '!']);
    if label.contains(char::is_whitespace) {
        return Err(DecodeError::Unrecognized(preview(trimmed)));
    }
    let intent = Intent::from_label(label).ok_or_else(|| DecodeError::UnknownLabel(preview(label)))?;
    Ok(Classification {
        intent,
        confidence: 1.0,
        extracted_field: None,
    })
}

/// Finds a JSON object in model output, bare or inside a markdown fence.
fn extract_json_object(text: &str) -> Option<&str> {
    if text.starts_with('{') {
        return Some(text);
    }
    if text.starts_with("```") {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end > start {
            return Some(&text[start..=end]);
        }
    }
    None
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

fn system_instruction() -> String {
    let labels = Intent::ALL
        .iter()
        .map(Intent::label)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are the intent classifier for the SMH Hackers Discord server, a Minecraft community.\n\
         You never answer the user. You only label their message.\n\n\
         Possible intents:\n{labels}\n\n\
         KNOWN_POLLS_REQUEST: wants their Minecraft IGN added to the Known Polls list.\n\
         CLAN_REGISTRATION: wants to register a clan.\n\
         ROLE_APPLICATION: wants the YouTube/content creator role.\n\
         CLIENT_TOOLBOX: asks where to find a client or proxy download.\n\
         IRRELEVANT: anything else.\n\n\
         Respond with ONLY a JSON object, no prose:\n\
         {{\"intent\": \"<LABEL>\", \"confidence\": <0.0-1.0>, \"field\": <string or null>}}\n\
         Set \"field\" to the Minecraft IGN, clan name, or channel link only if the message states it explicitly."
    )
}

fn user_content(message: &str, context: &ClassifierContext) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(if context.is_ticket {
        "Channel: private ticket\n"
    } else {
        "Channel: public\n"
    });
    match &context.ticket {
        Some(record) => {
            let flow = record.flow.map(|f| f.display_name()).unwrap_or("none");
            prompt.push_str(&format!("Ticket flow: {flow} ({:?})\n", record.step));
        }
        None => prompt.push_str("Ticket flow: none\n"),
    }
    let text: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    prompt.push_str(&format!("\nMessage:\n\"{text}\""));
    prompt
}

pub struct IntentClassifier {
    service: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(service: Arc<dyn CompletionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Classifies `message`. Never fails; problems yield the neutral intent.
    pub async fn classify(&self, message: &str, context: &ClassifierContext) -> Classification {
        let request = CompletionRequest {
            system_instruction: system_instruction(),
            user_content: user_content(message, context),
            temperature: CLASSIFIER_TEMPERATURE,
        };

        let raw = match tokio::time::timeout(self.timeout, self.service.complete(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "Classifier call failed, using neutral intent");
                return Classification::neutral();
            }
            Err(_) => {
                let e = CompletionError::Timeout(self.timeout);
                warn!(error = %e, "Classifier call failed, using neutral intent");
                return Classification::neutral();
            }
        };

        match decode_classification(&raw) {
            Ok(classification) => {
                debug!(
                    intent = classification.intent.label(),
                    confidence = classification.confidence,
                    "Message classified"
                );
                classification
            }
            Err(e) => {
                warn!(error = %e, raw = %preview(&raw), "Unusable classifier output, using neutral intent");
                Classification::neutral()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serenity::async_trait;
    use std::sync::Mutex;

    /// Returns canned responses and records every request.
    pub(crate) struct ScriptedService {
        responses: Mutex<Vec<Result<String, CompletionError>>>,
        pub(crate) requests: Mutex<Vec<CompletionRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedService {
        pub(crate) fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub(crate) fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.requests.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok("IRRELEVANT".to_string())
            } else {
                responses.remove(0)
            }
        }
    }

    fn classifier(service: ScriptedService) -> IntentClassifier {
        IntentClassifier::new(Arc::new(service), Duration::from_secs(10))
    }

    #[test]
    fn decodes_strict_json() {
        let c = decode_classification(
            r#"{"intent": "KNOWN_POLLS_REQUEST", "confidence": 0.92, "field": "Steve123"}"#,
        )
        .unwrap();
        assert_eq!(c.intent, Intent::KnownPollsRequest);
        assert_eq!(c.confidence, 0.92);
        assert_eq!(c.extracted_field.as_deref(), Some("Steve123"));
    }

    #[test]
    fn decodes_fenced_json() {
        let raw = "```json\n{\"intent\": \"CLIENT_TOOLBOX\", \"confidence\": 0.7, \"field\": null}\n```";
        let c = decode_classification(raw).unwrap();
        assert_eq!(c.intent, Intent::ClientToolbox);
        assert_eq!(c.extracted_field, None);
    }

    #[test]
    fn decodes_bare_label() {
        let c = decode_classification(" clan_registration\n").unwrap();
        assert_eq!(c.intent, Intent::ClanRegistration);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn rejects_malformed_output() {
        assert_eq!(decode_classification(""), Err(DecodeError::Empty));
        assert!(matches!(
            decode_classification("not json"),
            Err(DecodeError::Unrecognized(_))
        ));
        assert!(matches!(
            decode_classification("BANANA"),
            Err(DecodeError::UnknownLabel(_))
        ));
        assert!(matches!(
            decode_classification(r#"{"intent": "THANKS""#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_classification(r#"{"intent": "THANKS"}"#),
            Err(DecodeError::Json(_))
        ));
        assert_eq!(
            decode_classification(r#"{"intent": "THANKS", "confidence": 1.5}"#),
            Err(DecodeError::ConfidenceOutOfRange(1.5))
        );
    }

    #[test]
    fn low_confidence_is_not_actionable() {
        let c = Classification {
            intent: Intent::KnownPollsRequest,
            confidence: 0.59,
            extracted_field: None,
        };
        assert_eq!(c.actionable_intent(), Intent::Irrelevant);
        let c = Classification {
            confidence: 0.6,
            ..c
        };
        assert_eq!(c.actionable_intent(), Intent::KnownPollsRequest);
    }

    #[tokio::test]
    async fn malformed_output_is_neutral() {
        let c = classifier(ScriptedService::replying("not json"))
            .classify("hello?", &ClassifierContext::default())
            .await;
        assert_eq!(c, Classification::neutral());
    }

    #[tokio::test]
    async fn service_error_is_neutral() {
        let service = ScriptedService::new(vec![Err(CompletionError::Status {
            status: 500,
            body: "boom".to_string(),
        })]);
        let c = classifier(service)
            .classify("hello?", &ClassifierContext::default())
            .await;
        assert_eq!(c, Classification::neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_neutral() {
        let service = ScriptedService::replying("KNOWN_POLLS_REQUEST").delayed(Duration::from_secs(30));
        let c = IntentClassifier::new(Arc::new(service), Duration::from_secs(10))
            .classify("add me to kp", &ClassifierContext::default())
            .await;
        assert_eq!(c, Classification::neutral());
    }

    #[tokio::test]
    async fn sends_context_and_zero_temperature() {
        let service = Arc::new(ScriptedService::replying("IRRELEVANT"));
        let classifier = IntentClassifier::new(service.clone(), Duration::from_secs(10));
        let context = ClassifierContext {
            is_ticket: true,
            ticket: None,
        };
        classifier.classify("where is saber", &context).await;

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.0);
        assert!(requests[0].system_instruction.contains("KNOWN_POLLS_REQUEST"));
        assert!(requests[0].user_content.contains("Channel: private ticket"));
        assert!(requests[0].user_content.contains("where is saber"));
    }
}
