/// Visit guidance with a fixed safe fallback.
///
/// The guidance service is treated as unreliable. Its reply is advisory: every field is
/// validated and defaulted here, and any failure to obtain a usable reply resolves to a
/// moderate-urgency result instead of an error.
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::language::Language;
use crate::llm::LlmClientError;
use crate::urgency::{parse_urgency, UrgencyLevel};

/// Checklist used when a successful reply carries no usable checklist.
pub const DEFAULT_CHECKLIST: [&str; 2] =
    ["Bring your government ID", "Carry existing medical reports"];

/// Explanation used when a successful reply carries no usable explanation.
pub const DEFAULT_EXPLANATION: &str =
    "Please consult a healthcare professional for further advice.";

/// Checklist returned when the guidance service could not be used at all.
pub const FALLBACK_CHECKLIST: [&str; 2] = ["Bring your ID card", "Note down when symptoms started"];

/// Explanation returned when the guidance service could not be used at all.
pub const FALLBACK_EXPLANATION: &str = "We're having trouble connecting to the AI, but a clinic visit is generally a safe next step for your symptoms.";

/// Validated guidance for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GuidanceResult {
    pub urgency: UrgencyLevel,
    /// Always the locally classified department.
    pub department: String,
    /// Ordered preparation steps. Never empty.
    pub checklist: Vec<String>,
    /// Never empty.
    pub explanation: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl GuidanceResult {
    /// Result used whenever the guidance service fails, times out or replies with garbage.
    pub fn fallback(department: &str, timestamp: i64) -> Self {
        Self {
            urgency: UrgencyLevel::Yellow,
            department: department.to_string(),
            checklist: FALLBACK_CHECKLIST.iter().map(|s| s.to_string()).collect(),
            explanation: FALLBACK_EXPLANATION.to_string(),
            timestamp,
        }
    }

    fn from_payload(payload: GuidancePayload, department: &str, timestamp: i64) -> Self {
        let checklist = match payload.checklist {
            Some(items) if !items.is_empty() => items,
            _ => DEFAULT_CHECKLIST.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            urgency: parse_urgency(payload.urgency.as_deref()),
            department: department.to_string(),
            checklist,
            explanation: payload
                .explanation
                .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
            timestamp,
        }
    }
}

/// What the guidance service is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceRequest {
    pub symptoms: String,
    /// Context only. The service's answer never changes the department.
    pub department: String,
    pub language: Language,
}

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Llm(#[from] LlmClientError),

    #[error("guidance service did not answer within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The collaborator cannot make a call at all, e.g. no API key is configured.
    #[error("guidance service unavailable: {0}")]
    Unavailable(String),

    #[error("unparseable guidance payload: {0}")]
    Malformed(String),
}

/// External text generator that turns a [`GuidanceRequest`] into a JSON reply of the form
/// `{"urgency": "...", "checklist": ["..."], "explanation": "..."}`.
///
/// The reply schema is advisory; [`GuidancePolicy`] validates every field.
pub trait GuidanceCollaborator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GuidanceRequest,
    ) -> BoxFuture<'a, Result<String, CollaboratorError>>;
}

/// Fields extracted from a reply, already stripped of blank and non-string values.
#[derive(Debug, Default, PartialEq)]
struct GuidancePayload {
    urgency: Option<String>,
    checklist: Option<Vec<String>>,
    explanation: Option<String>,
}

/// Extract the advisory fields from raw reply text.
///
/// Empty text is read as an empty object. Anything that is not a JSON object is malformed.
fn parse_payload(raw: &str) -> Result<GuidancePayload, CollaboratorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(GuidancePayload::default());
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(CollaboratorError::Malformed(
            "expected a JSON object".to_string(),
        ));
    };

    let urgency = map
        .get("urgency")
        .and_then(Value::as_str)
        .map(str::to_string);

    let checklist = map.get("checklist").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let explanation = map
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(GuidancePayload {
        urgency,
        checklist,
        explanation,
    })
}

/// Wraps one guidance service call per request and guarantees a valid result.
#[derive(Clone)]
pub struct GuidancePolicy {
    collaborator: Arc<dyn GuidanceCollaborator>,
    deadline: Option<Duration>,
}

impl GuidancePolicy {
    pub fn new(collaborator: Arc<dyn GuidanceCollaborator>) -> Self {
        Self {
            collaborator,
            deadline: None,
        }
    }

    /// Give up on the guidance service after `deadline` and use the fallback result.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Obtain guidance for already classified symptoms. Never fails.
    pub async fn get_guidance(
        &self,
        symptoms: &str,
        department: &str,
        language: Language,
    ) -> GuidanceResult {
        let request = GuidanceRequest {
            symptoms: symptoms.to_string(),
            department: department.to_string(),
            language,
        };

        match self.request_payload(&request).await {
            Ok(payload) => {
                debug!(department, language = %language, "guidance received");
                GuidanceResult::from_payload(payload, department, now_millis())
            }
            Err(e) => {
                warn!(error = %e, department, "guidance unavailable, using fallback");
                GuidanceResult::fallback(department, now_millis())
            }
        }
    }

    async fn request_payload(
        &self,
        request: &GuidanceRequest,
    ) -> Result<GuidancePayload, CollaboratorError> {
        let call = self.collaborator.generate(request);
        let raw = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| CollaboratorError::Timeout(deadline))??,
            None => call.await?,
        };
        parse_payload(&raw)
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct StubCollaborator {
        reply: Reply,
        calls: AtomicUsize,
        last_request: Mutex<Option<GuidanceRequest>>,
    }

    impl StubCollaborator {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }
    }

    impl GuidanceCollaborator for StubCollaborator {
        fn generate<'a>(
            &'a self,
            request: &'a GuidanceRequest,
        ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let reply = self.reply.clone();
            Box::pin(async move {
                match reply {
                    Reply::Text(text) => Ok(text.to_string()),
                    Reply::Fail => Err(CollaboratorError::Unavailable("connection refused".into())),
                    Reply::Hang => futures::future::pending().await,
                }
            })
        }
    }

    async fn guidance_for(reply: Reply, department: &str) -> (GuidanceResult, Arc<StubCollaborator>) {
        let stub = StubCollaborator::new(reply);
        let policy = GuidancePolicy::new(stub.clone()).with_deadline(Duration::from_millis(50));
        let result = policy
            .get_guidance("severe chest pain", department, Language::English)
            .await;
        (result, stub)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_valid_reply_is_used() {
        let (result, stub) = guidance_for(
            Reply::Text(r#"{"urgency":"Red","checklist":["Bring ECG results"],"explanation":"Go now."}"#),
            "Cardiology",
        )
        .await;
        assert_eq!(result.urgency, UrgencyLevel::Red);
        assert_eq!(result.department, "Cardiology");
        assert_eq!(result.checklist, strings(&["Bring ECG results"]));
        assert_eq!(result.explanation, "Go now.");
        assert!(result.timestamp > 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_carries_context() {
        let stub = StubCollaborator::new(Reply::Text("{}"));
        let policy = GuidancePolicy::new(stub.clone());
        policy
            .get_guidance("runny nose", "ENT / Pulmonology", Language::French)
            .await;
        let seen = stub.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(
            seen,
            GuidanceRequest {
                symptoms: "runny nose".to_string(),
                department: "ENT / Pulmonology".to_string(),
                language: Language::French,
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_urgency_resolves_to_green() {
        let (result, _) = guidance_for(
            Reply::Text(r#"{"urgency":"Purple","checklist":["a"],"explanation":"b"}"#),
            "Neurology",
        )
        .await;
        assert_eq!(result.urgency, UrgencyLevel::Green);

        let (result, _) =
            guidance_for(Reply::Text(r#"{"checklist":["a"],"explanation":"b"}"#), "Neurology").await;
        assert_eq!(result.urgency, UrgencyLevel::Green);

        let (result, _) = guidance_for(Reply::Text(r#"{"urgency":3}"#), "Neurology").await;
        assert_eq!(result.urgency, UrgencyLevel::Green);
    }

    #[tokio::test]
    async fn test_missing_fields_get_defaults() {
        let (result, _) =
            guidance_for(Reply::Text(r#"{"urgency":"Yellow","checklist":[]}"#), "Neurology").await;
        assert_eq!(result.urgency, UrgencyLevel::Yellow);
        assert_eq!(result.checklist, strings(&DEFAULT_CHECKLIST));
        assert_eq!(result.explanation, DEFAULT_EXPLANATION);
    }

    #[tokio::test]
    async fn test_blank_entries_are_dropped() {
        let (result, _) = guidance_for(
            Reply::Text(r#"{"checklist":["  ", 4, " Bring ID "],"explanation":"   "}"#),
            "Neurology",
        )
        .await;
        assert_eq!(result.checklist, strings(&["Bring ID"]));
        assert_eq!(result.explanation, DEFAULT_EXPLANATION);
    }

    #[tokio::test]
    async fn test_empty_reply_reads_as_empty_object() {
        let (result, _) = guidance_for(Reply::Text("  "), "Gastroenterology").await;
        assert_eq!(result.urgency, UrgencyLevel::Green);
        assert_eq!(result.checklist, strings(&DEFAULT_CHECKLIST));
    }

    #[tokio::test]
    async fn test_reply_cannot_change_department() {
        let (result, _) = guidance_for(
            Reply::Text(r#"{"urgency":"Green","department":"Dermatology","checklist":["x"],"explanation":"y"}"#),
            "Cardiology",
        )
        .await;
        assert_eq!(result.department, "Cardiology");
    }

    #[tokio::test]
    async fn test_failure_uses_fallback() {
        let (result, stub) = guidance_for(Reply::Fail, "Cardiology").await;
        assert_eq!(
            result,
            GuidanceResult {
                timestamp: result.timestamp,
                ..GuidanceResult::fallback("Cardiology", 0)
            }
        );
        assert_eq!(result.urgency, UrgencyLevel::Yellow);
        assert_eq!(result.checklist, strings(&FALLBACK_CHECKLIST));
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_uses_fallback() {
        let (result, _) = guidance_for(Reply::Hang, "Neurology").await;
        assert_eq!(result.urgency, UrgencyLevel::Yellow);
        assert_eq!(result.department, "Neurology");
    }

    #[tokio::test]
    async fn test_unparseable_reply_uses_fallback() {
        for raw in ["not json", "[1, 2]", "null", "\"Red\""] {
            let stub = StubCollaborator::new(Reply::Text(raw));
            let result = GuidancePolicy::new(stub)
                .get_guidance("cough", "ENT / Pulmonology", Language::English)
                .await;
            assert_eq!(result.urgency, UrgencyLevel::Yellow, "reply {raw:?}");
            assert_eq!(result.checklist, strings(&FALLBACK_CHECKLIST));
        }
    }

    #[test]
    fn test_parse_payload_fields() {
        let payload =
            parse_payload(r#"{"urgency":"Red","checklist":["a","b"],"explanation":"c"}"#).unwrap();
        assert_eq!(
            payload,
            GuidancePayload {
                urgency: Some("Red".to_string()),
                checklist: Some(strings(&["a", "b"])),
                explanation: Some("c".to_string()),
            }
        );
        assert!(matches!(
            parse_payload("{"),
            Err(CollaboratorError::Malformed(_))
        ));
    }
}
