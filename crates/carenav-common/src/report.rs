use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CommonError;
use crate::guidance::GuidanceResult;

static REPORT_COUNTER: AtomicU64 = AtomicU64::new(0);

pub type ReportId = String;

/// A completed analysis as kept in history.
///
/// Stored as a flat record: `id`, `symptoms` and every [`GuidanceResult`] field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub id: ReportId,
    /// The symptom text exactly as the user entered it.
    pub symptoms: String,
    #[serde(flatten)]
    pub guidance: GuidanceResult,
}

impl Report {
    pub fn new(symptoms: &str, guidance: GuidanceResult) -> Self {
        Self {
            id: new_report_id(),
            symptoms: symptoms.to_string(),
            guidance,
        }
    }
}

/// Decode a stored history list. An absent record is an empty history.
pub fn decode_history(raw: Option<&str>) -> Result<Vec<Report>, CommonError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Vec::new()),
    }
}

pub fn encode_history(reports: &[Report]) -> Result<String, CommonError> {
    Ok(serde_json::to_string(reports)?)
}

fn new_report_id() -> ReportId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let counter = REPORT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(pid.to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
