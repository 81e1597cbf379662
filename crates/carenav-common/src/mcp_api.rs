use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::guidance::GuidanceResult;
use crate::language::Language;
use crate::report::Report;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClassifyDepartmentParams {
    /// Free-text symptom description.
    pub symptoms: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GuidanceParams {
    /// Free-text symptom description. Must not be blank.
    pub symptoms: String,
    /// Two-letter language code such as "en" or "hi" (default: "en").
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListReportsParams {
    /// Maximum number of reports to return, newest first (default: 20, max: 100).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReportIdParams {
    /// ID returned by analyze_symptoms.
    pub report_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassifyDepartmentResponse {
    pub department: String,
    /// Keyword that selected the department; absent when the default was used.
    pub matched_keyword: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidanceResponse {
    #[serde(flatten)]
    pub guidance: GuidanceResult,
    /// Human-readable meaning of the urgency level.
    pub urgency_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeSymptomsResponse {
    pub report: Report,
    pub urgency_label: String,
    /// False when the report could not be written to history.
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListReportsResponse {
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteReportResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearReportsResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub label: String,
    pub speech_locale: String,
}

impl From<Language> for LanguageInfo {
    fn from(lang: Language) -> Self {
        Self {
            code: lang.code().to_string(),
            name: lang.name().to_string(),
            label: lang.native_label().to_string(),
            speech_locale: lang.speech_locale().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListLanguagesResponse {
    pub languages: Vec<LanguageInfo>,
}
