/// MCP server for symptom routing and visit preparation.
///
/// Department routing is always local and deterministic. The guidance service only supplies
/// urgency, checklist and explanation, and any failure there degrades to a safe default.
use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::{debug, info};

use carenav_common::department::explain_department;
use carenav_common::guidance::GuidancePolicy;
use carenav_common::language::Language;
use carenav_common::mcp_api::{
    AnalyzeSymptomsResponse, ClassifyDepartmentParams, ClassifyDepartmentResponse,
    ClearReportsResponse, DeleteReportResponse, GuidanceParams, GuidanceResponse,
    LanguageInfo, ListLanguagesResponse, ListReportsParams, ListReportsResponse, ReportIdParams,
};
use carenav_common::report::Report;

use crate::history::ReportHistory;
use crate::rate_limit::RateLimiter;

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct CareNavServer {
    policy: GuidancePolicy,
    history: ReportHistory,
    limiter: Option<RateLimiter>,
    tool_router: ToolRouter<CareNavServer>,
}

impl CareNavServer {
    pub fn new(
        policy: GuidancePolicy,
        history: ReportHistory,
        limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            policy,
            history,
            limiter,
            tool_router: Self::tool_router(),
        }
    }

    async fn gate(&self) -> Result<(), String> {
        if let Some(limiter) = &self.limiter {
            limiter.check().await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Validate input, classify locally, then ask for guidance. Returns the symptom text as
    /// entered alongside the response.
    async fn run_guidance(&self, params: GuidanceParams) -> Result<(String, GuidanceResponse), String> {
        let symptoms = params.symptoms.trim();
        if symptoms.is_empty() {
            return Err("symptoms must not be empty".to_string());
        }
        let language = parse_language(params.language.as_deref())?;

        self.gate().await?;

        let route = explain_department(symptoms);
        debug!(
            department = route.department,
            matched_keyword = route.matched_keyword,
            "symptoms classified"
        );

        let guidance = self
            .policy
            .get_guidance(symptoms, route.department, language)
            .await;
        let urgency_label = guidance.urgency.label().to_string();
        Ok((
            params.symptoms,
            GuidanceResponse {
                guidance,
                urgency_label,
            },
        ))
    }
}

fn parse_language(raw: Option<&str>) -> Result<Language, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Language::default()),
        Some(code) => code.parse::<Language>().map_err(|e| {
            format!("{e}. Supported codes: {}", Language::supported_codes())
        }),
    }
}

#[tool_router]
impl CareNavServer {
    #[tool(description = "Route a free-text symptom description to a medical department using fixed keyword rules. Deterministic; no network call.")]
    async fn classify_department(
        &self,
        Parameters(params): Parameters<ClassifyDepartmentParams>,
    ) -> Result<Json<ClassifyDepartmentResponse>, String> {
        let route = explain_department(&params.symptoms);
        Ok(Json(ClassifyDepartmentResponse {
            department: route.department.to_string(),
            matched_keyword: route.matched_keyword.map(str::to_string),
        }))
    }

    #[tool(description = "Classify symptoms and get urgency (Green/Yellow/Red), a visit preparation checklist and a short explanation in the requested language. Does not save a report.")]
    async fn get_guidance(
        &self,
        Parameters(params): Parameters<GuidanceParams>,
    ) -> Result<Json<GuidanceResponse>, String> {
        let (_, response) = self.run_guidance(params).await?;
        Ok(Json(response))
    }

    #[tool(description = "Full analysis: classify symptoms, get guidance, and save the result as a report in history. Returns the report and whether it was saved.")]
    async fn analyze_symptoms(
        &self,
        Parameters(params): Parameters<GuidanceParams>,
    ) -> Result<Json<AnalyzeSymptomsResponse>, String> {
        let (symptoms, response) = self.run_guidance(params).await?;
        let report = Report::new(&symptoms, response.guidance);

        let saved = self
            .history
            .save(report.clone())
            .await
            .map_err(|e| format!("analysis complete but history is unusable: {e}"))?;
        info!(
            report_id = %report.id,
            department = %report.guidance.department,
            urgency = %report.guidance.urgency,
            saved,
            "analysis complete"
        );

        Ok(Json(AnalyzeSymptomsResponse {
            report,
            urgency_label: response.urgency_label,
            saved,
        }))
    }

    #[tool(description = "List saved reports, newest first.")]
    async fn list_reports(
        &self,
        Parameters(params): Parameters<ListReportsParams>,
    ) -> Result<Json<ListReportsResponse>, String> {
        let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT) as usize;
        let reports = self
            .history
            .list(limit)
            .await
            .map_err(|e| format!("list_reports failed: {e}"))?;
        Ok(Json(ListReportsResponse { reports }))
    }

    #[tool(description = "Get one saved report by ID.")]
    async fn get_report(
        &self,
        Parameters(params): Parameters<ReportIdParams>,
    ) -> Result<Json<Report>, String> {
        let report_id = params.report_id.trim();
        if report_id.is_empty() {
            return Err("report_id must not be empty".to_string());
        }
        let report = self
            .history
            .get(report_id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(report))
    }

    #[tool(description = "Delete one saved report by ID.")]
    async fn delete_report(
        &self,
        Parameters(params): Parameters<ReportIdParams>,
    ) -> Result<Json<DeleteReportResponse>, String> {
        let report_id = params.report_id.trim();
        if report_id.is_empty() {
            return Err("report_id must not be empty".to_string());
        }
        let deleted = self
            .history
            .delete(report_id)
            .await
            .map_err(|e| format!("delete_report failed: {e}"))?;
        if deleted {
            info!(report_id, "report removed");
        }
        Ok(Json(DeleteReportResponse { deleted }))
    }

    #[tool(description = "Delete every saved report.")]
    async fn clear_reports(&self) -> Result<Json<ClearReportsResponse>, String> {
        let cleared = self
            .history
            .clear()
            .await
            .map_err(|e| format!("clear_reports failed: {e}"))?;
        info!(cleared, "report history cleared");
        Ok(Json(ClearReportsResponse { cleared }))
    }

    #[tool(description = "List the languages guidance can be requested in.")]
    async fn list_languages(&self) -> Result<Json<ListLanguagesResponse>, String> {
        Ok(Json(ListLanguagesResponse {
            languages: Language::ALL.into_iter().map(LanguageInfo::from).collect(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for CareNavServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "carenav".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "CareNav visit preparation server. Use analyze_symptoms to route symptoms to a \
department, get urgency and a preparation checklist, and save a report. get_guidance does the \
same without saving; classify_department only routes. Reports can be browsed with \
list_reports/get_report and removed with delete_report/clear_reports. This is not a diagnosis."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use carenav_common::guidance::{
        CollaboratorError, GuidanceCollaborator, GuidanceRequest, FALLBACK_EXPLANATION,
    };
    use carenav_common::urgency::UrgencyLevel;

    use super::*;

    struct FixedReply {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl GuidanceCollaborator for FixedReply {
        fn generate<'a>(
            &'a self,
            _request: &'a GuidanceRequest,
        ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply;
            Box::pin(async move {
                reply
                    .map(str::to_string)
                    .ok_or_else(|| CollaboratorError::Unavailable("offline".to_string()))
            })
        }
    }

    fn server_with(reply: Option<&'static str>, limiter: Option<RateLimiter>) -> (CareNavServer, Arc<FixedReply>) {
        let collaborator = Arc::new(FixedReply {
            reply,
            calls: AtomicUsize::new(0),
        });
        let server = CareNavServer::new(
            GuidancePolicy::new(collaborator.clone()),
            ReportHistory::in_memory(),
            limiter,
        );
        (server, collaborator)
    }

    fn params(symptoms: &str, language: Option<&str>) -> Parameters<GuidanceParams> {
        Parameters(GuidanceParams {
            symptoms: symptoms.to_string(),
            language: language.map(str::to_string),
        })
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = CareNavServer::tool_router().list_all();
        for name in [
            "classify_department",
            "get_guidance",
            "analyze_symptoms",
            "list_reports",
            "get_report",
            "delete_report",
            "clear_reports",
            "list_languages",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn test_classify_department_tool() {
        let (server, collaborator) = server_with(None, None);
        let Json(resp) = server
            .classify_department(Parameters(ClassifyDepartmentParams {
                symptoms: "Chest pain and headache".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(resp.department, "Cardiology");
        assert_eq!(resp.matched_keyword.as_deref(), Some("chest pain"));
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_with_unreachable_service_saves_fallback() {
        let (server, _) = server_with(None, None);
        let Json(resp) = server
            .analyze_symptoms(params("  severe chest pain and shortness of breath ", None))
            .await
            .unwrap();
        assert!(resp.saved);
        assert_eq!(resp.report.symptoms, "  severe chest pain and shortness of breath ");
        assert_eq!(resp.report.guidance.urgency, UrgencyLevel::Yellow);
        assert_eq!(resp.report.guidance.department, "Cardiology");
        assert_eq!(resp.report.guidance.explanation, FALLBACK_EXPLANATION);
        assert_eq!(resp.urgency_label, "Clinic visit recommended");

        let Json(listed) = server
            .list_reports(Parameters(ListReportsParams { limit: None }))
            .await
            .unwrap();
        assert_eq!(listed.reports, vec![resp.report]);
    }

    #[tokio::test]
    async fn test_guidance_does_not_save() {
        let (server, _) = server_with(
            Some(r#"{"urgency":"Green","checklist":["Rest"],"explanation":"Mild."}"#),
            None,
        );
        let Json(resp) = server
            .get_guidance(params("runny nose", Some("hi")))
            .await
            .unwrap();
        assert_eq!(resp.guidance.urgency, UrgencyLevel::Green);
        assert_eq!(resp.guidance.department, "ENT / Pulmonology");
        assert_eq!(resp.guidance.checklist, vec!["Rest".to_string()]);

        let Json(listed) = server
            .list_reports(Parameters(ListReportsParams { limit: None }))
            .await
            .unwrap();
        assert!(listed.reports.is_empty());
    }

    #[tokio::test]
    async fn test_input_validation() {
        let (server, collaborator) = server_with(None, None);
        let err = server.analyze_symptoms(params("   ", None)).await.err().unwrap();
        assert_eq!(err, "symptoms must not be empty");

        let err = server
            .get_guidance(params("cough", Some("xx")))
            .await
            .err().unwrap();
        assert!(err.contains("unsupported language code: 'xx'"));
        assert!(err.contains("en, hi, es"));
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let (server, _) = server_with(Some("{}"), None);
        let Json(first) = server
            .analyze_symptoms(params("nausea", None))
            .await
            .unwrap();
        let Json(second) = server
            .analyze_symptoms(params("fever", None))
            .await
            .unwrap();

        let Json(found) = server
            .get_report(Parameters(ReportIdParams {
                report_id: first.report.id.clone(),
            }))
            .await
            .unwrap();
        assert_eq!(found.guidance.department, "Gastroenterology");

        let Json(deleted) = server
            .delete_report(Parameters(ReportIdParams {
                report_id: first.report.id.clone(),
            }))
            .await
            .unwrap();
        assert!(deleted.deleted);

        let err = server
            .get_report(Parameters(ReportIdParams {
                report_id: first.report.id.clone(),
            }))
            .await
            .err().unwrap();
        assert!(err.starts_with("report not found"));

        let Json(cleared) = server.clear_reports().await.unwrap();
        assert_eq!(cleared.cleared, 1);
        let Json(listed) = server
            .list_reports(Parameters(ListReportsParams { limit: Some(5) }))
            .await
            .unwrap();
        assert!(listed.reports.is_empty());
        assert_ne!(first.report.id, second.report.id);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_before_calling_service() {
        let (server, collaborator) = server_with(Some("{}"), RateLimiter::new(1));
        assert!(server.get_guidance(params("cough", None)).await.is_ok());
        let err = server.get_guidance(params("cough", None)).await.err().unwrap();
        assert!(err.starts_with("rate limit exceeded"));
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_languages() {
        let (server, _) = server_with(None, None);
        let Json(resp) = server.list_languages().await.unwrap();
        assert_eq!(resp.languages.len(), 14);
        assert_eq!(resp.languages[1].code, "hi");
        assert_eq!(resp.languages[1].speech_locale, "hi-IN");
    }
}
