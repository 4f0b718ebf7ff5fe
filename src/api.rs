//! HTTP surface for the DCE assistant.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /uploads` – List the caller's uploaded PDFs with page counts and hashes.
//! - `PUT /uploads/:filename` – Store a raw PDF body in the caller's session (overwrite by name).
//! - `DELETE /uploads/:filename` – Remove an upload from the session and from disk.
//! - `POST /analyze` – Run extraction, LLM synthesis and PDF rendering over every upload.
//! - `GET /analysis` – Replay the caller's last successful analysis.
//! - `GET /_uploads/...` – Static access to session directories, including `resume_ia.pdf`.
//! - `GET /metrics` – Observe analysis counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Callers are identified by the `x-user-id` header (defaults to `"default"`). Mutating
//! endpoints answer with a `{ "message", "level" }` notice.

use crate::metrics::MetricsSnapshot;
use crate::processing::{
    AnalysisApi, AnalysisOutcome, DocumentReport, PipelineError, Prefill, SUMMARY_FILE_NAME,
    StructuredFields,
};
use crate::session::{DEFAULT_USER, SessionError, SessionStore, UploadedDocument};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Header carrying the caller identity.
pub const USER_HEADER: &str = "x-user-id";

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Shared handler state: the analysis service plus the session registry.
struct AppState<S> {
    service: Arc<S>,
    sessions: Arc<SessionStore>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

/// Build the HTTP router exposing uploads, analysis and the static summary mount.
pub fn create_router<S>(service: Arc<S>, sessions: Arc<SessionStore>) -> Router
where
    S: AnalysisApi + 'static,
{
    let uploads_root = sessions.root().to_path_buf();
    Router::new()
        .route("/uploads", get(list_uploads::<S>))
        .route(
            "/uploads/:filename",
            put(upload_document::<S>)
                .delete(delete_document::<S>)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/analyze", post(analyze::<S>))
        .route("/analysis", get(latest_analysis::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .nest_service("/_uploads", ServeDir::new(uploads_root))
        .with_state(AppState { service, sessions })
}

/// Notification levels shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Level {
    Positive,
    Warning,
    Negative,
}

/// Response body for mutating endpoints.
#[derive(Serialize)]
struct Notice {
    message: String,
    level: Level,
}

impl Notice {
    fn positive(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Level::Positive,
        }
    }
}

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

/// Response body for `GET /uploads`.
#[derive(Serialize)]
struct UploadsResponse {
    session_id: String,
    uploads: Vec<UploadedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_analysis: Option<String>,
}

/// List the caller's uploads.
async fn list_uploads<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<UploadsResponse>, AppError>
where
    S: AnalysisApi,
{
    let user = caller(&headers);
    let session = state.sessions.session(&user).await?;
    let uploads = state.sessions.uploads(&user).await;
    let last_analysis = state
        .sessions
        .last_outcome(&user)
        .await
        .map(|outcome| outcome.created_at);
    Ok(Json(UploadsResponse {
        session_id: session.id,
        uploads,
        last_analysis,
    }))
}

/// Response body for `PUT /uploads/:filename`.
#[derive(Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    notice: Notice,
    upload: UploadedDocument,
    replaced: bool,
}

/// Store a PDF in the caller's session.
async fn upload_document<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError>
where
    S: AnalysisApi,
{
    let user = caller(&headers);
    let (upload, replaced) = state
        .sessions
        .save_upload(&user, &filename, &body)
        .await
        .map_err(AppError::Upload)?;
    Ok(Json(UploadResponse {
        notice: Notice::positive("PDF importé (écrasé si existant)"),
        upload,
        replaced,
    }))
}

/// Remove an upload from the caller's session.
async fn delete_document<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Json<Notice>, AppError>
where
    S: AnalysisApi,
{
    let user = caller(&headers);
    state.sessions.delete_upload(&user, &filename).await?;
    Ok(Json(Notice::positive("Fichier supprimé")))
}

/// Analysis result as returned to the UI, with the summary PDF as a static URL.
#[derive(Serialize)]
struct AnalysisView {
    url: String,
    summary_markdown: String,
    fields: StructuredFields,
    prefill: Prefill,
    created_at: String,
    documents: Vec<DocumentReport>,
}

impl AnalysisView {
    fn new(session_id: &str, outcome: AnalysisOutcome) -> Self {
        let file_name = outcome
            .pdf_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(SUMMARY_FILE_NAME);
        Self {
            url: format!("/_uploads/{session_id}/{file_name}"),
            summary_markdown: outcome.summary_markdown,
            fields: outcome.fields,
            prefill: outcome.prefill,
            created_at: outcome.created_at,
            documents: outcome.documents,
        }
    }
}

/// Success response for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    notice: Notice,
    #[serde(flatten)]
    analysis: AnalysisView,
}

/// Run the analysis over every upload of the caller's session.
///
/// The run happens on a spawned task so the in-flight flag is always released, even when the
/// client goes away before the response is written.
async fn analyze<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<AnalyzeResponse>, AppError>
where
    S: AnalysisApi + 'static,
{
    let user = caller(&headers);
    let ticket = state.sessions.begin_analysis(&user).await?;
    let session_id = ticket.session.id.clone();
    tracing::info!(
        user,
        session = %session_id,
        documents = ticket.documents.len(),
        "Analysis requested"
    );

    let service = Arc::clone(&state.service);
    let sessions = Arc::clone(&state.sessions);
    let task_user = user.clone();
    let result = tokio::spawn(async move {
        let result = service
            .analyze(ticket.documents, ticket.session.dir.clone())
            .await;
        let remembered = result.as_ref().ok().cloned();
        sessions.end_analysis(&task_user, remembered).await;
        result
    })
    .await
    .map_err(|err| AppError::Analysis(PipelineError::Task(err)))?;

    let outcome = result.map_err(|err| {
        tracing::error!(user, session = %session_id, error = %err, "Analysis failed");
        AppError::Analysis(err)
    })?;
    Ok(Json(AnalyzeResponse {
        notice: Notice::positive("Analyse terminée. PDF généré."),
        analysis: AnalysisView::new(&session_id, outcome),
    }))
}

/// Return the caller's last successful analysis, or 404 when none has completed.
async fn latest_analysis<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<AnalysisView>, AppError>
where
    S: AnalysisApi,
{
    let user = caller(&headers);
    let session = state.sessions.session(&user).await?;
    let outcome = state
        .sessions
        .last_outcome(&user)
        .await
        .ok_or(AppError::NoAnalysis)?;
    Ok(Json(AnalysisView::new(&session.id, outcome)))
}

/// Return the analysis counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: AnalysisApi,
{
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "list_uploads",
                method: "GET",
                path: "/uploads",
                description: "List the PDFs uploaded in the caller's session with page counts.",
            },
            CommandDescriptor {
                name: "upload",
                method: "PUT",
                path: "/uploads/:filename",
                description: "Store the raw PDF request body; an upload with the same name is overwritten.",
            },
            CommandDescriptor {
                name: "delete_upload",
                method: "DELETE",
                path: "/uploads/:filename",
                description: "Remove an uploaded PDF from the session.",
            },
            CommandDescriptor {
                name: "analyze",
                method: "POST",
                path: "/analyze",
                description: "Extract text (OCR when needed), summarize every upload with the LLM and write resume_ia.pdf. Response returns { \"url\", \"summary_markdown\", \"fields\", \"prefill\", \"documents\" }.",
            },
            CommandDescriptor {
                name: "latest_analysis",
                method: "GET",
                path: "/analysis",
                description: "Return the last successful analysis of the session (same body as analyze, without the notice); 404 when none.",
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return analysis counters useful for observability dashboards.",
            },
        ],
    })
}

enum AppError {
    Session(SessionError),
    Upload(SessionError),
    Analysis(PipelineError),
    NoAnalysis,
}

impl AppError {
    fn status_and_notice(&self) -> (StatusCode, Notice) {
        match self {
            Self::Session(err) | Self::Upload(err) => {
                let (status, level) = match err {
                    SessionError::NotPdf(_) => (StatusCode::BAD_REQUEST, Level::Negative),
                    SessionError::NoUploads => (StatusCode::BAD_REQUEST, Level::Warning),
                    SessionError::NotFound(_) => (StatusCode::NOT_FOUND, Level::Warning),
                    SessionError::AnalysisInProgress => (StatusCode::CONFLICT, Level::Warning),
                    SessionError::Io { .. } | SessionError::Task(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, Level::Negative)
                    }
                };
                let message = match (self, err) {
                    (Self::Upload(_), SessionError::Io { .. } | SessionError::Task(_)) => {
                        format!("Erreur upload: {err}")
                    }
                    _ => err.to_string(),
                };
                (status, Notice { message, level })
            }
            Self::Analysis(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Notice {
                    message: format!("Erreur analyse: {err}"),
                    level: Level::Negative,
                },
            ),
            Self::NoAnalysis => (
                StatusCode::NOT_FOUND,
                Notice {
                    message: "Aucune analyse disponible".into(),
                    level: Level::Warning,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, notice) = self.status_and_notice();
        (status, Json(notice)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(inner: SessionError) -> Self {
        Self::Session(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::llm::LlmError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AnalysisApi, AnalysisOutcome, DocumentReport, PipelineError, Prefill, SourceDocument,
    };
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_analyze_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let analyze = commands
            .iter()
            .find(|cmd| cmd.name == "analyze")
            .expect("analyze command present");

        assert_eq!(analyze.method, "POST");
        assert_eq!(analyze.path, "/analyze");
        assert!(analyze.description.contains("resume_ia.pdf"));
        assert!(commands.len() >= 4);
    }

    #[tokio::test]
    async fn analyze_without_uploads_warns_and_skips_pipeline() {
        let fixture = Fixture::new(StubAnalysis::succeeding());

        let (status, json) = fixture.send(Method::POST, "/analyze", Body::empty()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Aucun PDF uploadé");
        assert_eq!(json["level"], "warning");
        assert!(fixture.service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn upload_then_list_reports_entry() {
        let fixture = Fixture::new(StubAnalysis::succeeding());

        let (status, json) = fixture
            .send(
                Method::PUT,
                "/uploads/RC%20lot%201.pdf",
                Body::from("%PDF-broken"),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "PDF importé (écrasé si existant)");
        assert_eq!(json["level"], "positive");
        assert_eq!(json["upload"]["filename"], "RC_lot_1.pdf");
        assert_eq!(json["replaced"], false);

        let (status, json) = fixture.send(Method::GET, "/uploads", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let uploads = json["uploads"].as_array().expect("uploads array");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0]["pages"], "n/a");
        assert_eq!(uploads[0]["size"], 11);
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf() {
        let fixture = Fixture::new(StubAnalysis::succeeding());

        let (status, json) = fixture
            .send(Method::PUT, "/uploads/notes.txt", Body::from("hello"))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Seuls les PDF sont acceptés");
        assert_eq!(json["level"], "negative");
    }

    #[tokio::test]
    async fn delete_reports_missing_file() {
        let fixture = Fixture::new(StubAnalysis::succeeding());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;

        let (status, json) = fixture
            .send(Method::DELETE, "/uploads/RC.pdf", Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Fichier supprimé");

        let (status, json) = fixture
            .send(Method::DELETE, "/uploads/RC.pdf", Body::empty())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Fichier déjà supprimé / introuvable");
    }

    #[tokio::test]
    async fn analyze_runs_pipeline_in_session_directory() {
        let fixture = Fixture::new(StubAnalysis::succeeding());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;
        fixture
            .send(Method::PUT, "/uploads/CCTP.pdf", Body::from("y"))
            .await;

        let (status, json) = fixture.send(Method::POST, "/analyze", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Analyse terminée. PDF généré.");
        let session = fixture.sessions.session("default").await.expect("session");
        assert_eq!(
            json["url"],
            format!("/_uploads/{}/resume_ia.pdf", session.id)
        );
        assert_eq!(json["summary_markdown"], "## 1. Identification du marché");
        assert_eq!(json["prefill"]["lot"], "Lot 02");

        let calls = fixture.service.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        let names: Vec<_> = calls[0].0.iter().map(|doc| doc.name.as_str()).collect();
        assert_eq!(names, ["RC.pdf", "CCTP.pdf"]);
        assert_eq!(calls[0].1, session.dir);

        let (_, json) = fixture.send(Method::GET, "/uploads", Body::empty()).await;
        assert_eq!(json["last_analysis"], "2024-05-01T10:00:00");
    }

    #[tokio::test]
    async fn latest_analysis_is_not_found_until_a_run_succeeds() {
        let fixture = Fixture::new(StubAnalysis::succeeding());

        let (status, json) = fixture.send(Method::GET, "/analysis", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Aucune analyse disponible");
        assert_eq!(json["level"], "warning");

        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;
        fixture.send(Method::POST, "/analyze", Body::empty()).await;

        let (status, json) = fixture.send(Method::GET, "/analysis", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let session = fixture.sessions.session("default").await.expect("session");
        assert_eq!(
            json["url"],
            format!("/_uploads/{}/resume_ia.pdf", session.id)
        );
        assert_eq!(json["summary_markdown"], "## 1. Identification du marché");
        assert_eq!(json["prefill"]["lot"], "Lot 02");
        assert_eq!(json["created_at"], "2024-05-01T10:00:00");
        assert_eq!(json["documents"][0]["name"], "RC.pdf");
        assert_eq!(json["documents"][0]["ocr_retries"], 1);
        assert!(json.get("message").is_none());
        assert_eq!(fixture.service.recorded_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_analysis() {
        let fixture = Fixture::new(StubAnalysis::failing());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;
        fixture.send(Method::POST, "/analyze", Body::empty()).await;

        let (status, _) = fixture.send(Method::GET, "/analysis", Body::empty()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analyze_failure_is_reported_and_releases_session() {
        let fixture = Fixture::new(StubAnalysis::failing());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;

        let (status, json) = fixture.send(Method::POST, "/analyze", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            json["message"]
                .as_str()
                .expect("message")
                .starts_with("Erreur analyse: ")
        );
        assert_eq!(json["level"], "negative");

        let (status, _) = fixture.send(Method::POST, "/analyze", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fixture.service.recorded_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_analysis_is_rejected() {
        let fixture = Fixture::new(StubAnalysis::succeeding());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;
        fixture
            .sessions
            .begin_analysis("default")
            .await
            .expect("first run");

        let (status, json) = fixture.send(Method::POST, "/analyze", Body::empty()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["message"], "Analyse déjà en cours");
        assert!(fixture.service.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_user_header() {
        let fixture = Fixture::new(StubAnalysis::succeeding());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("x"))
            .await;

        let response = fixture
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/uploads")
                    .header("x-user-id", "someone-else")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert!(json["uploads"].as_array().expect("uploads").is_empty());
    }

    #[tokio::test]
    async fn uploads_are_served_statically() {
        let fixture = Fixture::new(StubAnalysis::succeeding());
        fixture
            .send(Method::PUT, "/uploads/RC.pdf", Body::from("pdf-bytes"))
            .await;
        let session = fixture.sessions.session("default").await.expect("session");

        let response = fixture
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/_uploads/{}/RC.pdf", session.id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(&body[..], b"pdf-bytes");
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let fixture = Fixture::new(StubAnalysis::succeeding());

        let (status, json) = fixture.send(Method::GET, "/metrics", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analyses_completed"], 3);
        assert_eq!(json["llm_failures"], 0);
    }

    struct Fixture {
        _dir: TempDir,
        app: Router,
        service: Arc<StubAnalysis>,
        sessions: Arc<SessionStore>,
    }

    impl Fixture {
        fn new(service: StubAnalysis) -> Self {
            let dir = TempDir::new().expect("tempdir");
            let sessions = Arc::new(SessionStore::new(dir.path().join("uploads")));
            let service = Arc::new(service);
            let app = create_router(service.clone(), sessions.clone());
            Self {
                _dir: dir,
                app,
                service,
                sessions,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            body: Body,
        ) -> (StatusCode, serde_json::Value) {
            let response = self
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(body)
                        .expect("request"),
                )
                .await
                .expect("router response");
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body bytes");
            let json = serde_json::from_slice(&body).expect("json body");
            (status, json)
        }
    }

    type AnalyzeCall = (Vec<SourceDocument>, PathBuf);

    struct StubAnalysis {
        calls: Mutex<Vec<AnalyzeCall>>,
        fail: bool,
    }

    impl StubAnalysis {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        async fn recorded_calls(&self) -> Vec<AnalyzeCall> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl AnalysisApi for StubAnalysis {
        async fn analyze(
            &self,
            documents: Vec<SourceDocument>,
            output_dir: PathBuf,
        ) -> Result<AnalysisOutcome, PipelineError> {
            self.calls
                .lock()
                .await
                .push((documents.clone(), output_dir.clone()));
            if self.fail {
                return Err(PipelineError::FinalSynthesis(LlmError::Unavailable(
                    "connection refused".into(),
                )));
            }
            Ok(AnalysisOutcome {
                summary_markdown: "## 1. Identification du marché".into(),
                fields: Default::default(),
                prefill: Prefill {
                    lot: "Lot 02".into(),
                    ..Prefill::default()
                },
                pdf_path: output_dir.join("resume_ia.pdf"),
                documents: documents
                    .iter()
                    .map(|document| DocumentReport {
                        name: document.name.clone(),
                        ocr_retries: 1,
                        ..DocumentReport::default()
                    })
                    .collect(),
                created_at: "2024-05-01T10:00:00".into(),
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                analyses_completed: 3,
                ..MetricsSnapshot::default()
            }
        }
    }
}
