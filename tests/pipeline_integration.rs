use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use dceassist::{
    api,
    config::{Config, LlmSettings},
    extraction::{DocumentExtractor, ExtractedDocument, ExtractionError, PageSource, PageText},
    llm::OllamaClient,
    metrics::PipelineMetrics,
    processing::{AnalysisPipeline, NO_INFORMATION_SENTENCE, PipelineError, SourceDocument},
    session::SessionStore,
};
use httpmock::{Method::POST, Mock, MockServer};
use serde_json::json;
use tower::ServiceExt;

const FINAL_ANSWER: &str = "## Champs structurés
- **intitule_operation** : Réhabilitation du collège Jean Moulin
- **intitule_lot** : Lot 03 - Menuiseries extérieures
- **maitre_ouvrage** : Département du Rhône
- **adresse_chantier** : non mentionné

## 1. Identification du marché
- Procédure adaptée, lot 03

## 2. Dates clés
- 15/03/2024 - remise des offres";

/// Returns the same pages for every path, file name first so documents stay distinguishable.
struct FixedExtractor {
    pages: Vec<&'static str>,
}

impl DocumentExtractor for FixedExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cover = PageText::new(1, format!("Pièce {name}"), PageSource::PdfExtract);
        let mut pages = vec![cover];
        pages.extend(self.pages.iter().enumerate().map(|(index, text)| {
            PageText::new(index as u32 + 2, text.to_string(), PageSource::PdfExtract)
        }));
        Ok(ExtractedDocument {
            pages,
            ocr_pages: 0,
            ocr_retries: 0,
        })
    }
}

struct OllamaMocks<'a> {
    chunk: Mock<'a>,
    document: Mock<'a>,
    last: Mock<'a>,
}

async fn mock_ollama<'a>(server: &'a MockServer, chunk_status: u16) -> OllamaMocks<'a> {
    let last = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("Synthèses par document");
            then.status(200)
                .json_body(json!({ "response": FINAL_ANSWER, "done": true }));
        })
        .await;
    let document = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("Extractions :");
            then.status(200)
                .json_body(json!({ "response": "- Délai global : 10 mois", "done": true }));
        })
        .await;
    let chunk = server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("Extrait :");
            if chunk_status == 200 {
                then.status(200).json_body(
                    json!({ "response": "- Visite obligatoire le 01/03/2024", "done": true }),
                );
            } else {
                then.status(chunk_status).body("model overloaded");
            }
        })
        .await;
    OllamaMocks {
        chunk,
        document,
        last,
    }
}

fn pipeline(server: &MockServer, extractor: FixedExtractor) -> AnalysisPipeline {
    let config = Config {
        llm: LlmSettings {
            url: server.url("/api/generate"),
            ..LlmSettings::default()
        },
        ..Config::default()
    };
    let llm = OllamaClient::new(config.llm.clone()).expect("client");
    AnalysisPipeline::new(
        &config,
        Arc::new(extractor),
        Arc::new(llm),
        Arc::new(PipelineMetrics::new()),
    )
}

fn documents(names: &[&str]) -> Vec<SourceDocument> {
    names
        .iter()
        .map(|name| SourceDocument {
            name: name.to_string(),
            path: Path::new("/dce").join(name),
        })
        .collect()
}

#[tokio::test]
async fn analysis_writes_pdf_and_parses_fields() {
    let server = MockServer::start_async().await;
    let mocks = mock_ollama(&server, 200).await;
    let pipeline = pipeline(
        &server,
        FixedExtractor {
            pages: vec!["Le candidat remet son offre avant le 15/03/2024 à 12h00."],
        },
    );
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = pipeline
        .analyze(
            documents(&["RC.pdf", "CCTP.pdf"]),
            dir.path().join("session"),
        )
        .await
        .expect("analysis succeeds");

    // Short documents yield one chunk each, so no per-document synthesis call.
    mocks.chunk.assert_hits_async(2).await;
    mocks.document.assert_hits_async(0).await;
    mocks.last.assert_hits_async(1).await;

    let summary = &outcome.summary_markdown;
    assert!(summary.starts_with("## 1. Identification du marché"));
    assert!(!summary.contains("Champs structurés"));
    assert_eq!(outcome.prefill.lot, "Lot 03 - Menuiseries extérieures");
    assert_eq!(outcome.prefill.moa, "Département du Rhône");
    assert_eq!(outcome.prefill.adresse, "");
    assert_eq!(outcome.documents.len(), 2);
    assert!(outcome.documents.iter().all(|report| report.summarized));

    let bytes = std::fs::read(&outcome.pdf_path).expect("pdf written");
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(outcome.pdf_path, dir.path().join("session/resume_ia.pdf"));

    let metrics = pipeline.metrics_snapshot();
    assert_eq!(metrics.analyses_completed, 1);
    assert_eq!(metrics.documents_processed, 2);
    assert_eq!(metrics.chunks_submitted, 2);
    assert_eq!(metrics.llm_failures, 0);
}

#[tokio::test]
async fn failing_chunks_fall_back_to_fixed_sentence() {
    let server = MockServer::start_async().await;
    let mocks = mock_ollama(&server, 503).await;
    let pipeline = pipeline(
        &server,
        FixedExtractor {
            pages: vec!["Cahier des clauses techniques particulières."],
        },
    );
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = pipeline
        .analyze(documents(&["CCTP.pdf"]), dir.path().to_path_buf())
        .await
        .expect("fallback still renders");

    mocks.chunk.assert_hits_async(1).await;
    mocks.last.assert_hits_async(0).await;
    assert_eq!(outcome.summary_markdown, NO_INFORMATION_SENTENCE);
    assert!(outcome.fields.values().all(String::is_empty));
    assert!(!outcome.documents[0].summarized);
    assert!(outcome.pdf_path.exists());
    assert_eq!(pipeline.metrics_snapshot().llm_failures, 1);
}

#[tokio::test]
async fn final_synthesis_failure_writes_no_pdf() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("Synthèses par document");
            then.status(500).body("out of memory");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate").body_contains("Extrait :");
            then.status(200)
                .json_body(json!({ "response": "- Lot unique", "done": true }));
        })
        .await;
    let pipeline = pipeline(
        &server,
        FixedExtractor {
            pages: vec!["Règlement de la consultation."],
        },
    );
    let dir = tempfile::tempdir().expect("tempdir");

    let error = pipeline
        .analyze(documents(&["RC.pdf"]), dir.path().to_path_buf())
        .await
        .expect_err("final synthesis fails");

    assert!(matches!(error, PipelineError::FinalSynthesis(_)));
    assert!(!dir.path().join("resume_ia.pdf").exists());
}

#[tokio::test]
async fn http_flow_uploads_analyzes_and_serves_summary() {
    let server = MockServer::start_async().await;
    let _mocks = mock_ollama(&server, 200).await;
    let pipeline = pipeline(
        &server,
        FixedExtractor {
            pages: vec!["Date limite de remise des offres : 15/03/2024."],
        },
    );
    let dir = tempfile::tempdir().expect("tempdir");
    let sessions = Arc::new(SessionStore::new(dir.path().join("uploads")));
    let app = api::create_router(Arc::new(pipeline), Arc::clone(&sessions));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/uploads/RC.pdf")
                .header("x-user-id", "bureau-etudes")
                .body(Body::from("%PDF-1.4 stub"))
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/analyze")
                .header("x-user-id", "bureau-etudes")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["level"], "positive");
    assert_eq!(
        json["prefill"]["intitule"],
        "Réhabilitation du collège Jean Moulin"
    );
    let url = json["url"].as_str().expect("url").to_string();
    assert!(url.ends_with("/resume_ia.pdf"));

    let response = app
        .oneshot(
            Request::builder()
                .uri(&url)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    assert!(body.starts_with(b"%PDF"));
}
