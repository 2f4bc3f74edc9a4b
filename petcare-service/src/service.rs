use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use petcare_flow::{
    Advance, FinalReport, FlowRunner, Pipeline, PipelineError, PipelineState, SessionStorage,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    llm::{LanguageModel, OpenRouterModel},
    models::{AdvanceResponse, SessionStatusResponse, TriageRequest, TriageResponse},
    persistence::{FileReportStore, ReportStoreError},
    workflow::{build_triage_pipeline, create_flow_runner, create_session_storage},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

const CORRELATION_HEADER: &str = "x-correlation-id";

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn pipeline_error(message: &str, session_id: &str, err: PipelineError) -> ApiError {
    match err {
        PipelineError::SessionNotFound(_) => not_found_error("Session not found", session_id),
        other => {
            error!(session_id, error = %other, "{}", message);
            internal_error(message, &other.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub flow_runner: FlowRunner,
    pub session_storage: Arc<dyn SessionStorage>,
    pub reports: Option<FileReportStore>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        session_storage: Arc<dyn SessionStorage>,
        reports: Option<FileReportStore>,
    ) -> Self {
        let flow_runner = create_flow_runner(pipeline.clone(), session_storage.clone());
        Self {
            pipeline,
            flow_runner,
            session_storage,
            reports,
        }
    }

    /// Writes the report when a report directory is configured. Failures are logged only.
    async fn persist(&self, report: &FinalReport) -> Option<String> {
        let store = self.reports.as_ref()?;
        match store.save(report).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(error = %e, "Failed to save triage report");
                None
            }
        }
    }
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenRouterModel::new(
        &config.openrouter_api_key,
        config.llm_timeout,
    ));
    let pipeline = Arc::new(build_triage_pipeline(config, llm)?);
    let session_storage = create_session_storage(config).await;
    let reports = config.report_dir.clone().map(FileReportStore::new);

    Ok(build_router(AppState::new(pipeline, session_storage, reports)))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/triage", post(run_triage))
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/{session_id}", get(get_session_status))
        .route("/api/sessions/{session_id}/advance", post(advance_session))
        .route("/api/reports/{name}", get(get_report))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags each request and its response with a correlation id, reusing the caller's when given.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert(CORRELATION_HEADER, value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;
    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "PetCare Advisor API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-stage LLM triage for pet symptoms",
        "endpoints": {
            "POST /api/triage": "Run the full triage pipeline and return the report",
            "POST /api/sessions": "Create a step-by-step triage session",
            "POST /api/sessions/{session_id}/advance": "Run the next pipeline step",
            "GET /api/sessions/{session_id}": "Get session state",
            "GET /api/reports/{name}": "Fetch a saved report",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "petcare-advisor",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn run_triage(
    State(state): State<AppState>,
    Json(request): Json<TriageRequest>,
) -> Result<Json<TriageResponse>, (StatusCode, Json<TriageResponse>)> {
    if let Err(message) = request.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(TriageResponse::failed(message)),
        ));
    }

    let user_input = request.compose_user_input();
    let mut pipeline_state = PipelineState::new(user_input.clone(), request.image_refs());
    info!(
        species = request.normalized_species().as_deref().unwrap_or("-"),
        images = pipeline_state.image_refs().len(),
        "Starting triage run"
    );

    match state
        .pipeline
        .run_to_completion(&mut pipeline_state, &user_input)
        .await
    {
        Ok(report) => {
            let saved_as = state.persist(&report).await;
            info!(
                triage_level = %report.triage.triage_level,
                urgency_score = report.triage.urgency_score,
                "Triage run complete"
            );
            Ok(Json(TriageResponse::completed(report, saved_as)))
        }
        Err(e) => {
            error!(error = %e, "Triage run failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriageResponse::failed(e.to_string())),
            ))
        }
    }
}

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<TriageRequest>,
) -> Result<(StatusCode, Json<AdvanceResponse>), ApiError> {
    request.validate().map_err(bad_request_error)?;

    let session = state
        .flow_runner
        .create_session(request.compose_user_input(), request.image_refs())
        .await
        .map_err(|e| {
            error!("Failed to create session: {}", e);
            internal_error("Failed to create triage session", &e.to_string())
        })?;
    let session_id = session.id;

    // The session survives a failed first step and can be resumed via /advance
    let advance = state.flow_runner.run(&session_id).await.map_err(|e| {
        error!(session_id = %session_id, error = %e, "Failed to start triage session");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to start triage session",
                "details": e.to_string(),
                "session_id": session_id
            })),
        )
    })?;

    Ok((
        StatusCode::CREATED,
        Json(AdvanceResponse {
            session_id,
            advance,
            saved_as: None,
        }),
    ))
}

async fn advance_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<AdvanceResponse> {
    let step = state
        .flow_runner
        .run_step(&session_id)
        .await
        .map_err(|e| pipeline_error("Failed to advance session", &session_id, e))?;

    // Only the call that produced the report writes it
    let saved_as = match &step.advance {
        Advance::Complete { report } if step.produced_report => state.persist(report).await,
        _ => None,
    };
    let advance = step.advance;

    Ok(Json(AdvanceResponse {
        session_id,
        advance,
        saved_as,
    }))
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionStatusResponse> {
    match state.session_storage.get(&session_id).await {
        Ok(Some(session)) => Ok(Json(SessionStatusResponse::from(session))),
        Ok(None) => Err(not_found_error("Session not found", &session_id)),
        Err(e) => Err(pipeline_error("Failed to load session", &session_id, e)),
    }
}

async fn get_report(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<FinalReport> {
    let Some(store) = state.reports.as_ref() else {
        return Err(not_found_error("Report storage is disabled", &name));
    };

    store.load(&name).await.map(Json).map_err(|e| match e {
        ReportStoreError::InvalidName(_) => bad_request_error("Invalid report name"),
        ReportStoreError::NotFound(_) => not_found_error("Report not found", &name),
        other => {
            error!(report = %name, error = %other, "Failed to load report");
            internal_error("Failed to load report", &other.to_string())
        }
    })
}
