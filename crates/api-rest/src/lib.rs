//! # API REST
//!
//! REST API implementation for the PV case-processing service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (acting identity, status codes, CORS, store timeouts)
//!
//! Uses `api-shared` for wire types and identity resolution. All case logic lives in
//! `pv-core`; handlers only translate.

#![warn(rust_2018_idioms)]

pub mod startup;

use api_shared::{
    resolve_actor, AuditLogRes, AuthError, CaseListRes, CaseRes, DataEntryReq, ErrorRes,
    FieldIssueRes, HealthRes, HealthService, LoginReq, LoginRes, MedicalReq, MeddraSearchRes,
    MeddraTermRes, QualityReq, ResetRes, ReturnReq, StageCountRes, StatsRes,
    ToggleSeriousnessReq, TriageReq, UserRes,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path as AxumPath, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use pv_core::{
    Actor, CaseError, CaseId, CaseResult, CaseService, CoreConfig, IdentityProvider,
    SeriousnessCriterion, StagePayload, WriteTicket,
};
use pv_meddra::{CodingAssist, Terminology, DEFAULT_LOOKUP_LIMIT};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub service: Arc<CaseService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub coding: Arc<CodingAssist>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        login,
        create_case,
        intake_case,
        list_cases,
        reset_cases,
        get_case,
        delete_case,
        submit_triage,
        submit_data_entry,
        save_data_entry_draft,
        toggle_seriousness,
        submit_medical,
        submit_quality,
        return_case,
        audit_log,
        export_e2b,
        meddra_search,
        stats,
    ),
    components(schemas(
        HealthRes,
        LoginReq,
        LoginRes,
        UserRes,
        ErrorRes,
        FieldIssueRes,
        CaseRes,
        CaseListRes,
        AuditLogRes,
        TriageReq,
        DataEntryReq,
        MedicalReq,
        QualityReq,
        ReturnReq,
        ToggleSeriousnessReq,
        ResetRes,
        StatsRes,
        StageCountRes,
        MeddraSearchRes,
        MeddraTermRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full REST router, including the Swagger UI.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route(
            "/cases",
            get(list_cases).post(create_case).delete(reset_cases),
        )
        .route("/cases/intake", post(intake_case))
        .route("/cases/:id", get(get_case).delete(delete_case))
        .route("/cases/:id/triage", put(submit_triage))
        .route("/cases/:id/dataentry", put(submit_data_entry))
        .route("/cases/:id/dataentry/draft", put(save_data_entry_draft))
        .route("/cases/:id/dataentry/seriousness", post(toggle_seriousness))
        .route("/cases/:id/medical", put(submit_medical))
        .route("/cases/:id/quality", put(submit_quality))
        .route("/cases/:id/return", post(return_case))
        .route("/cases/:id/audit", get(audit_log))
        .route("/cases/:id/e2b", get(export_e2b))
        .route("/meddra/search", get(meddra_search))
        .route("/stats", get(stats))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// A status code plus the `{error, details}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorRes,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorRes::new(error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_for(err: &CaseError) -> StatusCode {
    match err {
        CaseError::IncompleteData(_) | CaseError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CaseError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CaseError::Forbidden(_) => StatusCode::FORBIDDEN,
        CaseError::NotFound(_) => StatusCode::NOT_FOUND,
        CaseError::WrongStage { .. }
        | CaseError::StageTooEarly { .. }
        | CaseError::Conflict(_)
        | CaseError::CaseClosed(_) => StatusCode::CONFLICT,
        CaseError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        CaseError::CorruptRecord { .. }
        | CaseError::YamlSerialization(_)
        | CaseError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CaseError> for ApiError {
    fn from(err: CaseError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        Self {
            status,
            body: ErrorRes::from(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::MissingUser | AuthError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
            AuthError::UnknownRole(_) => StatusCode::BAD_REQUEST,
            AuthError::RoleMismatch { .. } => StatusCode::FORBIDDEN,
        };
        Self::new(status, err.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ----------------------------------------------------------------------------
// Extractors and helpers
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    user: Option<String>,
    role: Option<String>,
}

/// The acting user, from `x-pv-user`/`x-pv-role` headers or `user=`/`role=` query parameters.
pub struct Caller(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let user = header_value("x-pv-user").or(query.user);
        let role = header_value("x-pv-role").or(query.role);

        let actor = resolve_actor(state.identity.as_ref(), user.as_deref(), role.as_deref())?;
        Ok(Caller(actor))
    }
}

fn parse_case_id(raw: &str) -> ApiResult<CaseId> {
    CaseId::parse(raw)
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, format!("case not found: {raw}")))
}

/// Runs a core call on the blocking pool, bounded by the configured store timeout.
///
/// On timeout the call's [`WriteTicket`] is abandoned, so a 503 means nothing was written. If
/// the store had already started committing, the handler waits for the real outcome instead.
async fn run_blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CaseService) -> CaseResult<T> + Send + 'static,
{
    let ticket = WriteTicket::new();
    let service = state.service.with_ticket(ticket.clone());
    let timeout = state.cfg.store_timeout();
    let mut task = tokio::task::spawn_blocking(move || f(&service));

    let joined = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if ticket.abandon() => {
            return Err(ApiError::from(CaseError::TransientStore(format!(
                "no response within {} ms",
                timeout.as_millis()
            ))));
        }
        Err(_) => {
            tracing::warn!(
                "store call passed {} ms while committing; waiting for it",
                timeout.as_millis()
            );
            task.await
        }
    };

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(join_err) => {
            tracing::error!("case store task failed: {}", join_err);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Credentials accepted", body = LoginRes),
        (status = 401, description = "Unknown user or bad password", body = ErrorRes)
    )
)]
/// Checks a training account's credentials and reports its role.
#[axum::debug_handler]
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> ApiResult<Json<LoginRes>> {
    match state.identity.authenticate(&req.username, &req.password) {
        Some(actor) => {
            tracing::info!("{} logged in as {}", actor.username, actor.role);
            Ok(Json(LoginRes {
                success: true,
                user: UserRes::from(&actor),
            }))
        }
        None => {
            tracing::warn!("failed login for '{}'", req.username);
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/cases",
    request_body = TriageReq,
    responses(
        (status = 201, description = "Case created at Data Entry", body = CaseRes),
        (status = 400, description = "Triage criteria missing", body = ErrorRes),
        (status = 401, description = "Unknown user", body = ErrorRes),
        (status = 403, description = "Not a triage user", body = ErrorRes)
    )
)]
/// Creates a case from the four triage minimum criteria.
#[axum::debug_handler]
async fn create_case(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(TriageReq(payload)): Json<TriageReq>,
) -> ApiResult<(StatusCode, Json<CaseRes>)> {
    let case = run_blocking(&state, move |svc| svc.create_case(&actor, &payload)).await?;
    Ok((StatusCode::CREATED, Json(CaseRes(case))))
}

#[utoipa::path(
    post,
    path = "/cases/intake",
    responses(
        (status = 201, description = "Blank case booked in at New", body = CaseRes),
        (status = 403, description = "Not a triage user", body = ErrorRes)
    )
)]
/// Books in a received report before triage.
#[axum::debug_handler]
async fn intake_case(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<(StatusCode, Json<CaseRes>)> {
    let case = run_blocking(&state, move |svc| svc.intake_case(&actor)).await?;
    Ok((StatusCode::CREATED, Json(CaseRes(case))))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    role: Option<String>,
}

#[utoipa::path(
    get,
    path = "/cases",
    params(("role" = Option<String>, Query, description = "Only the work queue of this role")),
    responses(
        (status = 200, description = "Cases in creation order", body = CaseListRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
/// Lists every case, or one role's work queue.
#[axum::debug_handler]
async fn list_cases(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<CaseListRes>> {
    let cases = run_blocking(&state, move |svc| match query.role {
        Some(role) => svc.cases_for_role(&role),
        None => svc.list_cases(),
    })
    .await?;
    Ok(Json(CaseListRes(cases)))
}

#[utoipa::path(
    delete,
    path = "/cases",
    responses(
        (status = 200, description = "All cases removed", body = ResetRes),
        (status = 403, description = "Not an administrator", body = ErrorRes)
    )
)]
/// Training reset: removes every case.
#[axum::debug_handler]
async fn reset_cases(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<ResetRes>> {
    let removed = run_blocking(&state, move |svc| svc.reset(&actor)).await?;
    Ok(Json(ResetRes { removed }))
}

#[utoipa::path(
    get,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "Full case document", body = CaseRes),
        (status = 404, description = "No such case", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_case(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CaseRes>> {
    let id = parse_case_id(&id)?;
    let case = run_blocking(&state, move |svc| svc.get_case(&id)).await?;
    Ok(Json(CaseRes(case)))
}

#[utoipa::path(
    delete,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 204, description = "Case removed"),
        (status = 403, description = "Not an administrator", body = ErrorRes),
        (status = 404, description = "No such case", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_case(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    let id = parse_case_id(&id)?;
    run_blocking(&state, move |svc| svc.delete_case(&id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Shared body of the four stage submission handlers.
async fn submit(
    state: &AppState,
    actor: Actor,
    id: &str,
    payload: StagePayload,
) -> ApiResult<Json<CaseRes>> {
    let id = parse_case_id(id)?;
    let case = run_blocking(state, move |svc| svc.submit_stage(&id, &actor, &payload)).await?;
    Ok(Json(CaseRes(case)))
}

#[utoipa::path(
    put,
    path = "/cases/{id}/triage",
    params(("id" = String, Path, description = "Case id")),
    request_body = TriageReq,
    responses(
        (status = 200, description = "Triage complete", body = CaseRes),
        (status = 400, description = "Triage criteria missing", body = ErrorRes),
        (status = 409, description = "Case is not at New", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn submit_triage(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(TriageReq(payload)): Json<TriageReq>,
) -> ApiResult<Json<CaseRes>> {
    submit(&state, actor, &id, StagePayload::Triage(payload)).await
}

#[utoipa::path(
    put,
    path = "/cases/{id}/dataentry",
    params(("id" = String, Path, description = "Case id")),
    request_body = DataEntryReq,
    responses(
        (status = 200, description = "Data entry complete", body = CaseRes),
        (status = 400, description = "Fields missing or invalid", body = ErrorRes),
        (status = 409, description = "Case is not at Data Entry", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn submit_data_entry(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(DataEntryReq(payload)): Json<DataEntryReq>,
) -> ApiResult<Json<CaseRes>> {
    submit(&state, actor, &id, StagePayload::DataEntry(payload)).await
}

#[utoipa::path(
    put,
    path = "/cases/{id}/dataentry/draft",
    params(("id" = String, Path, description = "Case id")),
    request_body = DataEntryReq,
    responses(
        (status = 200, description = "Draft saved; stage unchanged", body = CaseRes),
        (status = 409, description = "Case is not at Data Entry", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn save_data_entry_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(DataEntryReq(payload)): Json<DataEntryReq>,
) -> ApiResult<Json<CaseRes>> {
    let id = parse_case_id(&id)?;
    let case =
        run_blocking(&state, move |svc| svc.save_data_entry_draft(&id, &actor, &payload)).await?;
    Ok(Json(CaseRes(case)))
}

#[utoipa::path(
    post,
    path = "/cases/{id}/dataentry/seriousness",
    params(("id" = String, Path, description = "Case id")),
    request_body = ToggleSeriousnessReq,
    responses(
        (status = 200, description = "Criterion toggled on the draft", body = CaseRes),
        (status = 400, description = "Unknown criterion", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn toggle_seriousness(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ToggleSeriousnessReq>,
) -> ApiResult<Json<CaseRes>> {
    let id = parse_case_id(&id)?;
    let criterion = SeriousnessCriterion::parse(&req.criterion).ok_or_else(|| {
        ApiError::from(CaseError::field(
            "criterion",
            format!("unknown seriousness criterion '{}'", req.criterion),
        ))
    })?;
    let case =
        run_blocking(&state, move |svc| svc.toggle_seriousness(&id, &actor, criterion)).await?;
    Ok(Json(CaseRes(case)))
}

#[utoipa::path(
    put,
    path = "/cases/{id}/medical",
    params(("id" = String, Path, description = "Case id")),
    request_body = MedicalReq,
    responses(
        (status = 200, description = "Medical review complete", body = CaseRes),
        (status = 400, description = "Coding or causality missing", body = ErrorRes),
        (status = 409, description = "Case is not at Medical Review", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn submit_medical(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(MedicalReq(payload)): Json<MedicalReq>,
) -> ApiResult<Json<CaseRes>> {
    submit(&state, actor, &id, StagePayload::Medical(payload)).await
}

#[utoipa::path(
    put,
    path = "/cases/{id}/quality",
    params(("id" = String, Path, description = "Case id")),
    request_body = QualityReq,
    responses(
        (status = 200, description = "Case approved", body = CaseRes),
        (status = 400, description = "Checklist incomplete", body = ErrorRes),
        (status = 409, description = "Case is not at Quality Review", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn submit_quality(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<QualityReq>,
) -> ApiResult<Json<CaseRes>> {
    submit(&state, actor, &id, StagePayload::Quality(req.into())).await
}

#[utoipa::path(
    post,
    path = "/cases/{id}/return",
    params(("id" = String, Path, description = "Case id")),
    request_body = ReturnReq,
    responses(
        (status = 200, description = "Case sent back one stage", body = CaseRes),
        (status = 400, description = "No reason, or stage has no return edge", body = ErrorRes),
        (status = 409, description = "Case is not at the caller's stage", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn return_case(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ReturnReq>,
) -> ApiResult<Json<CaseRes>> {
    let id = parse_case_id(&id)?;
    let case = run_blocking(&state, move |svc| svc.return_case(&id, &actor, &req.reason)).await?;
    Ok(Json(CaseRes(case)))
}

#[utoipa::path(
    get,
    path = "/cases/{id}/audit",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "Audit log, oldest first", body = AuditLogRes),
        (status = 404, description = "No such case", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn audit_log(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<AuditLogRes>> {
    let id = parse_case_id(&id)?;
    let entries = run_blocking(&state, move |svc| svc.audit_log(&id)).await?;
    Ok(Json(AuditLogRes(entries)))
}

#[utoipa::path(
    get,
    path = "/cases/{id}/e2b",
    params(
        ("id" = String, Path, description = "Case id"),
        ("user" = Option<String>, Query, description = "Acting user, if no x-pv-user header"),
        ("role" = Option<String>, Query, description = "Claimed role, if no x-pv-role header")
    ),
    responses(
        (status = 200, description = "E2B(R3) XML attachment", content_type = "application/xml"),
        (status = 401, description = "Unknown user", body = ErrorRes),
        (status = 409, description = "Case has not reached Medical Review", body = ErrorRes)
    )
)]
/// Downloads the case as an ICH E2B(R3) XML message.
#[axum::debug_handler]
async fn export_e2b(
    State(state): State<AppState>,
    Caller(actor): Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Response> {
    let id = parse_case_id(&id)?;
    let (case_number, xml) = run_blocking(&state, move |svc| {
        let case = svc.get_case(&id)?;
        let xml = svc.export_e2b(&id)?;
        Ok((case.case_number, xml))
    })
    .await?;
    tracing::info!("case {} E2B downloaded by {}", case_number, actor.username);

    let disposition = format!("attachment; filename=\"{case_number}-e2b.xml\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        xml,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct MeddraQuery {
    q: Option<String>,
    limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/meddra/search",
    params(
        ("q" = String, Query, description = "Verbatim text or term to look up"),
        ("limit" = Option<usize>, Query, description = "Maximum rows")
    ),
    responses(
        (status = 200, description = "Matching terms with IME flags", body = MeddraSearchRes),
        (status = 400, description = "Missing query", body = ErrorRes)
    )
)]
/// MedDRA coding assist.
#[axum::debug_handler]
async fn meddra_search(
    State(state): State<AppState>,
    Query(query): Query<MeddraQuery>,
) -> ApiResult<Json<MeddraSearchRes>> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::from(CaseError::field("q", "is required")))?;
    let limit = query.limit.unwrap_or(DEFAULT_LOOKUP_LIMIT);

    let terms = state
        .coding
        .lookup_limited(q, limit)
        .into_iter()
        .map(|entry| {
            let ime = state.coding.is_ime(&entry.pt);
            MeddraTermRes::new(entry, ime)
        })
        .collect();
    Ok(Json(MeddraSearchRes { terms }))
}

#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Case totals by stage", body = StatsRes)
    )
)]
#[axum::debug_handler]
async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsRes>> {
    let stats = run_blocking(&state, |svc| svc.stats()).await?;
    Ok(Json(stats.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pv_core::{Case, CaseStore, MemoryCaseStore, StaticAccounts};
    use serde_json::{json, Value};
    use std::sync::Barrier;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(cfg: CoreConfig, store: Arc<dyn CaseStore>) -> Router {
        let cfg = Arc::new(cfg);
        let coding = Arc::new(CodingAssist::default());
        let service = Arc::new(CaseService::new(cfg.clone(), store, coding.clone()));
        router(AppState {
            cfg,
            service,
            identity: Arc::new(StaticAccounts::training()),
            coding,
        })
    }

    fn app() -> Router {
        app_with(CoreConfig::default(), Arc::new(MemoryCaseStore::new()))
    }

    fn short_timeout() -> CoreConfig {
        CoreConfig::new(
            None,
            "SKYVIG".into(),
            "EVHUMAN".into(),
            Duration::from_millis(50),
        )
        .unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-pv-user", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn smith() -> Value {
        json!({
            "reporterName": "Dr. Smith",
            "patientInitials": "A.B.",
            "productName": "Acetaminophen 500mg",
            "eventDescription": "Nausea"
        })
    }

    async fn created_case(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/cases", Some("triage1"), Some(smith())).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn login_reports_role_and_step() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "dataentry1", "password": "train123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["role"], "Data Entry");
        assert_eq!(body["user"]["step"], 2);

        let (status, body) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "dataentry1", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn create_case_returns_step_two() {
        let app = app();
        let (status, body) = send(&app, "POST", "/cases", Some("triage1"), Some(smith())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["currentStep"], 2);
        assert_eq!(body["status"], "Triage Complete");
        assert_eq!(body["triage"]["reporterName"], "Dr. Smith");
        assert_eq!(body["auditLog"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_case_validation_lists_fields() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/cases",
            Some("triage1"),
            Some(json!({ "reporterName": "Dr. Smith" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["patientInitials", "productName", "eventDescription"]);
    }

    #[tokio::test]
    async fn identity_is_required_and_checked() {
        let app = app();
        let (status, _) = send(&app, "POST", "/cases", None, Some(smith())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "POST", "/cases", Some("nobody"), Some(smith())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            "/cases?user=triage1&role=Medical",
            None,
            Some(smith()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn wrong_stage_is_conflict_and_queues_move() {
        let app = app();
        let id = created_case(&app).await;

        let medical = json!({
            "events": [{ "pt": "Nausea", "ptCode": "10028813" }],
            "causality": "Possible"
        });
        let uri = format!("/cases/{id}/medical");
        let (status, _) = send(&app, "PUT", &uri, Some("medical1"), Some(medical)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let data_entry = json!({ "patientAge": 45, "onsetDate": "2026-01-15" });
        let uri = format!("/cases/{id}/dataentry");
        let (status, body) = send(&app, "PUT", &uri, Some("dataentry1"), Some(data_entry)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentStep"], 3);

        let (_, queue) = send(&app, "GET", "/cases?role=Medical", None, None).await;
        assert_eq!(queue.as_array().unwrap().len(), 1);
        let (_, queue) = send(&app, "GET", "/cases?role=Data%20Entry", None, None).await;
        assert!(queue.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn e2b_download_needs_medical_review() {
        let app = app();
        let id = created_case(&app).await;

        let uri = format!("/cases/{id}/e2b?user=medical1&role=Medical");
        let (status, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let data_entry = json!({ "patientAge": "45", "onsetDate": "2026-01-15" });
        send(
            &app,
            "PUT",
            &format!("/cases/{id}/dataentry"),
            Some("dataentry1"),
            Some(data_entry),
        )
        .await;

        let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment;"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("MCCI_IN200100UV01"));
    }

    #[tokio::test]
    async fn return_and_reset_flow() {
        let app = app();
        let id = created_case(&app).await;
        send(
            &app,
            "PUT",
            &format!("/cases/{id}/dataentry"),
            Some("dataentry1"),
            Some(json!({ "patientAge": 45, "onsetDate": "2026-01-15" })),
        )
        .await;

        let uri = format!("/cases/{id}/return");
        let no_reason = json!({ "reason": "" });
        let (status, body) = send(&app, "POST", &uri, Some("medical1"), Some(no_reason)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "reason");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some("medical1"),
            Some(json!({ "reason": "Onset date looks wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentStep"], 2);
        assert_eq!(body["returnCount"], 1);

        let (status, _) = send(&app, "DELETE", "/cases", Some("triage1"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "DELETE", "/cases", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);

        let (status, _) = send(&app, "GET", &format!("/cases/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn seriousness_toggle_round_trips() {
        let app = app();
        let id = created_case(&app).await;
        let uri = format!("/cases/{id}/dataentry/seriousness");

        let toggle = |criterion: &str| Some(json!({ "criterion": criterion }));

        let (status, body) = send(&app, "POST", &uri, Some("dataentry1"), toggle("Death")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dataEntryDraft"]["seriousnessCriteria"], json!(["Death"]));

        let (_, body) = send(&app, "POST", &uri, Some("dataentry1"), toggle("death")).await;
        assert_eq!(body["dataEntryDraft"]["seriousnessCriteria"], json!([]));

        let (status, _) = send(&app, "POST", &uri, Some("dataentry1"), toggle("Sneezing")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn meddra_search_flags_ime() {
        let app = app();
        let uri = "/meddra/search?q=anaphyl&limit=5";
        let (status, body) = send(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        let terms = body["terms"].as_array().unwrap();
        assert!(!terms.is_empty());
        assert!(terms.iter().all(|t| t["ime"] == true));

        let (status, _) = send(&app, "GET", "/meddra/search", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_count_by_stage() {
        let app = app();
        created_case(&app).await;
        let (status, body) = send(&app, "GET", "/stats", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["byStage"][1]["status"], "Triage Complete");
        assert_eq!(body["byStage"][1]["count"], 1);
    }

    /// Holds every insert until the test releases it, then reports when the insert returned.
    struct GatedStore {
        inner: MemoryCaseStore,
        release: Barrier,
        done: Barrier,
    }

    impl CaseStore for GatedStore {
        fn insert(&self, case: Case, ticket: &WriteTicket) -> CaseResult<Case> {
            self.release.wait();
            let result = self.inner.insert(case, ticket);
            self.done.wait();
            result
        }

        fn get(&self, id: &CaseId) -> CaseResult<Option<Case>> {
            self.inner.get(id)
        }

        fn list(&self) -> CaseResult<Vec<Case>> {
            self.inner.list()
        }

        fn compare_and_swap(
            &self,
            expected_revision: u64,
            case: &Case,
            ticket: &WriteTicket,
        ) -> CaseResult<bool> {
            self.inner.compare_and_swap(expected_revision, case, ticket)
        }

        fn delete(&self, id: &CaseId, ticket: &WriteTicket) -> CaseResult<bool> {
            self.inner.delete(id, ticket)
        }

        fn clear(&self, ticket: &WriteTicket) -> CaseResult<usize> {
            self.inner.clear(ticket)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_create_is_unavailable_and_writes_nothing() {
        let store = Arc::new(GatedStore {
            inner: MemoryCaseStore::new(),
            release: Barrier::new(2),
            done: Barrier::new(2),
        });
        let app = app_with(short_timeout(), store.clone());

        let (status, body) = send(&app, "POST", "/cases", Some("triage1"), Some(smith())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("unavailable"));

        let gate = Arc::clone(&store);
        tokio::task::spawn_blocking(move || {
            gate.release.wait();
            gate.done.wait();
        })
        .await
        .unwrap();

        assert!(store.inner.list().unwrap().is_empty());
        let (status, body) = send(&app, "GET", "/cases", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    /// A backend whose disk has gone away.
    struct UnavailableStore;

    impl UnavailableStore {
        fn down<T>() -> CaseResult<T> {
            Err(CaseError::TransientStore("disk not mounted".into()))
        }
    }

    impl CaseStore for UnavailableStore {
        fn insert(&self, _case: Case, _ticket: &WriteTicket) -> CaseResult<Case> {
            Self::down()
        }

        fn get(&self, _id: &CaseId) -> CaseResult<Option<Case>> {
            Self::down()
        }

        fn list(&self) -> CaseResult<Vec<Case>> {
            Self::down()
        }

        fn compare_and_swap(
            &self,
            _expected_revision: u64,
            _case: &Case,
            _ticket: &WriteTicket,
        ) -> CaseResult<bool> {
            Self::down()
        }

        fn delete(&self, _id: &CaseId, _ticket: &WriteTicket) -> CaseResult<bool> {
            Self::down()
        }

        fn clear(&self, _ticket: &WriteTicket) -> CaseResult<usize> {
            Self::down()
        }
    }

    #[tokio::test]
    async fn store_failure_is_service_unavailable() {
        let app = app_with(CoreConfig::default(), Arc::new(UnavailableStore));

        let (status, body) = send(&app, "GET", "/cases", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("disk not mounted"));

        let (status, _) = send(&app, "POST", "/cases", Some("triage1"), Some(smith())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let uri = format!("/cases/{}", CaseId::new());
        let (status, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
