use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::ConfigService;
use crate::customer::{CustomerFilter, CustomerSearchResponse, PageRequest, SearchCustomers};
use crate::error::DynaqueryError;
use crate::execute::{QueryExecutor, SqliteExecutor};
use crate::fragment::{AvailableFragments, FragmentDraft, FragmentKind, QueryFragment};
use crate::indicator::IndicatorEngine;
use crate::persist::Persistor;
use crate::preview::{PreviewRequest, PreviewResult, Previewer};
use crate::rule::{IndicatorRule, RuleDraft};
use crate::service::DynamicQueryService;
use crate::settings::Settings;

/// What the handlers share. Every member is safe to use from many requests at once.
#[derive(Clone)]
pub struct AppState {
    pub customers: Arc<SearchCustomers>,
    pub queries: Arc<DynamicQueryService>,
    pub config: Arc<ConfigService>,
    pub default_page_size: u64,
}

impl AppState {
    /// Wires the engines to one persistor: fragments, rules and queried tables all live in it.
    pub fn new(persistor: &Persistor, settings: &Settings) -> Self {
        let store = Arc::new(persistor.clone());
        let executor: Arc<dyn QueryExecutor> = Arc::new(SqliteExecutor::new(persistor.connection()));
        let queries = Arc::new(DynamicQueryService::new(store.clone(), Arc::clone(&executor)));
        let indicators = Arc::new(IndicatorEngine::new(store.clone()));
        let previewer = Previewer::new(executor).with_limit(settings.preview_limit);
        Self {
            customers: Arc::new(SearchCustomers::new(Arc::clone(&queries), indicators)),
            queries,
            config: Arc::new(ConfigService::new(store.clone(), store, previewer)),
            default_page_size: settings.default_page_size,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

pub enum ApiError {
    Engine(DynaqueryError),
    Join(String),
}

impl From<DynaqueryError> for ApiError {
    fn from(e: DynaqueryError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Engine(e) => {
                let status = match e {
                    _ if !e.is_client_error() => StatusCode::INTERNAL_SERVER_ERROR,
                    DynaqueryError::FragmentNotFound { .. } | DynaqueryError::NotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string())
            }
            ApiError::Join(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        warn!(%msg, code = %status.as_u16(), "request error");
        let body = ErrorResponse {
            status: "error".into(),
            error: msg,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// The engine is synchronous and holds the connection lock while it works.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(work).await.map_err(|e| {
        warn!(error = %e, "Join error");
        ApiError::Join("Join error".into())
    })?;
    Ok(Json(result?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub size: Option<u64>,
}

async fn search_customers(
    State(state): State<AppState>,
    Query(paging): Query<PageQuery>,
    Json(filter): Json<CustomerFilter>,
) -> ApiResult<CustomerSearchResponse> {
    let page = PageRequest {
        page: paging.page.unwrap_or(0),
        size: paging.size.unwrap_or(state.default_page_size),
    };
    let started = std::time::Instant::now();
    let response = blocking(move || state.customers.execute_with_options(&filter, page)).await?;
    info!(
        ms = started.elapsed().as_secs_f64() * 1000.0,
        total = response.customers.total_elements,
        "customer search complete"
    );
    Ok(response)
}

async fn available_queries(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> ApiResult<AvailableFragments> {
    blocking(move || state.queries.available_fragments(&context)).await
}

fn fragment_kind(kind: &str) -> Result<FragmentKind, ApiError> {
    Ok(kind.parse::<FragmentKind>()?)
}

async fn list_fragments(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Vec<QueryFragment>> {
    let kind = fragment_kind(&kind)?;
    blocking(move || state.config.list_fragments(kind)).await
}

async fn create_fragment(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(draft): Json<FragmentDraft>,
) -> Result<(StatusCode, Json<QueryFragment>), ApiError> {
    let kind = fragment_kind(&kind)?;
    let created = blocking(move || state.config.create_fragment(kind, &draft)).await?;
    Ok((StatusCode::CREATED, created))
}

async fn get_fragment(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> ApiResult<QueryFragment> {
    let kind = fragment_kind(&kind)?;
    blocking(move || state.config.get_fragment(kind, id)).await
}

async fn update_fragment(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(draft): Json<FragmentDraft>,
) -> ApiResult<QueryFragment> {
    let kind = fragment_kind(&kind)?;
    blocking(move || state.config.update_fragment(kind, id, &draft)).await
}

async fn delete_fragment(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let kind = fragment_kind(&kind)?;
    blocking(move || state.config.delete_fragment(kind, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Always answers 200; failures are reported inside the result.
async fn preview(State(state): State<AppState>, Json(request): Json<PreviewRequest>) -> ApiResult<PreviewResult> {
    blocking(move || Ok(state.config.preview(&request))).await
}

async fn list_rules(State(state): State<AppState>) -> ApiResult<Vec<IndicatorRule>> {
    blocking(move || state.config.list_rules()).await
}

async fn list_rules_by_context(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> ApiResult<Vec<IndicatorRule>> {
    blocking(move || state.config.list_rules_by_context(&context)).await
}

async fn create_rule(
    State(state): State<AppState>,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<IndicatorRule>), ApiError> {
    let created = blocking(move || state.config.create_rule(&draft)).await?;
    Ok((StatusCode::CREATED, created))
}

async fn get_rule(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<IndicatorRule> {
    blocking(move || state.config.get_rule(id)).await
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<IndicatorRule> {
    blocking(move || state.config.update_rule(id, &draft)).await
}

async fn delete_rule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    blocking(move || state.config.delete_rule(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    Router::new()
        .route("/api/customers/search", post(search_customers))
        .route("/api/queries/:context/available", get(available_queries))
        .route("/api/admin/queries/preview", post(preview))
        .route("/api/admin/queries/:kind", get(list_fragments).post(create_fragment))
        .route(
            "/api/admin/queries/:kind/:id",
            get(get_fragment).put(update_fragment).delete(delete_fragment),
        )
        .route("/api/indicator-rules", get(list_rules).post(create_rule))
        .route("/api/indicator-rules/context/:context", get(list_rules_by_context))
        .route(
            "/api/indicator-rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .layer(cors)
        .with_state(state)
}
