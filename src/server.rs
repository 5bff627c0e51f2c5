//! HTTP API for the search portal.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | - | Health check (returns version) |
//! | `GET`  | `/search` | - | Search with query-string parameters |
//! | `POST` | `/search` | - | Search with a JSON body (sort, facets, attribute lists) |
//! | `GET`  | `/suggestions` | - | OpenSearch suggestions array |
//! | `GET`  | `/opensearch-description.xml` | - | OpenSearch provider descriptor |
//! | `GET`  | `/opensearch/search` | - | Redirect to the results page |
//! | `POST` | `/auth/login` | - | Exchange username/password for a token |
//! | `POST` `GET` `DELETE` | `/index` | manage-sites | Create, inspect, delete an index |
//! | `GET`  | `/indexes` | manage-sites | List indexes |
//! | `POST` `GET` `DELETE` | `/documents` | manage-sites | Raw document administration |
//! | `POST` | `/sync` | manage-sites | Rebuild the site index |
//! | `POST` `DELETE` | `/search-init` | manage-sites | Seed or tear down the site index |
//! | `GET` `POST` | `/analytics` | view-analytics | Overview report / export |
//! | `GET` `POST` | `/developer/sites` | manage-sites | List / create sites |
//! | `GET` `PUT` `DELETE` | `/developer/sites/{id}` | manage-sites | Read / update / delete a site |
//!
//! Authenticated routes take `Authorization: Bearer <token>`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Search service unavailable", "details": "connection refused" }
//! ```
//!
//! Status codes: 400 validation and invalid filters, 401 missing or
//! insufficient credentials, 404 unknown index or site, 409 conflicts,
//! 500 index or database failures. `details` is only present on 5xx.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser
//! front-end can be served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analytics::{CallerInfo, Recorder, SqliteAnalytics};
use crate::auth::{has_role, Authenticator, Capability, Principal, TokenAuthenticator, TokenSigner};
use crate::config::Config;
use crate::error::{PortalError, PortalResult};
use crate::export::{build_export, ExportFormat};
use crate::index::{create_index_service, is_valid_uid, wait_for_task, IndexService, TaskWait};
use crate::opensearch;
use crate::search::{QueryExecutor, SearchParams};
use crate::sites::{SiteInput, SiteSource, SiteStore, DEFAULT_PAGE_SIZE};
use crate::suggest::IndexSuggester;
use crate::sync::{Synchronizer, PRIMARY_KEY};
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    index: Arc<dyn IndexService>,
    executor: Arc<QueryExecutor>,
    suggester: Arc<IndexSuggester>,
    synchronizer: Arc<Synchronizer>,
    sites: SiteStore,
    analytics: SqliteAnalytics,
    auth: Arc<TokenAuthenticator>,
    wait: TaskWait,
}

impl AppState {
    /// Wire every service around one pool, one index client and one
    /// analytics recorder.
    pub fn new(config: Config, pool: SqlitePool, index: Arc<dyn IndexService>, recorder: Recorder) -> Self {
        let signer = match config.auth.resolved_secret() {
            Some(secret) => TokenSigner::new(secret, config.auth.token_ttl_hours),
            None => {
                tracing::warn!(
                    "no [auth].token_secret or PORTAL_TOKEN_SECRET set; tokens will not survive a restart"
                );
                TokenSigner::ephemeral(config.auth.token_ttl_hours)
            }
        };

        let sites = SiteStore::new(pool.clone());
        let site_source: Arc<dyn SiteSource> = Arc::new(sites.clone());
        let wait = TaskWait::from_config(&config.index);

        Self {
            executor: Arc::new(QueryExecutor::new(index.clone(), Some(recorder), &config)),
            suggester: Arc::new(IndexSuggester::new(
                index.clone(),
                config.index.name.clone(),
                &config.suggestions,
            )),
            synchronizer: Arc::new(Synchronizer::new(
                index.clone(),
                site_source,
                config.index.name.clone(),
                wait,
            )),
            sites,
            analytics: SqliteAnalytics::new(pool.clone()),
            auth: Arc::new(TokenAuthenticator::new(pool, signer)),
            index,
            wait,
            config: Arc::new(config),
        }
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search_get).post(handle_search_post))
        .route("/suggestions", get(handle_suggestions))
        .route("/opensearch-description.xml", get(handle_opensearch_description))
        .route("/opensearch/search", get(handle_opensearch_search))
        .route("/auth/login", post(handle_login))
        .route(
            "/index",
            post(handle_create_index)
                .get(handle_index_stats)
                .delete(handle_delete_index),
        )
        .route("/indexes", get(handle_list_indexes))
        .route(
            "/documents",
            post(handle_add_documents)
                .get(handle_get_documents)
                .delete(handle_delete_documents),
        )
        .route("/sync", post(handle_sync))
        .route(
            "/search-init",
            post(handle_search_init).delete(handle_search_teardown),
        )
        .route(
            "/analytics",
            get(handle_analytics_overview).post(handle_analytics_export),
        )
        .route(
            "/developer/sites",
            get(handle_list_sites).post(handle_create_site),
        )
        .route(
            "/developer/sites/{id}",
            get(handle_get_site)
                .put(handle_update_site)
                .delete(handle_delete_site),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Opens the database (running migrations), connects the configured index
/// backend, starts the analytics worker, and serves on `[server].bind`
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;

    let index = create_index_service(&config.index)?;
    let (recorder, _analytics_worker) = Recorder::spawn(
        Arc::new(SqliteAnalytics::new(pool.clone())),
        config.analytics.queue_capacity,
    );

    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), pool, index, recorder));

    tracing::info!(
        bind = %bind_addr,
        backend = %config.index.backend,
        index = %config.index.name,
        "portal server listening"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            PortalError::Timeout(details) => {
                tracing::error!(details = %details, "index task timed out");
            }
            PortalError::Upstream { message, details } => {
                tracing::error!(details = %details, "{}", message);
            }
            _ => {}
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> PortalResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| PortalError::validation(format!("Invalid JSON body: {}", e.body_text())))
}

fn parse_number(name: &str, raw: Option<&str>) -> PortalResult<Option<usize>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse::<usize>().map(Some).map_err(|_| {
            PortalError::validation(format!("{} must be a non-negative integer", name))
        }),
    }
}

fn require_index_name(name: Option<&str>) -> PortalResult<String> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(PortalError::validation("Index name is required"));
    }
    if !is_valid_uid(name) {
        return Err(PortalError::validation(format!("Invalid index name '{}'", name)));
    }
    Ok(name.to_string())
}

fn caller_info(headers: &HeaderMap) -> CallerInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_str("x-real-ip"))
        .map(str::to_string);
    CallerInfo {
        ip,
        user_agent: header_str("user-agent").map(str::to_string),
    }
}

async fn require(state: &AppState, headers: &HeaderMap, capability: Capability) -> PortalResult<Principal> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(PortalError::Unauthorized)?;

    let principal = state
        .auth
        .authenticate(token)
        .await
        .ok_or(PortalError::Unauthorized)?;

    if !has_role(&principal, capability) {
        tracing::warn!(user = %principal.username, ?capability, "insufficient role");
        return Err(PortalError::Unauthorized);
    }
    Ok(principal)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET|POST /search ============

#[derive(Deserialize)]
struct SearchQueryString {
    q: Option<String>,
    index: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    filter: Option<String>,
}

async fn handle_search_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(qs): Query<SearchQueryString>,
) -> PortalResult<impl IntoResponse> {
    let params = SearchParams {
        query: qs.q,
        index_name: qs.index,
        limit: parse_number("limit", qs.limit.as_deref())?,
        offset: parse_number("offset", qs.offset.as_deref())?,
        filter: qs.filter,
        ..SearchParams::default()
    };
    let outcome = state.executor.execute(&params, &caller_info(&headers)).await?;
    Ok(Json(outcome))
}

async fn handle_search_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    let params = body(payload)?;
    let outcome = state.executor.execute(&params, &caller_info(&headers)).await?;
    Ok(Json(outcome))
}

// ============ GET /suggestions ============

#[derive(Deserialize)]
struct SuggestionsQuery {
    q: Option<String>,
}

async fn handle_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> Json<Value> {
    Json(state.suggester.suggest(query.q.as_deref()).await)
}

// ============ OpenSearch ============

fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.server.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", proto, host)
}

async fn handle_opensearch_description(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> PortalResult<Response> {
    let xml = opensearch::descriptor_xml(&base_url(&state, &headers))
        .map_err(|e| PortalError::upstream("Failed to render OpenSearch descriptor", e))?;
    Ok((
        [
            (header::CONTENT_TYPE, opensearch::CONTENT_TYPE),
            (header::CACHE_CONTROL, opensearch::CACHE_CONTROL),
        ],
        xml,
    )
        .into_response())
}

async fn handle_opensearch_search(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> Redirect {
    Redirect::to(&opensearch::redirect_target(
        query.q.as_deref(),
        &state.config.server.results_page,
    ))
}

// ============ POST /auth/login ============

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    let req = body(payload)?;
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(PortalError::validation("Username and password are required"));
    };
    let (token, user) = state.auth.login(username.trim(), &password).await?;
    Ok(Json(json!({ "token": token, "user": user })))
}

// ============ /index, /indexes ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexRequest {
    index_name: Option<String>,
    primary_key: Option<String>,
}

#[derive(Deserialize)]
struct IndexNameQuery {
    name: Option<String>,
}

async fn handle_create_index(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateIndexRequest>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let req = body(payload)?;
    let name = require_index_name(req.index_name.as_deref())?;
    let primary_key = req
        .primary_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| PRIMARY_KEY.to_string());

    let task = state.index.create_index(&name, &primary_key).await?;
    tracing::info!(index = %name, task_uid = task.task_uid, "index creation enqueued");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Index created successfully", "indexName": name, "task": task })),
    ))
}

async fn handle_index_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IndexNameQuery>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let name = require_index_name(query.name.as_deref())?;
    let stats = state.index.get_stats(&name).await?;
    Ok(Json(json!({ "indexName": name, "stats": stats })))
}

async fn handle_delete_index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IndexNameQuery>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let name = require_index_name(query.name.as_deref())?;
    let task = state.index.delete_index(&name).await?;
    Ok(Json(json!({
        "message": format!("Index '{}' deleted successfully", name),
        "task": task,
    })))
}

async fn handle_list_indexes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let indexes = state.index.list_indexes().await?;
    let total = indexes.len();
    Ok(Json(json!({ "indexes": indexes, "total": total })))
}

// ============ /documents ============

/// Raw document writes may not target the synchronized site index.
fn guard_synchronized(state: &AppState, name: &str) -> PortalResult<()> {
    if name == state.config.index.name {
        return Err(PortalError::Conflict(format!(
            "Index '{}' is maintained by site synchronization; manage it through /developer/sites",
            name
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddDocumentsRequest {
    index_name: Option<String>,
    documents: Option<Vec<Value>>,
}

async fn handle_add_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AddDocumentsRequest>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let req = body(payload)?;
    let name = require_index_name(req.index_name.as_deref())?;
    let documents = req.documents.unwrap_or_default();
    if documents.is_empty() {
        return Err(PortalError::validation(
            "Documents array is required and must not be empty",
        ));
    }
    if documents.iter().any(|d| !d.is_object()) {
        return Err(PortalError::validation("Every document must be a JSON object"));
    }
    guard_synchronized(&state, &name)?;

    let task = state.index.add_documents(&name, &documents, None).await?;
    let task = wait_for_task(state.index.as_ref(), &task, state.wait).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Successfully added {} documents to index '{}'", documents.len(), name),
            "task": task,
            "documentsCount": documents.len(),
        })),
    ))
}

#[derive(Deserialize)]
struct GetDocumentsQuery {
    index: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

async fn handle_get_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GetDocumentsQuery>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let name = require_index_name(query.index.as_deref())?;
    let limit = parse_number("limit", query.limit.as_deref())?.unwrap_or(20);
    let offset = parse_number("offset", query.offset.as_deref())?.unwrap_or(0);
    if limit > state.config.search.max_limit {
        return Err(PortalError::validation(format!(
            "limit must be at most {}",
            state.config.search.max_limit
        )));
    }

    let page = state.index.get_documents(&name, limit, offset).await?;
    Ok(Json(json!({
        "indexName": name,
        "documents": page.results,
        "pagination": { "limit": limit, "offset": offset, "total": page.total },
    })))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentIds {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteDocumentsRequest {
    index_name: Option<String>,
    document_ids: Option<DocumentIds>,
}

async fn handle_delete_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeleteDocumentsRequest>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let req = body(payload)?;
    let name = require_index_name(req.index_name.as_deref())?;
    let ids = match req.document_ids {
        Some(DocumentIds::One(id)) if !id.is_empty() => vec![id],
        Some(DocumentIds::Many(ids)) if !ids.is_empty() => ids,
        _ => {
            return Err(PortalError::validation(
                "Document IDs are required (string or array)",
            ))
        }
    };
    guard_synchronized(&state, &name)?;

    let task = state.index.delete_documents(&name, &ids).await?;
    let task = wait_for_task(state.index.as_ref(), &task, state.wait).await?;
    Ok(Json(json!({
        "message": format!("Successfully deleted documents from index '{}'", name),
        "task": task,
    })))
}

// ============ POST /sync, /search-init ============

async fn handle_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> PortalResult<impl IntoResponse> {
    let user = require(&state, &headers, Capability::ManageSites).await?;
    let synced = state.synchronizer.full_resync().await?;
    tracing::info!(user = %user.username, synced, "manual resync");
    Ok(Json(json!({
        "message": "Search index synchronized successfully",
        "syncedCount": synced,
    })))
}

async fn handle_search_init(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let report = state.synchronizer.initialize_with_sample_data().await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Successfully initialized search index with sample data",
            "indexName": report.index_name,
            "documentsAdded": report.documents_added,
            "tasks": {
                "createIndex": { "taskUid": report.create_task.task_uid, "status": report.create_task.status },
                "addDocuments": { "taskUid": report.add_task.task_uid, "status": report.add_task.status },
            },
        })),
    ))
}

async fn handle_search_teardown(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    state.synchronizer.teardown().await.map_err(|e| match e {
        PortalError::NotFound(_) => PortalError::NotFound("Index not found or already deleted".to_string()),
        other => other,
    })?;
    Ok(Json(json!({
        "message": format!("Successfully deleted the {} index", state.synchronizer.index_name()),
    })))
}

// ============ /analytics ============

#[derive(Deserialize)]
struct OverviewQuery {
    days: Option<String>,
    limit: Option<String>,
}

fn positive_u32(name: &str, raw: Option<usize>, default: u32) -> PortalResult<u32> {
    match raw {
        None => Ok(default),
        Some(0) => Err(PortalError::validation(format!("{} must be >= 1", name))),
        Some(n) => u32::try_from(n)
            .map_err(|_| PortalError::validation(format!("{} is too large", name))),
    }
}

async fn handle_analytics_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OverviewQuery>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ViewAnalytics).await?;
    let days = positive_u32(
        "days",
        parse_number("days", query.days.as_deref())?,
        state.config.analytics.default_days,
    )?;
    let limit = positive_u32(
        "limit",
        parse_number("limit", query.limit.as_deref())?,
        state.config.analytics.default_limit,
    )?;
    Ok(Json(state.analytics.overview(days, limit).await?))
}

#[derive(Deserialize, Default)]
struct ExportRequest {
    format: Option<String>,
    days: Option<usize>,
}

async fn handle_analytics_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> PortalResult<Response> {
    require(&state, &headers, Capability::ViewAnalytics).await?;
    let req = body(payload)?;
    let format = match req.format.as_deref() {
        None => ExportFormat::default(),
        Some(f) => f.parse::<ExportFormat>().map_err(PortalError::Validation)?,
    };
    let days = positive_u32("days", req.days, state.config.analytics.export_days)?;

    let file = build_export(&state.analytics, format, days).await?;
    let response = match format {
        ExportFormat::Csv => (
            [
                (header::CONTENT_TYPE, format.mime_type().to_string()),
                (header::CONTENT_DISPOSITION, file.content_disposition()),
            ],
            file.body,
        )
            .into_response(),
        ExportFormat::Json => (
            [(header::CONTENT_TYPE, format.mime_type().to_string())],
            file.body,
        )
            .into_response(),
    };
    Ok(response)
}

// ============ /developer/sites ============

#[derive(Deserialize)]
struct ListSitesQuery {
    page: Option<String>,
    limit: Option<String>,
    search: Option<String>,
}

async fn handle_list_sites(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListSitesQuery>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let page = positive_u32("page", parse_number("page", query.page.as_deref())?, 1)?;
    let limit = positive_u32(
        "limit",
        parse_number("limit", query.limit.as_deref())?,
        DEFAULT_PAGE_SIZE,
    )?;
    Ok(Json(
        state
            .sites
            .list_page(page, limit, query.search.as_deref())
            .await?,
    ))
}

async fn handle_create_site(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SiteInput>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    let user = require(&state, &headers, Capability::ManageSites).await?;
    let fields = body(payload)?.validate()?;
    let site = state.sites.create(&user, &fields).await?;
    let sync = state.synchronizer.resync_after_write().await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Site created successfully", "site": site, "sync": sync })),
    ))
}

async fn handle_get_site(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> PortalResult<impl IntoResponse> {
    require(&state, &headers, Capability::ManageSites).await?;
    let site = state
        .sites
        .get(&id)
        .await?
        .ok_or_else(|| PortalError::NotFound("Site not found".to_string()))?;
    Ok(Json(json!({ "site": site })))
}

async fn handle_update_site(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<SiteInput>, JsonRejection>,
) -> PortalResult<impl IntoResponse> {
    let user = require(&state, &headers, Capability::ManageSites).await?;
    let fields = body(payload)?.validate()?;
    let site = state.sites.update(&user, &id, &fields).await?;
    let sync = state.synchronizer.resync_after_write().await;
    Ok(Json(json!({ "message": "Site updated successfully", "site": site, "sync": sync })))
}

async fn handle_delete_site(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> PortalResult<impl IntoResponse> {
    let user = require(&state, &headers, Capability::ManageSites).await?;
    state.sites.delete(&user, &id).await?;
    let sync = state.synchronizer.resync_after_write().await;
    Ok(Json(json!({ "message": "Site deleted successfully", "sync": sync })))
}
