//! End-to-end tests of the HTTP API against the in-memory index backend.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use portal_search::analytics::{AnalyticsStore, Recorder, SqliteAnalytics};
use portal_search::auth::{create_user, ensure_admin, Role, MIN_PASSWORD_COST};
use portal_search::config::Config;
use portal_search::error::{PortalError, PortalResult};
use portal_search::index::{IndexService, MemoryIndex};
use portal_search::models::SearchAnalyticsEvent;
use portal_search::server::{router, AppState};
use portal_search::{db, migrate};

struct Harness {
    _tmp: TempDir,
    app: Router,
    pool: SqlitePool,
    index: Arc<MemoryIndex>,
}

fn test_config(tmp: &TempDir) -> Config {
    let toml = format!(
        r#"[db]
path = "{}/portal.sqlite"

[index]
backend = "memory"
task_timeout_ms = 200
task_poll_ms = 10

[auth]
token_secret = "integration-secret"

[server]
public_url = "https://search.example.com"
"#,
        tmp.path().display()
    );
    toml::from_str(&toml).unwrap()
}

async fn harness_with(store: Option<Arc<dyn AnalyticsStore>>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let pool = db::connect(&config.db).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    ensure_admin(&pool, "admin", "admin123", MIN_PASSWORD_COST)
        .await
        .unwrap();
    create_user(&pool, "tech", "techpass", Role::Technical, MIN_PASSWORD_COST)
        .await
        .unwrap();

    let store = store.unwrap_or_else(|| Arc::new(SqliteAnalytics::new(pool.clone())));
    let (recorder, _worker) = Recorder::spawn(store, 64);

    let index = Arc::new(MemoryIndex::new());
    let service: Arc<dyn IndexService> = index.clone();
    let app = router(AppState::new(config, pool.clone(), service, recorder));

    Harness {
        _tmp: tmp,
        app,
        pool,
        index,
    }
}

async fn harness() -> Harness {
    harness_with(None).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        with_json(
            "POST",
            "/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn wait_for_events(pool: &SqlitePool, expected: u64) -> u64 {
    let analytics = SqliteAnalytics::new(pool.clone());
    for _ in 0..100 {
        let n = analytics.count().await.unwrap();
        if n >= expected {
            return n;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    analytics.count().await.unwrap()
}

async fn insert_event(pool: &SqlitePool, query: &str, results: u64) {
    SqliteAnalytics::new(pool.clone())
        .insert(&SearchAnalyticsEvent {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.to_string(),
            results_count: results,
            user_ip: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
            created_at: chrono::Utc::now().timestamp(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_sample_data_then_search_portal() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;

    let (status, body) = send(&h.app, bare("POST", "/search-init", &token)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["documentsAdded"], 8);
    assert_eq!(body["tasks"]["addDocuments"]["status"], "succeeded");

    let (status, body) = send(&h.app, get("/search?q=portal", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["estimatedTotalHits"].as_u64().unwrap() >= 1);
    let hits = body["hits"].as_array().unwrap();
    assert!(hits.iter().any(|hit| hit["name"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("portal")));
    assert_eq!(body["query"], "portal");
    assert_eq!(body["indexName"], "internal_sites");

    // Seeding twice is a conflict.
    let (status, _) = send(&h.app, bare("POST", "/search-init", &token)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_created_site_is_searchable() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;

    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/developer/sites",
            Some(&token),
            json!({ "name": "Finance Hub", "url": "https://finance.example.com", "type": "system" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["sync"]["status"], "synced");
    assert_eq!(body["sync"]["syncedCount"], 1);
    let id = body["site"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, get("/search?q=finance", None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![id.as_str()]);
}

#[tokio::test]
async fn test_index_mirrors_sites_after_edits() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;

    let mut ids = Vec::new();
    for (name, url) in [
        ("Wiki", "https://wiki.example.com"),
        ("Jira", "https://jira.example.com"),
        ("Grafana", "https://grafana.example.com"),
    ] {
        let (_, body) = send(
            &h.app,
            with_json(
                "POST",
                "/developer/sites",
                Some(&token),
                json!({ "name": name, "url": url }),
            ),
        )
        .await;
        ids.push(body["site"]["id"].as_str().unwrap().to_string());
    }

    let (status, body) = send(
        &h.app,
        with_json(
            "PUT",
            &format!("/developer/sites/{}", ids[1]),
            Some(&token),
            json!({ "name": "Issue Tracker", "url": "https://jira.example.com", "type": "system" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = send(
        &h.app,
        bare("DELETE", &format!("/developer/sites/{}", ids[0]), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["syncedCount"], 2);

    let (status, body) = send(&h.app, bare("POST", "/sync", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["syncedCount"], 2);

    let (_, body) = send(&h.app, get("/documents?index=internal_sites", Some(&token))).await;
    let mut docs: Vec<(String, String)> = body["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| {
            (
                d["id"].as_str().unwrap().to_string(),
                d["name"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    docs.sort();
    let mut expected = vec![
        (ids[1].clone(), "Issue Tracker".to_string()),
        (ids[2].clone(), "Grafana".to_string()),
    ];
    expected.sort();
    assert_eq!(docs, expected);
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_short_suggestion_skips_index() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/suggestions?q=p", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["p", []]));
    // No index exists; a lookup would have failed and been logged, not
    // produced this shape.
    assert!(h.index.list_indexes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_suggestions_return_names() {
    let h = harness().await;
    let token = login(&h.app, "admin", "admin123").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    let (status, body) = send(&h.app, get("/suggestions?q=employee", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0], "employee");
    let names = body[1].as_array().unwrap();
    assert!(!names.is_empty());
    assert!(names.iter().all(|n| n.is_string()));
    assert_eq!(body[2], json!([]));
    assert_eq!(body[3], json!([]));
}

#[tokio::test]
async fn test_empty_query_browses() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    let (status, body) = send(&h.app, get("/search?limit=3", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hits"].as_array().unwrap().len() <= 3);
    assert_eq!(body["query"], "");
}

#[tokio::test]
async fn test_search_errors() {
    let h = harness().await;

    let (status, body) = send(&h.app, get("/search?q=x", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("internal_sites"));

    let (status, _) = send(&h.app, get("/search?limit=abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = login(&h.app, "tech", "techpass").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    let (status, body) = send(
        &h.app,
        with_json("POST", "/search", None, json!({ "query": "portal", "filter": "url = x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid filter"));

    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/search",
            None,
            json!({ "query": "", "filter": "type = system", "facets": ["type"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hits"]
        .as_array()
        .unwrap()
        .iter()
        .all(|hit| hit["type"] == "system"));
    assert!(body["facetDistribution"]["type"]["system"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_searches_are_recorded() {
    let h = harness().await;
    let token = login(&h.app, "admin", "admin123").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    let req = Request::builder()
        .uri("/search?q=%20portal%20")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .header(header::USER_AGENT, "Mozilla/5.0")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);

    // Blank queries are not recorded.
    send(&h.app, get("/search?q=", None)).await;
    // Suggestions are not recorded.
    send(&h.app, get("/suggestions?q=portal", None)).await;

    assert_eq!(wait_for_events(&h.pool, 1).await, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(SqliteAnalytics::new(h.pool.clone()).count().await.unwrap(), 1);

    let (events, _) = SqliteAnalytics::new(h.pool.clone())
        .events_since(1)
        .await
        .unwrap();
    assert_eq!(events[0].query, "portal");
    assert_eq!(events[0].user_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(events[0].user_agent.as_deref(), Some("Mozilla/5.0"));
    assert!(events[0].results_count >= 1);
}

struct BrokenStore;

#[async_trait]
impl AnalyticsStore for BrokenStore {
    async fn insert(&self, _event: &SearchAnalyticsEvent) -> PortalResult<()> {
        Err(PortalError::upstream("Failed to record search", "disk full"))
    }
}

#[tokio::test]
async fn test_analytics_failure_does_not_affect_search() {
    let h = harness_with(Some(Arc::new(BrokenStore))).await;
    let token = login(&h.app, "tech", "techpass").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    for _ in 0..5 {
        let (status, body) = send(&h.app, get("/search?q=portal", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["estimatedTotalHits"].as_u64().unwrap() >= 1);
    }
}

#[tokio::test]
async fn test_teardown_twice() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;
    send(&h.app, bare("POST", "/search-init", &token)).await;

    let (status, _) = send(&h.app, bare("DELETE", "/search-init", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, bare("DELETE", "/search-init", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Index not found or already deleted");
}

#[tokio::test]
async fn test_overview_top_and_zero_result_queries() {
    let h = harness().await;
    insert_event(&h.pool, "portal", 5).await;
    insert_event(&h.pool, "portal", 5).await;
    insert_event(&h.pool, "portal", 0).await;
    insert_event(&h.pool, "xyz", 0).await;

    let token = login(&h.app, "admin", "admin123").await;
    let (status, body) = send(&h.app, get("/analytics?days=7", Some(&token))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    assert_eq!(body["overview"]["totalSearches"], 4);
    assert_eq!(body["overview"]["uniqueQueries"], 2);
    assert_eq!(
        body["topQueries"],
        json!([{ "query": "portal", "count": 2, "avg_results": 5.0 }])
    );
    let zero = body["noResultQueries"].as_array().unwrap();
    assert!(zero.contains(&json!({ "query": "portal", "count": 1 })));
    assert!(zero.contains(&json!({ "query": "xyz", "count": 1 })));
}

#[tokio::test]
async fn test_csv_export_escapes_quotes() {
    let h = harness().await;
    let query = r#"say "hello", world"#;
    insert_event(&h.pool, query, 3).await;

    let token = login(&h.app, "admin", "admin123").await;
    let resp = h
        .app
        .clone()
        .oneshot(with_json(
            "POST",
            "/analytics",
            Some(&token),
            json!({ "format": "csv", "days": 30 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
    let disposition = resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"search-analytics-"));

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Date,Query,Results Count,User IP,User Agent"));
    let fields = parse_csv_line(lines.next().unwrap());
    assert_eq!(fields[1], query);
    assert_eq!(fields[2], "3");
}

/// Minimal RFC 4180 field splitter for one record.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[tokio::test]
async fn test_json_export() {
    let h = harness().await;
    insert_event(&h.pool, "payroll", 2).await;
    let token = login(&h.app, "admin", "admin123").await;

    let (status, body) = send(
        &h.app,
        with_json("POST", "/analytics", Some(&token), json!({ "format": "json" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recordCount"], 1);
    assert_eq!(body["data"][0]["query"], "payroll");
    assert!(body["exportDate"].is_string());

    let (status, _) = send(
        &h.app,
        with_json("POST", "/analytics", Some(&token), json!({ "format": "xml" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capabilities() {
    let h = harness().await;

    let (status, body) = send(&h.app, get("/developer/sites", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(&h.app, get("/developer/sites", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let tech = login(&h.app, "tech", "techpass").await;
    let (status, _) = send(&h.app, get("/developer/sites", Some(&tech))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.app, get("/analytics", Some(&tech))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.app,
        with_json(
            "POST",
            "/auth/login",
            None,
            json!({ "username": "tech", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_site_validation_and_not_found() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;

    let (status, body) = send(
        &h.app,
        with_json("POST", "/developer/sites", Some(&token), json!({ "name": "No URL" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Name and URL are required");

    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/developer/sites",
            Some(&token),
            json!({ "name": "Bad", "url": "not a url" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid URL format");

    let (status, _) = send(&h.app, get("/developer/sites/missing", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.app, bare("DELETE", "/developer/sites/missing", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_site_write_survives_stuck_index() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;
    h.index.hold_tasks(true);

    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/developer/sites",
            Some(&token),
            json!({ "name": "HR", "url": "https://hr.example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sync"]["status"], "failed");

    let (_, body) = send(&h.app, get("/developer/sites", Some(&token))).await;
    assert_eq!(body["pagination"]["total"], 1);

    let (status, _) = send(&h.app, bare("POST", "/sync", &token)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_document_administration() {
    let h = harness().await;
    let token = login(&h.app, "tech", "techpass").await;

    let (status, body) = send(
        &h.app,
        with_json("POST", "/index", Some(&token), json!({ "indexName": "products" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let doc = json!({
        "id": "p1",
        "name": "Laptop",
        "url": "https://shop.example.com/p1",
        "description": "Standard issue laptop",
        "type": "system"
    });
    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/documents",
            Some(&token),
            json!({ "indexName": "products", "documents": [doc.clone()] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["documentsCount"], 1);

    let (_, body) = send(&h.app, get("/documents?index=products", Some(&token))).await;
    assert_eq!(body["documents"][0], doc);

    let (_, body) = send(
        &h.app,
        with_json(
            "POST",
            "/search",
            None,
            json!({ "indexName": "products", "attributesToRetrieve": ["id", "name", "url", "description", "type"] }),
        ),
    )
    .await;
    assert_eq!(body["hits"][0]["name"], "Laptop");
    assert_eq!(body["hits"][0]["description"], "Standard issue laptop");

    let (status, body) = send(
        &h.app,
        with_json(
            "POST",
            "/documents",
            Some(&token),
            json!({ "indexName": "products", "documents": [] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Documents array is required and must not be empty");

    let (status, _) = send(
        &h.app,
        with_json(
            "DELETE",
            "/documents",
            Some(&token),
            json!({ "indexName": "products", "documentIds": "p1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&h.app, get("/index?name=products", Some(&token))).await;
    assert_eq!(body["stats"]["numberOfDocuments"], 0);

    let (_, body) = send(&h.app, get("/indexes", Some(&token))).await;
    assert_eq!(body["total"], 1);

    // Raw writes to the synchronized index are refused.
    let (status, _) = send(
        &h.app,
        with_json(
            "POST",
            "/documents",
            Some(&token),
            json!({ "indexName": "internal_sites", "documents": [doc] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&h.app, bare("DELETE", "/index?name=products", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.app, bare("DELETE", "/index?name=products", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_opensearch() {
    let h = harness().await;

    let resp = h
        .app
        .clone()
        .oneshot(get("/opensearch-description.xml", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "application/opensearchdescription+xml"
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains("https://search.example.com/suggestions?q={searchTerms}"));

    let resp = h
        .app
        .clone()
        .oneshot(get("/opensearch/search?q=%20vpn%20", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/search?q=vpn");

    let resp = h
        .app
        .clone()
        .oneshot(get("/opensearch/search?q=", None))
        .await
        .unwrap();
    assert_eq!(resp.headers()[header::LOCATION], "/");
}
