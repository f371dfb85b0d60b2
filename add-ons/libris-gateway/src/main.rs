//! Axum-based API gateway for the bookstore assistant. Config-driven via CoreConfig.

mod handlers;

use axum::{
    extract::{Path, State},
    http::Method,
    routing::{get, post},
    Json, Router,
};
use handlers::{books, chat};
use libris_core::{
    ingest_catalog, initialize_store_faq, BookCatalog, ContextManager, CoreConfig, Dispatcher,
    KnowledgeStore,
};
use libris_skills::{LexicalRetriever, ModelRouter, RecommendationEngine, RegexIntentClassifier};
use std::path::Path as StdPath;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const KNOWLEDGE_DIR: &str = "libris_knowledge";

/// Pre-flight check: config, knowledge DB, catalog file and port.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    println!(
        "Config OK (thresholds high {} / min {} / low {})",
        config.dispatch.high_threshold, config.dispatch.min_threshold, config.dispatch.low_threshold
    );

    let kb_path = StdPath::new(&config.storage_path).join(KNOWLEDGE_DIR);
    print!("Checking {}... ", kb_path.display());
    let kb = KnowledgeStore::open_path(&kb_path)
        .map_err(|e| format!("knowledge DB LOCKED or inaccessible: {}", e))?;
    let entries = kb.count().map_err(|e| format!("knowledge DB unreadable: {}", e))?;
    drop(kb);
    println!("OK ({} entries)", entries);

    print!("Checking catalog {}... ", config.catalog_path);
    let catalog = BookCatalog::load_path(&config.catalog_path)
        .map_err(|e| format!("catalog unreadable: {}", e))?;
    println!("OK ({} books)", catalog.len());

    let addr = config
        .bind_addr()
        .map_err(|e| format!("invalid host {:?}: {}", config.host, e))?;
    print!("Checking {}... ", addr);
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("{} BLOCKED: {}", addr, e));
        }
    }

    println!("\nSUCCESS: all checks passed. Ready to start gateway.");
    Ok(())
}

/// Opens the knowledge DB, ingests FAQs and the catalog, and wires the dispatcher.
fn bootstrap(config: Arc<CoreConfig>) -> Result<AppState, BoxError> {
    let catalog = Arc::new(BookCatalog::load_path(&config.catalog_path)?);

    let knowledge = KnowledgeStore::open_path(StdPath::new(&config.storage_path).join(KNOWLEDGE_DIR))?;
    match initialize_store_faq(&knowledge) {
        Ok(true) => tracing::info!(target: "libris::knowledge", "baseline FAQ installed"),
        Ok(false) => tracing::debug!(target: "libris::knowledge", "baseline FAQ already present"),
        Err(e) => tracing::warn!(target: "libris::knowledge", error = %e, "failed to install baseline FAQ"),
    }
    let added = ingest_catalog(&knowledge, &catalog)?;
    let index = knowledge.snapshot()?;
    tracing::info!(
        target: "libris::knowledge",
        entries = index.len(),
        new_books = added,
        "knowledge index ready"
    );

    let policy = config.dispatch.clone();
    let generator = ModelRouter::from_config(&config);
    let llm_mode = generator.mode().as_str();
    let contexts = Arc::new(ContextManager::new(policy.max_turns, policy.session_ttl()));
    let dispatcher = Dispatcher::new(
        policy.clone(),
        Arc::new(RegexIntentClassifier::new()),
        Arc::new(LexicalRetriever::new(index, policy.min_relevance)),
        Arc::new(generator),
        contexts,
    )?;

    Ok(AppState {
        config,
        dispatcher: Arc::new(dispatcher),
        recommender: Arc::new(RecommendationEngine::new(catalog)),
        llm_mode,
    })
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[libris-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(target: "libris::gateway", error = %e, "configuration rejected");
            std::process::exit(1);
        }
    };
    let state = match bootstrap(Arc::clone(&config)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(target: "libris::gateway", error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    tokio::spawn(session_janitor(
        Arc::clone(state.dispatcher.contexts()),
        janitor_period(config.dispatch.session_ttl()),
    ));

    let app = build_app(state);
    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(target: "libris::gateway", host = %config.host, error = %e, "invalid bind address");
            std::process::exit(1);
        }
    };
    tracing::info!(target: "libris::gateway", llm_mode = %config.llm_mode, "{} listening on {}", config.app_name, addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "libris::gateway", %addr, error = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(target: "libris::gateway", error = %e, "server stopped");
    }
}

fn janitor_period(ttl: Duration) -> Duration {
    (ttl / 4).max(Duration::from_secs(1))
}

/// Drops idle sessions once their TTL has passed.
async fn session_janitor(contexts: Arc<ContextManager>, period: Duration) {
    tracing::info!(
        target: "libris::context",
        period_secs = period.as_secs(),
        "session janitor started"
    );
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let removed = contexts.purge_expired();
        tracing::debug!(
            target: "libris::context",
            removed,
            active = contexts.session_count(),
            "session janitor tick"
        );
    }
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat::chat))
        .route("/api/v1/chat", post(chat::chat))
        .route("/books", get(books::list_books))
        .route("/books/recommend", get(books::recommend))
        .route("/books/genre/:genre", get(books::books_by_genre))
        .route("/books/author/:author", get(books::books_by_author))
        .route("/books/:id", get(books::get_book))
        .route("/ai/stats", get(ai_stats))
        .route("/ai/stats/reset", post(reset_stats))
        .route("/ai/classify/:message", get(classify))
        .with_state(state)
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) recommender: Arc<RecommendationEngine>,
    /// Generator backend actually in use (may differ from the configured one).
    pub(crate) llm_mode: &'static str,
}

/// GET / – service identity.
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": state.config.app_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health – liveness plus catalog size; never touches the dispatcher.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.config.app_name,
        "total_books": state.recommender.catalog().len(),
    }))
}

/// GET /ai/stats – dispatch counters, percentages and the active thresholds.
async fn ai_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let policy = state.dispatcher.policy();
    Json(serde_json::json!({
        "stats": state.dispatcher.stats().snapshot(),
        "thresholds": {
            "high": policy.high_threshold,
            "min": policy.min_threshold,
            "low": policy.low_threshold,
        },
        "active_sessions": state.dispatcher.contexts().session_count(),
        "llm_mode": state.llm_mode,
    }))
}

/// POST /ai/stats/reset
async fn reset_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dispatcher.stats().reset();
    Json(serde_json::json!({ "status": "ok", "message": "statistics reset" }))
}

/// GET /ai/classify/:message – classification preview; nothing is dispatched or recorded.
async fn classify(State(state): State<AppState>, Path(message): Path<String>) -> Json<serde_json::Value> {
    let intent = state.dispatcher.classify_text(&message);
    Json(serde_json::json!({
        "message": message,
        "intent": intent.label,
        "confidence": intent.confidence,
        "entities": intent.entities,
        "knowledge_first": intent.label.is_knowledge_first(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use libris_core::{Book, DispatchPolicy, SAFE_FALLBACK_MESSAGE};
    use libris_skills::LlmMode;
    use tower::ServiceExt;

    fn book(id: u32, title: &str, author: &str, genre: &str, rating: f32) -> Book {
        Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            year: 1900 + id as i32,
            bestseller: rating >= 4.5,
            description: format!("A {} title.", genre.to_lowercase()),
            rating,
        }
    }

    fn test_config(policy: DispatchPolicy) -> CoreConfig {
        CoreConfig {
            app_name: "Test Libris".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8001,
            storage_path: "./data".to_string(),
            catalog_path: "data/books.json".to_string(),
            llm_mode: "mock".to_string(),
            llm_api_url: None,
            llm_api_key: None,
            llm_model: None,
            dispatch: policy,
        }
    }

    fn test_app(policy: DispatchPolicy) -> (tempfile::TempDir, Router) {
        let catalog = Arc::new(BookCatalog::from_books(vec![
            book(1, "Dune", "Frank Herbert", "Science Fiction", 4.7),
            book(2, "The Hobbit", "J.R.R. Tolkien", "Fantasy", 4.6),
            book(3, "Foundation", "Isaac Asimov", "Science Fiction", 4.4),
            book(4, "Pride and Prejudice", "Jane Austen", "Romance", 4.8),
            book(5, "Me Before You", "Jojo Moyes", "Romance", 4.2),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        initialize_store_faq(&store).unwrap();
        ingest_catalog(&store, &catalog).unwrap();
        let index = store.snapshot().unwrap();

        let contexts = Arc::new(ContextManager::new(policy.max_turns, policy.session_ttl()));
        let dispatcher = Dispatcher::new(
            policy.clone(),
            Arc::new(RegexIntentClassifier::new()),
            Arc::new(LexicalRetriever::new(index, policy.min_relevance)),
            Arc::new(ModelRouter::with_mode(LlmMode::Mock)),
            contexts,
        )
        .unwrap();
        let state = AppState {
            config: Arc::new(test_config(policy)),
            dispatcher: Arc::new(dispatcher),
            recommender: Arc::new(RecommendationEngine::new(catalog)),
            llm_mode: "mock",
        };
        (dir, build_app(state))
    }

    async fn json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    fn chat_req(text: &str, session: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "text": text, "session_id": session }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn health_and_root() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let res = app.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "Test Libris");
        assert_eq!(body["total_books"], 5);

        let res = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(json(res).await["name"], "Test Libris");
    }

    #[tokio::test]
    async fn return_policy_is_answered_from_knowledge() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let res = app
            .clone()
            .oneshot(chat_req("What's the return policy?", "s1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["source"], "knowledge");
        assert_eq!(body["intent"], "catalog_lookup");
        assert_eq!(body["session_id"], "s1");
        assert!(body["text"].as_str().unwrap().starts_with("Return policy"));
        assert_eq!(body["recommended_books"].as_array().unwrap().len(), 0);

        let stats = json(app.oneshot(get_req("/ai/stats")).await.unwrap()).await;
        assert_eq!(stats["stats"]["total_turns"], 1);
        assert_eq!(stats["stats"]["knowledge"], 1);
        assert_eq!(stats["stats"]["short_circuits"], 1);
        assert_eq!(stats["thresholds"]["high"].as_f64().unwrap() as f32, 0.85);
    }

    #[tokio::test]
    async fn mood_request_recommends_well_rated_romance() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let res = app
            .oneshot(chat_req("Recommend a sad but hopeful novel", "s2"))
            .await
            .unwrap();
        let body = json(res).await;
        assert_eq!(body["source"], "generative");
        assert_eq!(body["intent"], "recommendation");
        let ids: Vec<u64> = body["recommended_books"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn books_like_a_title_never_suggest_that_title() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let body = json(app.oneshot(chat_req("something like Dune", "s6")).await.unwrap()).await;
        assert_eq!(body["intent"], "recommendation");
        assert_ne!(body["source"], "clarification");
        assert!(!body["text"].as_str().unwrap().starts_with("Dune by"));
        let ids: Vec<u64> = body["recommended_books"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn gibberish_asks_for_clarification() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let body = json(app.oneshot(chat_req("qwerty zxcv", "s3")).await.unwrap()).await;
        assert_eq!(body["source"], "clarification");
        assert!(!body["text"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_session_id_gets_a_generated_one() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message":"hello"}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["session_id"].as_str().unwrap().len(), 36);
    }

    #[tokio::test]
    async fn missing_clarification_template_is_a_server_error() {
        let policy = DispatchPolicy {
            clarification_template: None,
            ..DispatchPolicy::default()
        };
        let (_dir, app) = test_app(policy);
        let res = app.clone().oneshot(chat_req("qwerty zxcv", "s4")).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(res).await;
        assert_eq!(body["source"], "none");
        assert_eq!(body["text"], SAFE_FALLBACK_MESSAGE);

        let stats = json(app.oneshot(get_req("/ai/stats")).await.unwrap()).await;
        assert_eq!(stats["stats"]["fatal_errors"], 1);
        assert_eq!(stats["stats"]["total_turns"], 0);
    }

    #[tokio::test]
    async fn stats_reset_clears_counters() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        app.clone().oneshot(chat_req("hello", "s5")).await.unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/ai/stats/reset")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);
        let stats = json(app.oneshot(get_req("/ai/stats")).await.unwrap()).await;
        assert_eq!(stats["stats"]["total_turns"], 0);
    }

    #[tokio::test]
    async fn book_endpoints() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let all = json(app.clone().oneshot(get_req("/books")).await.unwrap()).await;
        assert_eq!(all["total"], 5);

        let res = app.clone().oneshot(get_req("/books/99")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let dune = json(app.clone().oneshot(get_req("/books/1")).await.unwrap()).await;
        assert_eq!(dune["title"], "Dune");

        let romance = json(app.clone().oneshot(get_req("/books/genre/romance")).await.unwrap()).await;
        assert_eq!(romance["total"], 2);

        let herbert = json(app.clone().oneshot(get_req("/books/author/herbert")).await.unwrap()).await;
        assert_eq!(herbert["books"][0]["id"], 1);

        let similar = json(
            app.clone()
                .oneshot(get_req("/books/recommend?similar_to=pride%20and%20prejudice"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(similar["total"], 1);
        assert_eq!(similar["books"][0]["id"], 5);

        let top = json(app.oneshot(get_req("/books/recommend?limit=2")).await.unwrap()).await;
        assert_eq!(top["books"][0]["id"], 4);
        assert_eq!(top["total"], 2);
    }

    #[tokio::test]
    async fn classify_preview_does_not_dispatch() {
        let (_dir, app) = test_app(DispatchPolicy::default());
        let body = json(
            app.clone()
                .oneshot(get_req("/ai/classify/where%20is%20my%20order%20%2310423"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["intent"], "order_status");
        assert_eq!(body["entities"]["order"], "10423");
        assert_eq!(body["knowledge_first"], true);

        let stats = json(app.oneshot(get_req("/ai/stats")).await.unwrap()).await;
        assert_eq!(stats["stats"]["total_turns"], 0);
    }

    #[test]
    fn janitor_period_has_a_floor() {
        assert_eq!(janitor_period(Duration::from_secs(1800)), Duration::from_secs(450));
        assert_eq!(janitor_period(Duration::from_secs(2)), Duration::from_secs(1));
    }
}
