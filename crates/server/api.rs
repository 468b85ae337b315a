//! API module for the taskq server.

use std::sync::Arc;

use actix_web::middleware::from_fn;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use taskq_core::{
    current_timestamp, keys, Admission, Client, Credential, JobId, JobStats, NewJob,
    RateLimiter, SharedCredentials,
};

use crate::config::ServerConfig;
use crate::connect::Stores;
use crate::error::ApiError;
use crate::middleware::{admin_auth, admission};

/// Prefix for generated API keys when the request does not name one.
pub const DEFAULT_KEY_PREFIX: &str = "tq";

/// Application state shared across handlers.
pub struct AppState {
    pub client: Client,
    pub credentials: SharedCredentials,
    pub admission: Admission,
    /// Fingerprint of the admin token, if one is configured.
    pub admin_token_hash: Option<String>,
    pub max_attempts: u32,
}

impl AppState {
    pub fn new(stores: &Stores, config: &ServerConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            client: Client::new(stores.jobs.clone()),
            credentials: stores.credentials.clone(),
            admission: Admission::new(stores.credentials.clone(), limiter),
            admin_token_hash: config.admin_token.as_deref().map(keys::fingerprint),
            max_attempts: config.max_attempts,
        }
    }
}

/// Response for health check.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Request body for enqueueing a job.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    pub max_attempts: Option<u32>,
    pub delay_secs: Option<u64>,
}

/// Response for enqueue operation.
#[derive(Serialize)]
pub struct EnqueueResponse {
    pub id: JobId,
    pub status: &'static str,
}

/// Request body for issuing an API key.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub description: Option<String>,
    pub prefix: Option<String>,
    pub expires_in_secs: Option<u64>,
}

/// Response for a newly issued key. The plaintext key is never shown again.
#[derive(Serialize)]
pub struct CreateKeyResponse {
    pub id: String,
    pub name: String,
    pub key: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// Response for listing API keys.
#[derive(Serialize)]
pub struct KeyListResponse {
    pub keys: Vec<Credential>,
    pub total: usize,
}

/// Configure API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::Validation(err.to_string()).into()
    }))
    .route("/health", web::get().to(health))
    .service(
        web::scope("/jobs")
            .wrap(from_fn(admission))
            .route("", web::post().to(enqueue))
            .route("/{id}", web::get().to(get_job)),
    )
    .service(
        web::scope("/admin")
            .wrap(from_fn(admin_auth))
            .route("/api-keys", web::post().to(create_api_key))
            .route("/api-keys", web::get().to(list_api_keys))
            .route("/stats", web::get().to(stats)),
    );
}

/// Health check endpoint.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

/// Enqueue a new job.
async fn enqueue(
    state: web::Data<AppState>,
    body: web::Json<EnqueueRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();

    let mut job = NewJob::new(request.job_type, request.payload)
        .max_attempts(request.max_attempts.unwrap_or(state.max_attempts));
    if let Some(delay) = request.delay_secs {
        let delay = i64::try_from(delay)
            .map_err(|_| ApiError::Validation("delay_secs is too large".to_string()))?;
        job = job.run_at(current_timestamp().saturating_add(delay));
    }

    let id = state.client.enqueue_with(job).await?;

    Ok(HttpResponse::Accepted().json(EnqueueResponse {
        id,
        status: "pending",
    }))
}

/// Get a job by ID.
async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = JobId::from(path.into_inner());
    let job = state.client.status(&id).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Issue a new API key.
async fn create_api_key(
    state: web::Data<AppState>,
    body: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name cannot be empty".to_string()));
    }
    let prefix = request.prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX);
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::Validation(
            "prefix must be letters, digits or underscores".to_string(),
        ));
    }

    let now = current_timestamp();
    let expires_at = match request.expires_in_secs {
        Some(secs) => Some(
            i64::try_from(secs)
                .map(|secs| now.saturating_add(secs))
                .map_err(|_| ApiError::Validation("expires_in_secs is too large".to_string()))?,
        ),
        None => None,
    };

    let key = keys::generate_api_key(prefix);
    let credential = state
        .credentials
        .create_credential(Credential {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: request.description,
            key_hash: keys::fingerprint(&key),
            created_at: now,
            expires_at,
            last_used_at: None,
        })
        .await?;

    tracing::info!(credential_id = %credential.id, name = %credential.name, "API key issued");

    Ok(HttpResponse::Created().json(CreateKeyResponse {
        id: credential.id,
        name: credential.name,
        key,
        created_at: credential.created_at,
        expires_at: credential.expires_at,
    }))
}

/// List issued API keys. Fingerprints are not included.
async fn list_api_keys(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let keys = state.credentials.list_credentials().await?;
    let total = keys.len();
    Ok(HttpResponse::Ok().json(KeyListResponse { keys, total }))
}

/// Get job counts per status.
async fn stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats: JobStats = state.client.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailHandler, LogMailer};
    use crate::middleware::API_KEY_HEADER;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use taskq_core::{
        CredentialStore, Dispatcher, JobStatus, JobStore, MemoryStore, SharedStore, Step, Worker,
        WorkerConfig,
    };

    const ADMIN: &str = "admin-secret";

    struct Fixture {
        store: Arc<MemoryStore>,
        state: web::Data<AppState>,
    }

    impl Fixture {
        fn new(capacity: u32) -> Self {
            let store = Arc::new(MemoryStore::new());
            let config = ServerConfig::builder()
                .admin_token(ADMIN)
                .rate_limit(capacity, 0.0)
                .build();
            let state = web::Data::new(AppState::new(&Stores::from_arc(store.clone()), &config));
            Self { store, state }
        }

        async fn add_key(&self, id: &str, key: &str, expires_at: Option<i64>) {
            self.store
                .create_credential(Credential {
                    id: id.to_string(),
                    name: id.to_string(),
                    description: None,
                    key_hash: keys::fingerprint(key),
                    created_at: current_timestamp(),
                    expires_at,
                    last_used_at: None,
                })
                .await
                .unwrap();
        }
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data($fixture.state.clone())
                    .configure(configure),
            )
            .await
        };
    }

    fn enqueue_req(key: Option<&str>, body: Value) -> test::TestRequest {
        let req = test::TestRequest::post().uri("/jobs").set_json(body);
        match key {
            Some(key) => req.insert_header((API_KEY_HEADER, key)),
            None => req,
        }
    }

    fn email_job() -> Value {
        json!({
            "type": "send_email",
            "payload": {"to": "a@example.com", "from": "b@example.com", "subject": "hi"}
        })
    }

    #[actix_web::test]
    async fn test_health_is_public() {
        let fixture = Fixture::new(5);
        let app = app!(fixture);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[actix_web::test]
    async fn test_enqueue_requires_api_key() {
        let fixture = Fixture::new(5);
        let app = app!(fixture);

        let resp = test::call_service(&app, enqueue_req(None, email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "missing_api_key");
        assert!(fixture.store.is_empty());
    }

    #[actix_web::test]
    async fn test_invalid_and_expired_keys_are_distinct() {
        let fixture = Fixture::new(5);
        fixture.add_key("old", "tq-old", Some(1)).await;
        let app = app!(fixture);

        let resp = test::call_service(&app, enqueue_req(Some("tq-unknown"), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_api_key");

        let resp = test::call_service(&app, enqueue_req(Some("tq-old"), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "expired_api_key");
    }

    #[actix_web::test]
    async fn test_rate_limit_is_per_key() {
        let fixture = Fixture::new(2);
        fixture.add_key("a", "tq-a", None).await;
        fixture.add_key("b", "tq-b", None).await;
        let app = app!(fixture);

        for _ in 0..2 {
            let resp = test::call_service(&app, enqueue_req(Some("tq-a"), email_job()).to_request()).await;
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
        }

        let resp = test::call_service(&app, enqueue_req(Some("tq-a"), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "rate_limited");

        let resp = test::call_service(&app, enqueue_req(Some("tq-b"), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[actix_web::test]
    async fn test_enqueue_then_status() {
        let fixture = Fixture::new(10);
        fixture.add_key("a", "tq-a", None).await;
        let app = app!(fixture);

        let resp = test::call_service(&app, enqueue_req(Some("tq-a"), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "pending");
        let id = body["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/jobs/{}", id))
            .insert_header((API_KEY_HEADER, "tq-a"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let job: Value = test::read_body_json(resp).await;
        assert_eq!(job["id"], id.as_str());
        assert_eq!(job["type"], "send_email");
        assert_eq!(job["status"], "pending");
        assert_eq!(job["attempts"], 0);
        assert_eq!(job["max_attempts"], 3);
    }

    #[actix_web::test]
    async fn test_unknown_job_is_404() {
        let fixture = Fixture::new(10);
        fixture.add_key("a", "tq-a", None).await;
        let app = app!(fixture);

        let req = test::TestRequest::get()
            .uri("/jobs/does-not-exist")
            .insert_header((API_KEY_HEADER, "tq-a"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "job_not_found");
    }

    #[actix_web::test]
    async fn test_enqueue_validation_errors() {
        let fixture = Fixture::new(10);
        fixture.add_key("a", "tq-a", None).await;
        let app = app!(fixture);

        for body in [
            json!({"type": "send_email", "payload": {}}),
            json!({"type": "", "payload": {"a": 1}}),
            json!({"type": "send_email", "payload": {"a": 1}, "max_attempts": 0}),
            json!({"payload": {"a": 1}}),
        ] {
            let resp = test::call_service(&app, enqueue_req(Some("tq-a"), body.clone()).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
            let err: Value = test::read_body_json(resp).await;
            assert_eq!(err["error"], "validation_error");
        }
        assert!(fixture.store.is_empty());
    }

    #[actix_web::test]
    async fn test_enqueue_with_delay_and_attempts() {
        let fixture = Fixture::new(10);
        fixture.add_key("a", "tq-a", None).await;
        let app = app!(fixture);

        let mut body = email_job();
        body["max_attempts"] = json!(5);
        body["delay_secs"] = json!(600);
        let before = current_timestamp();
        let resp = test::call_service(&app, enqueue_req(Some("tq-a"), body).to_request()).await;
        let created: Value = test::read_body_json(resp).await;

        let job = fixture
            .store
            .get(&JobId::from(created["id"].as_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(job.max_attempts, 5);
        assert!(job.scheduled_at >= before + 600);
    }

    #[actix_web::test]
    async fn test_admin_requires_bearer_token() {
        let fixture = Fixture::new(10);
        let app = app!(fixture);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/admin/stats").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/admin/stats")
            .insert_header((header::AUTHORIZATION, "Bearer wrong"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[actix_web::test]
    async fn test_admin_disabled_without_token() {
        let store = Arc::new(MemoryStore::new());
        let state = web::Data::new(AppState::new(
            &Stores::from_arc(store),
            &ServerConfig::default(),
        ));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/admin/stats")
            .insert_header((header::AUTHORIZATION, "Bearer anything"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_issued_key_admits_requests() {
        let fixture = Fixture::new(10);
        let app = app!(fixture);
        let bearer = (header::AUTHORIZATION, format!("Bearer {}", ADMIN));

        let req = test::TestRequest::post()
            .uri("/admin/api-keys")
            .insert_header(bearer.clone())
            .set_json(json!({"name": "ci", "prefix": "ci", "expires_in_secs": 3600}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        let key = created["key"].as_str().unwrap().to_string();
        assert!(key.starts_with("ci-"));
        assert!(created["expires_at"].as_i64().unwrap() > current_timestamp());

        let resp = test::call_service(&app, enqueue_req(Some(&key), email_job()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::get()
            .uri("/admin/api-keys")
            .insert_header(bearer.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        let listed: Value = test::read_body_json(resp).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["keys"][0]["name"], "ci");
        assert!(listed["keys"][0].get("key_hash").is_none());
        assert!(listed["keys"][0]["last_used_at"].is_i64());

        let req = test::TestRequest::get()
            .uri("/admin/stats")
            .insert_header(bearer)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let stats: Value = test::read_body_json(resp).await;
        assert_eq!(stats["pending"], 1);
    }

    #[actix_web::test]
    async fn test_create_key_validation() {
        let fixture = Fixture::new(10);
        let app = app!(fixture);

        for body in [json!({"name": " "}), json!({"name": "x", "prefix": "bad-prefix"})] {
            let req = test::TestRequest::post()
                .uri("/admin/api-keys")
                .insert_header((header::AUTHORIZATION, format!("Bearer {}", ADMIN)))
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn test_enqueued_email_is_processed_by_worker() {
        let fixture = Fixture::new(10);
        fixture.add_key("a", "tq-a", None).await;
        let app = app!(fixture);

        let resp = test::call_service(&app, enqueue_req(Some("tq-a"), email_job()).to_request()).await;
        let created: Value = test::read_body_json(resp).await;
        let id = JobId::from(created["id"].as_str().unwrap());

        let mut dispatcher = Dispatcher::new();
        EmailHandler::register(&mut dispatcher, Arc::new(LogMailer));
        let worker = Worker::with_config(
            SharedStore::from_arc(fixture.store.clone()),
            dispatcher,
            WorkerConfig::builder().worker_id("api-test").build(),
        );

        assert!(matches!(worker.step().await, Step::Processed { .. }));
        let job = fixture.store.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
    }
}
