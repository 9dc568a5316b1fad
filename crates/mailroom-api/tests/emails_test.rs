//! Ingress behavior: validation, status filtering, pagination, and the
//! contract that acceptance means "queued", observed through a mock
//! service.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};
use std::{future::Future, pin::Pin};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use mailroom_api::{create_router, AppState, Config, EmailService};
use mailroom_core::{error::Result as CoreResult, CoreError, Email, EmailId, EmailStatus, NewEmail};
use tower::ServiceExt;

/// In-memory service double: creates append rows, lists filter them.
#[derive(Default)]
struct MockEmailService {
    rows: Mutex<Vec<Email>>,
    next_id: AtomicI64,
    list_calls: Mutex<Vec<(EmailStatus, i64, EmailId)>>,
    fail_create: bool,
    fail_list: bool,
}

impl MockEmailService {
    fn failing_create() -> Self {
        Self { fail_create: true, ..Self::default() }
    }

    fn failing_list() -> Self {
        Self { fail_list: true, ..Self::default() }
    }

    fn created(&self) -> Vec<Email> {
        self.rows.lock().unwrap().clone()
    }

    fn list_calls(&self) -> Vec<(EmailStatus, i64, EmailId)> {
        self.list_calls.lock().unwrap().clone()
    }
}

impl EmailService for MockEmailService {
    fn create(&self, email: NewEmail) -> Pin<Box<dyn Future<Output = CoreResult<Email>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_create {
                return Err(CoreError::Database("insert failed".into()));
            }

            let id = EmailId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let row = Email {
                id,
                to_address: email.to_address,
                subject: email.subject,
                body: email.body,
                status: EmailStatus::Pending,
                updated_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        })
    }

    fn list_by_status(
        &self,
        status: EmailStatus,
        limit: i64,
        cursor: EmailId,
    ) -> Pin<Box<dyn Future<Output = CoreResult<Vec<Email>>> + Send + '_>> {
        Box::pin(async move {
            self.list_calls.lock().unwrap().push((status, limit, cursor));

            if self.fail_list {
                return Err(CoreError::Database("query failed".into()));
            }

            let rows = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|email| email.status == status && email.id > cursor)
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect();
            Ok(rows)
        })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = CoreResult<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

fn app(service: Arc<MockEmailService>) -> Router {
    let config = Config::default();
    create_router(AppState::new(service, config.server_page_size), &config)
}

fn post_send(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send-email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn valid_send_request_is_accepted_and_queued() {
    let service = Arc::new(MockEmailService::default());
    let app = app(service.clone());

    let response = app
        .oneshot(post_send(serde_json::json!({
            "to_address": "test@example.com",
            "subject": "Test Subject",
            "body": "Test Body",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty(), "202 carries no body");

    let created = service.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].to_address, "test@example.com");
    assert_eq!(created[0].status, EmailStatus::Pending);
}

#[tokio::test]
async fn invalid_requests_are_rejected_without_insert() {
    let cases = [
        serde_json::json!({ "to_address": "invalid-email", "subject": "s", "body": "b" }),
        serde_json::json!({ "to_address": "test@example.com", "subject": "", "body": "b" }),
        serde_json::json!({ "to_address": "test@example.com", "subject": "s", "body": "" }),
    ];

    for body in cases {
        let service = Arc::new(MockEmailService::default());
        let response = app(service.clone()).oneshot(post_send(body.clone())).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert!(service.created().is_empty(), "no row inserted for {body}");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(error["error"].is_string());
    }
}

#[tokio::test]
async fn store_failure_on_create_returns_500() {
    let service = Arc::new(MockEmailService::failing_create());

    let response = app(service)
        .oneshot(post_send(serde_json::json!({
            "to_address": "test@example.com",
            "subject": "s",
            "body": "b",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn queued_email_shows_up_in_pending_list() {
    let service = Arc::new(MockEmailService::default());
    let app = app(service.clone());

    let response = app
        .clone()
        .oneshot(post_send(serde_json::json!({
            "to_address": "queued@example.com",
            "subject": "s",
            "body": "b",
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.oneshot(get("/emails?status=pending")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let emails: Vec<Email> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to_address, "queued@example.com");
}

#[tokio::test]
async fn list_passes_page_size_and_cursor_through() {
    let service = Arc::new(MockEmailService::default());

    let response =
        app(service.clone()).oneshot(get("/emails?status=sent&cursor=10")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(service.list_calls(), vec![(EmailStatus::Sent, 20, EmailId(10))]);
}

#[tokio::test]
async fn cursor_defaults_to_the_start() {
    let service = Arc::new(MockEmailService::default());

    let response = app(service.clone()).oneshot(get("/emails?status=failed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(service.list_calls(), vec![(EmailStatus::Failed, 20, EmailId(0))]);
}

#[tokio::test]
async fn processing_is_not_a_queryable_status() {
    let service = Arc::new(MockEmailService::default());

    let response =
        app(service.clone()).oneshot(get("/emails?status=processing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(service.list_calls().is_empty());
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let service = Arc::new(MockEmailService::default());

    let response = app(service).oneshot(get("/emails?status=bogus")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_integer_cursor_is_rejected() {
    let service = Arc::new(MockEmailService::default());

    let response =
        app(service.clone()).oneshot(get("/emails?status=pending&cursor=abc")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(service.list_calls().is_empty());
}

#[tokio::test]
async fn store_failure_on_list_returns_500() {
    let service = Arc::new(MockEmailService::failing_list());

    let response = app(service).oneshot(get("/emails?status=pending")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let service = Arc::new(MockEmailService::default());

    let response = app(service).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
