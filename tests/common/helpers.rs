//! Shared helper functions and collaborator doubles for the
//! integration tests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request, Response, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use comment_server::config::{CommentConfig, InMemoryConfigService};
use comment_server::models::Comment;
use comment_server::repositories::comment_repository;
use comment_server::services::{CaptchaService, CommentListener, Mailer};
use comment_server::{create_router, CommentServices};

pub const TEST_BASE_URL: &str = "http://localhost:3000";
pub const TEST_ITEMS_PER_PAGE: u32 = 10;

/// Builds the app with the default service stack and one config entry
/// for the given resource type.
pub fn create_test_app(pool: SqlitePool, resource_type: &str, config: CommentConfig) -> Router {
    let services = CommentServices {
        config: Box::new(InMemoryConfigService::new(None).with_type(resource_type, config)),
        ..CommentServices::default()
    };
    create_test_app_with_services(pool, services)
}

pub fn create_test_app_with_services(pool: SqlitePool, services: CommentServices) -> Router {
    create_router(
        pool,
        services,
        TEST_BASE_URL.to_string(),
        TEST_ITEMS_PER_PAGE,
    )
}

/// Deterministic timestamp helper: seconds after a fixed epoch so
/// creation order is reflected in the dates.
pub fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// A comment with sensible defaults for seeding; override fields at
/// the call site as needed.
pub fn sample_comment(id_resource: &str, resource_type: &str, seconds: i64) -> Comment {
    Comment {
        id_comment: 0,
        id_resource: id_resource.to_owned(),
        resource_type: resource_type.to_owned(),
        date_comment: ts(seconds),
        name: "Alex".to_owned(),
        email: "alex@example.com".to_owned(),
        ip_address: "203.0.113.7".to_owned(),
        content: format!("comment at +{seconds}s"),
        is_published: true,
        date_last_modif: ts(seconds),
        id_parent_comment: 0,
        is_admin_comment: false,
        user_name: None,
        is_pinned: false,
        comment_order: 1,
        is_important: false,
    }
}

pub async fn seed(pool: &SqlitePool, comment: Comment) -> Comment {
    comment_repository::insert(pool, comment)
        .await
        .expect("failed to seed comment")
}

/// Sends a GET and returns status plus the body as text.
pub async fn get_page(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::GET)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    split_response(response).await
}

/// Sends a GET with portal identity headers attached.
pub async fn get_page_as(
    app: &Router,
    uri: &str,
    user_name: &str,
    display_name: &str,
    email: &str,
) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::GET)
                .uri(uri)
                .header("x-portal-user", user_name)
                .header("x-portal-name", display_name)
                .header("x-portal-email", email)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    split_response(response).await
}

/// GET returning the raw response, for redirect and header assertions.
pub async fn get_raw(
    app: &Router,
    uri: &str,
    identity: Option<(&str, &str, &str)>,
) -> Response<Body> {
    let mut builder = Request::builder().method(http::Method::GET).uri(uri);
    if let Some((user_name, display_name, email)) = identity {
        builder = builder
            .header("x-portal-user", user_name)
            .header("x-portal-name", display_name)
            .header("x-portal-email", email);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Posts an urlencoded comment form, optionally with portal identity
/// headers.
pub async fn post_comment_form(
    app: &Router,
    fields: &[(&str, &str)],
    identity: Option<(&str, &str, &str)>,
) -> (StatusCode, String) {
    let response = post_comment_form_raw(app, fields, identity).await;
    split_response(response).await
}

/// Raw variant of [`post_comment_form`].
pub async fn post_comment_form_raw(
    app: &Router,
    fields: &[(&str, &str)],
    identity: Option<(&str, &str, &str)>,
) -> Response<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let mut builder = Request::builder()
        .method(http::Method::POST)
        .uri("/comment")
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
    if let Some((user_name, display_name, email)) = identity {
        builder = builder
            .header("x-portal-user", user_name)
            .header("x-portal-name", display_name)
            .header("x-portal-email", email);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Location header of a redirect response.
pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

async fn split_response(response: Response<Body>) -> (StatusCode, String) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

// --- Collaborator doubles ---

#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub sender_name: String,
    pub subject: String,
    pub body: String,
}

/// [`Mailer`] double recording every outbound mail.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<SentMail>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail_html(
        &self,
        recipient: &str,
        sender_name: &str,
        _sender_email: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_owned(),
            sender_name: sender_name.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

/// Content-policy double rejecting every submission with a fixed
/// message.
pub struct RejectingListener(pub &'static str);

#[async_trait]
impl CommentListener for RejectingListener {
    async fn check_comment(&self, _: &str, _: &str, _: &str, _: &str) -> Option<String> {
        Some(self.0.to_owned())
    }
}

/// Enabled CAPTCHA accepting a single expected response.
pub struct StaticCaptcha(pub &'static str);

impl CaptchaService for StaticCaptcha {
    fn is_enabled(&self) -> bool {
        true
    }

    fn html_code(&self) -> String {
        "<div class=\"captcha-widget\"></div>".to_owned()
    }

    fn validate(&self, response: &str) -> bool {
        response == self.0
    }
}
