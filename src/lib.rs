use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tera::Tera;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod session;
pub mod templates;
pub mod utils;

use config::{CommentConfig, ConfigService, InMemoryConfigService};
use handlers::comment_handlers;
use services::{
    AcceptAllListener, CaptchaService, CommentListener, DisabledCaptcha, HeaderSecurityService,
    HistoryService, LogHistoryService, LogMailer, Mailer, MailingListService, ResourceNameResolver,
    PlainResourceNames, SecurityService, StaticMailingLists,
};
use session::SessionStore;

// Comment forms are small; anything bigger than this is abuse.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// The collaborator services consumed by the page controller, injected
/// once at construction time.
pub struct CommentServices {
    pub config: Box<dyn ConfigService>,
    pub security: Box<dyn SecurityService>,
    pub listener: Box<dyn CommentListener>,
    pub captcha: Box<dyn CaptchaService>,
    pub mailer: Box<dyn Mailer>,
    pub mailing_lists: Box<dyn MailingListService>,
    pub resource_names: Box<dyn ResourceNameResolver>,
    pub history: Box<dyn HistoryService>,
}

impl Default for CommentServices {
    /// Production defaults: open commenting on every resource, portal
    /// identity from reverse-proxy headers, notifications and history
    /// going to the log.
    fn default() -> Self {
        Self {
            config: Box::new(InMemoryConfigService::new(Some(CommentConfig::default()))),
            security: Box::new(HeaderSecurityService),
            listener: Box::new(AcceptAllListener),
            captcha: Box::new(DisabledCaptcha),
            mailer: Box::new(LogMailer),
            mailing_lists: Box::new(StaticMailingLists::new()),
            resource_names: Box::new(PlainResourceNames),
            history: Box::new(LogHistoryService),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub templates: Arc<Tera>,
    pub sessions: SessionStore,
    pub services: Arc<CommentServices>,
    pub base_url: String,
    pub default_items_per_page: u32,
}

/// Builds the application router around the comment page endpoint.
pub fn create_router(
    db_pool: SqlitePool,
    services: CommentServices,
    base_url: String,
    default_items_per_page: u32,
) -> Router {
    let app_state = AppState {
        db_pool,
        templates: Arc::new(templates::build_templates()),
        sessions: SessionStore::new(default_items_per_page),
        services: Arc::new(services),
        base_url,
        default_items_per_page,
    };

    Router::new()
        .route(
            "/comment",
            get(comment_handlers::comment_page).post(comment_handlers::do_add_comment),
        )
        .with_state(app_state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
}
