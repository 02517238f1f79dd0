//! Explicit per-session state for the comment pages.
//!
//! Pagination preferences and the originating URL are kept in a plain
//! struct in a process-local store keyed by a cookie token.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "extend_comment_session";

/// Pagination and navigation state carried across requests of one
/// visitor. Defaults apply until the visitor changes them; the page
/// index resets to 1 whenever items-per-page changes.
#[derive(Debug, Clone)]
pub struct CommentSession {
    pub items_per_page: u32,
    pub current_page: u32,
    pub asc_sort: bool,
    /// Originating URL used for post-submit and post-remove redirects.
    pub from_url: Option<String>,
}

impl CommentSession {
    fn new(default_items_per_page: u32) -> Self {
        Self {
            items_per_page: default_items_per_page,
            current_page: 1,
            asc_sort: false,
            from_url: None,
        }
    }
}

/// Process-local session store.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, CommentSession>>,
    default_items_per_page: u32,
}

impl SessionStore {
    pub fn new(default_items_per_page: u32) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            default_items_per_page,
        }
    }

    /// Resolves the request's session, creating one when the cookie is
    /// missing or stale. Returns the token alongside the state; a
    /// `true` third element means the token is new and must be set on
    /// the response.
    pub fn resolve(&self, headers: &HeaderMap) -> (String, CommentSession, bool) {
        if let Some(token) = cookie_value(headers, SESSION_COOKIE) {
            if let Some(session) = self.sessions.get(&token) {
                return (token, session.clone(), false);
            }
            // Stale cookie: recreate state under the same token so the
            // client keeps its cookie.
            let session = CommentSession::new(self.default_items_per_page);
            self.sessions.insert(token.clone(), session.clone());
            return (token, session, false);
        }
        let token = Uuid::new_v4().to_string();
        let session = CommentSession::new(self.default_items_per_page);
        self.sessions.insert(token.clone(), session.clone());
        (token, session, true)
    }

    pub fn save(&self, token: &str, session: CommentSession) {
        self.sessions.insert(token.to_owned(), session);
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

/// Attaches the session cookie to an outgoing response.
pub fn set_session_cookie(response: &mut Response, token: &str) {
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}
