//! Collaborator contracts consumed by the page controller.
//!
//! Each concern owned by the host portal is a trait injected into
//! `AppState` at construction time. Production defaults are
//! intentionally thin: the portal framework, mail transport and
//! CAPTCHA provider live outside this crate.

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::info;

/// A signed-in portal identity.
#[derive(Debug, Clone)]
pub struct PortalUser {
    /// Stable account name, persisted as the comment's identity binding.
    pub user_name: String,
    /// Display name from the identity profile.
    pub display_name: String,
    pub email: String,
}

/// Identity lookup against the hosting portal's session services.
pub trait SecurityService: Send + Sync {
    /// Returns the signed-in user carried by the request, if any.
    fn registered_user(&self, headers: &HeaderMap) -> Option<PortalUser>;
}

/// [`SecurityService`] reading identity from trusted reverse-proxy
/// headers (`x-portal-user`, `x-portal-name`, `x-portal-email`), the
/// usual deployment shape when the portal fronts this service.
pub struct HeaderSecurityService;

impl SecurityService for HeaderSecurityService {
    fn registered_user(&self, headers: &HeaderMap) -> Option<PortalUser> {
        let user_name = header_value(headers, "x-portal-user")?;
        let email = header_value(headers, "x-portal-email").unwrap_or_default();
        let display_name =
            header_value(headers, "x-portal-name").unwrap_or_else(|| user_name.clone());
        Some(PortalUser {
            user_name,
            display_name,
            email,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Domain-specific content policy check run before a comment is
/// accepted or removed.
#[async_trait]
pub trait CommentListener: Send + Sync {
    /// Returns a user-visible error message when the content is
    /// rejected, `None` when it passes.
    async fn check_comment(
        &self,
        content: &str,
        resource_type: &str,
        id_resource: &str,
        user_name: &str,
    ) -> Option<String>;
}

/// Listener that accepts everything.
pub struct AcceptAllListener;

#[async_trait]
impl CommentListener for AcceptAllListener {
    async fn check_comment(&self, _: &str, _: &str, _: &str, _: &str) -> Option<String> {
        None
    }
}

/// CAPTCHA integration point. When disabled, validation always passes
/// and no widget markup is rendered.
pub trait CaptchaService: Send + Sync {
    fn is_enabled(&self) -> bool;
    /// Widget markup embedded in the add-comment form.
    fn html_code(&self) -> String;
    fn validate(&self, response: &str) -> bool;
}

pub struct DisabledCaptcha;

impl CaptchaService for DisabledCaptcha {
    fn is_enabled(&self) -> bool {
        false
    }

    fn html_code(&self) -> String {
        String::new()
    }

    fn validate(&self, _response: &str) -> bool {
        true
    }
}

/// Outbound HTML mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail_html(
        &self,
        recipient: &str,
        sender_name: &str,
        sender_email: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()>;
}

/// [`Mailer`] that only logs; the real transport belongs to the host
/// portal.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail_html(
        &self,
        recipient: &str,
        sender_name: &str,
        _sender_email: &str,
        subject: &str,
        _body: &str,
    ) -> anyhow::Result<()> {
        info!(recipient, sender_name, subject, "outbound comment notification");
        Ok(())
    }
}

/// A mailing-list member.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
}

/// Mailing-list membership lookup.
pub trait MailingListService: Send + Sync {
    fn recipients(&self, id_mailing_list: i64) -> Vec<Recipient>;
}

/// Static in-memory mailing lists.
pub struct StaticMailingLists {
    lists: std::collections::HashMap<i64, Vec<Recipient>>,
}

impl StaticMailingLists {
    pub fn new() -> Self {
        Self {
            lists: std::collections::HashMap::new(),
        }
    }

    pub fn with_list(mut self, id: i64, emails: &[&str]) -> Self {
        self.lists.insert(
            id,
            emails
                .iter()
                .map(|e| Recipient {
                    email: (*e).to_owned(),
                })
                .collect(),
        );
        self
    }
}

impl Default for StaticMailingLists {
    fn default() -> Self {
        Self::new()
    }
}

impl MailingListService for StaticMailingLists {
    fn recipients(&self, id_mailing_list: i64) -> Vec<Recipient> {
        self.lists.get(&id_mailing_list).cloned().unwrap_or_default()
    }
}

/// Resolves the display name of an extendable resource for
/// notification subjects and bodies.
#[async_trait]
pub trait ResourceNameResolver: Send + Sync {
    async fn display_name(&self, id_resource: &str, resource_type: &str) -> String;
}

/// Fallback resolver naming the resource by its raw reference.
pub struct PlainResourceNames;

#[async_trait]
impl ResourceNameResolver for PlainResourceNames {
    async fn display_name(&self, id_resource: &str, resource_type: &str) -> String {
        format!("{resource_type} {id_resource}")
    }
}

/// Audit/history recorder invoked after each successful creation.
#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn record(
        &self,
        extender_type: &str,
        id_resource: &str,
        resource_type: &str,
        user_name: Option<&str>,
        ip_address: &str,
    ) -> anyhow::Result<()>;
}

/// [`HistoryService`] that only logs the event.
pub struct LogHistoryService;

#[async_trait]
impl HistoryService for LogHistoryService {
    async fn record(
        &self,
        extender_type: &str,
        id_resource: &str,
        resource_type: &str,
        user_name: Option<&str>,
        ip_address: &str,
    ) -> anyhow::Result<()> {
        info!(
            extender_type,
            id_resource,
            resource_type,
            user_name = user_name.unwrap_or(""),
            ip_address,
            "extender history entry"
        );
        Ok(())
    }
}
