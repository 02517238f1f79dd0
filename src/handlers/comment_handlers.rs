use axum::extract::{Form, Query, State};
use axum::http::header::REFERER;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::Utc;
use serde::Deserialize;
use tera::Context;
use tracing::{error, info, warn};

use crate::config::{AddCommentPosition, CommentConfig};
use crate::constants;
use crate::error::PageError;
use crate::models::{Comment, CommentFilter, CommentThreadItem};
use crate::repositories::comment_repository;
use crate::session::{self, CommentSession};
use crate::utils::CommentPager;
use crate::AppState;

const MESSAGE_MANDATORY_FIELDS: &str = "All mandatory fields must be filled.";
const MESSAGE_ERROR_GENERIC: &str = "An error occurred while processing the comment.";
const MESSAGE_ERROR_BAD_CAPTCHA: &str = "The CAPTCHA response is incorrect.";
const MESSAGE_ERROR_CANNOT_DELETE: &str = "This comment cannot be deleted.";

// `&` must not survive inside a URL carried as a parameter value.
const AMPERSAND: &str = "&";
const AMPERSAND_ESCAPED: &str = "%26";

/// Query parameters of the comment page. A single `action` selector
/// dispatches to the finite set of page states; everything else is
/// context for the selected action.
#[derive(Debug, Deserialize)]
pub struct CommentPageQuery {
    pub action: Option<String>,
    pub id_resource: Option<String>,
    pub resource_type: Option<String>,
    pub id_comment: Option<i64>,
    pub page_index: Option<u32>,
    pub items_per_page: Option<u32>,
    pub asc_sort: Option<bool>,
    pub confirm: Option<String>,
    pub from_url: Option<String>,
}

/// Form body of a comment submission.
#[derive(Debug, Deserialize)]
pub struct AddCommentForm {
    pub id_resource: String,
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub id_parent_comment: i64,
    pub captcha_response: Option<String>,
    pub from_url: Option<String>,
}

/// GET entry point: dispatches on the `action` parameter, falling back
/// to the threaded view.
pub async fn comment_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CommentPageQuery>,
) -> Result<Response, PageError> {
    let (id_resource, resource_type) = match require_resource(&query) {
        Ok(pair) => pair,
        Err(response) => return Ok(response),
    };

    match query.action.as_deref() {
        Some(constants::ACTION_ADD_COMMENT) => {
            get_add_comment_page(&state, &headers, &query, &id_resource, &resource_type).await
        }
        Some(constants::ACTION_CONFIRM_REMOVE_COMMENT) => {
            get_confirm_remove_page(&state, &headers, &query, &id_resource, &resource_type).await
        }
        Some(constants::ACTION_REMOVE_COMMENT) => {
            do_remove_comment(&state, &headers, &query, &id_resource, &resource_type).await
        }
        _ => get_view_comment_page(&state, &headers, &query, &id_resource, &resource_type).await,
    }
}

/// POST entry point for `do-add-comment`.
pub async fn do_add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AddCommentForm>,
) -> Result<Response, PageError> {
    if form.id_resource.trim().is_empty() || form.resource_type.trim().is_empty() {
        return Ok(site_message(
            &state,
            "stop",
            MESSAGE_MANDATORY_FIELDS,
            None,
            StatusCode::BAD_REQUEST,
        ));
    }

    let (token, mut session, is_new) = state.sessions.resolve(&headers);

    let config = match state.services.config.find(&form.id_resource, &form.resource_type) {
        Some(config) => config,
        None => {
            return Ok(site_message(
                &state,
                "error",
                MESSAGE_ERROR_GENERIC,
                session.from_url.as_deref(),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let user = state.services.security.registered_user(&headers);
    // In auth mode the identity binding overrides whatever the form
    // carried for name and email.
    let (name, email, user_name) = if config.enable_auth_mode {
        match &user {
            Some(user) => (
                user.display_name.clone(),
                user.email.clone(),
                Some(user.user_name.clone()),
            ),
            None => {
                return Err(PageError::UserNotSignedIn {
                    from_url: form.from_url.clone().unwrap_or_default(),
                })
            }
        }
    } else {
        (
            form.name.trim().to_owned(),
            form.email.trim().to_owned(),
            None,
        )
    };
    let content = form.content.trim().to_owned();

    // Validation order is a contract: structural constraints, then
    // blank fields, then the content-policy listener, then CAPTCHA.
    // The first failure aborts before anything is persisted.
    if let Some(message) = structural_violations(&name, &email, &content) {
        return Ok(site_message(
            &state,
            "stop",
            &message,
            session.from_url.as_deref(),
            StatusCode::BAD_REQUEST,
        ));
    }

    if name.is_empty() || email.is_empty() || content.is_empty() {
        return Ok(site_message(
            &state,
            "stop",
            MESSAGE_MANDATORY_FIELDS,
            session.from_url.as_deref(),
            StatusCode::BAD_REQUEST,
        ));
    }

    if let Some(message) = state
        .services
        .listener
        .check_comment(
            &content,
            &form.resource_type,
            &form.id_resource,
            user_name.as_deref().unwrap_or(""),
        )
        .await
    {
        return Ok(site_message(
            &state,
            "stop",
            &message,
            session.from_url.as_deref(),
            StatusCode::BAD_REQUEST,
        ));
    }

    if state.services.captcha.is_enabled()
        && !state
            .services
            .captcha
            .validate(form.captcha_response.as_deref().unwrap_or(""))
    {
        return Ok(site_message(
            &state,
            "stop",
            MESSAGE_ERROR_BAD_CAPTCHA,
            session.from_url.as_deref(),
            StatusCode::BAD_REQUEST,
        ));
    }

    let now = Utc::now();
    let comment = Comment {
        id_comment: 0,
        id_resource: form.id_resource.clone(),
        resource_type: form.resource_type.clone(),
        date_comment: now,
        name,
        email,
        ip_address: client_ip(&headers),
        content: content.replace('\r', "<br />"),
        is_published: !config.moderated,
        date_last_modif: now,
        id_parent_comment: if config.authorize_sub_comments {
            form.id_parent_comment
        } else {
            0
        },
        is_admin_comment: false,
        user_name: user_name.clone(),
        is_pinned: false,
        comment_order: 1,
        is_important: false,
    };

    let created = match comment_repository::insert(&state.db_pool, comment.clone()).await {
        Ok(created) => created,
        Err(e) => {
            error!(error = %e, id_resource = %form.id_resource, "failed to persist comment");
            // Best-effort revert in case the row landed before the
            // failure surfaced.
            if let Err(revert) = comment_repository::delete(&state.db_pool, comment.id_comment).await
            {
                warn!(error = %revert, "compensating delete failed");
            }
            return Ok(site_message(
                &state,
                "error",
                MESSAGE_ERROR_GENERIC,
                session.from_url.as_deref(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    };
    info!(
        id_comment = created.id_comment,
        id_resource = %created.id_resource,
        published = created.is_published,
        "comment created"
    );

    if let Err(e) = state
        .services
        .history
        .record(
            constants::EXTENDER_TYPE_COMMENT,
            &created.id_resource,
            &created.resource_type,
            user_name.as_deref(),
            &created.ip_address,
        )
        .await
    {
        warn!(error = %e, "failed to record comment history");
    }

    send_comment_notification(&state, &created, &config).await;

    // Navigate back to the originating page when the form was inline,
    // otherwise show the confirmation page.
    if let Some(raw) = form.from_url.as_deref().filter(|s| !s.is_empty()) {
        let from_url = resolve_from_url(Some(raw), &headers, &mut session);
        state.sessions.save(&token, session);
        if config.add_comment_position != AddCommentPosition::NewPage {
            if let Some(url) = from_url {
                let target = format!(
                    "{}#{}",
                    url.replace(AMPERSAND_ESCAPED, AMPERSAND),
                    constants::ADD_COMMENT_MESSAGE_ANCHOR
                );
                return Ok(with_session_cookie(
                    Redirect::to(&target).into_response(),
                    &token,
                    is_new,
                ));
            }
        }
    } else {
        state.sessions.save(&token, session);
    }

    let mut ctx = Context::new();
    ctx.insert("message_comment_created", &config.message_comment_created);
    ctx.insert("id_resource", &created.id_resource);
    ctx.insert("resource_type", &created.resource_type);
    // Link back to the root of the thread the comment landed in.
    ctx.insert(
        "id_comment",
        &if created.id_parent_comment == 0 {
            created.id_comment
        } else {
            created.id_parent_comment
        },
    );
    ctx.insert("from_url", &form.from_url);
    Ok(with_session_cookie(
        render_page(&state, "comment_created.html", &ctx, StatusCode::OK),
        &token,
        is_new,
    ))
}

/// Default action: the threaded, paginated view of a resource's
/// published comments.
async fn get_view_comment_page(
    state: &AppState,
    headers: &HeaderMap,
    query: &CommentPageQuery,
    id_resource: &str,
    resource_type: &str,
) -> Result<Response, PageError> {
    let (token, mut session, is_new) = state.sessions.resolve(headers);

    // Items-per-page change resets the visitor to the first page.
    if let Some(items_per_page) = query.items_per_page {
        let items_per_page = if items_per_page == 0 {
            state.default_items_per_page
        } else {
            items_per_page
        };
        if items_per_page != session.items_per_page {
            session.items_per_page = items_per_page;
            session.current_page = 1;
        }
    }
    if let Some(page_index) = query.page_index {
        session.current_page = page_index.max(1);
    }
    if let Some(asc_sort) = query.asc_sort {
        session.asc_sort = asc_sort;
    }
    let from_url = resolve_from_url(query.from_url.as_deref(), headers, &mut session);

    let config = state
        .services
        .config
        .find(id_resource, resource_type)
        .unwrap_or_else(|| CommentConfig {
            authorize_sub_comments: false,
            ..CommentConfig::default()
        });

    let nb_comments = comment_repository::get_comment_count(
        &state.db_pool,
        id_resource,
        resource_type,
        true,
        true,
    )
    .await?;

    let pager = CommentPager::new(session.items_per_page, session.current_page, nb_comments);
    let filter = CommentFilter {
        asc_sort: Some(session.asc_sort),
        ..CommentFilter::published()
    };
    let roots = comment_repository::find_parent_comments_by_resource(
        &state.db_pool,
        id_resource,
        resource_type,
        &filter,
        pager.offset(),
        i64::from(session.items_per_page),
    )
    .await?;

    let mut items = Vec::with_capacity(roots.len());
    for root in roots {
        let sub_comments = if config.authorize_sub_comments {
            let sub_filter = CommentFilter {
                sorted_attribute: Some(constants::SORT_BY_DATE_CREATION.to_owned()),
                asc_sort: Some(true),
                ..CommentFilter::published()
            };
            comment_repository::find_by_id_parent(&state.db_pool, root.id_comment, &sub_filter)
                .await?
        } else {
            Vec::new()
        };
        items.push(CommentThreadItem {
            comment: root,
            sub_comments,
        });
    }

    let registered_email = state
        .services
        .security
        .registered_user(headers)
        .map(|user| user.email);

    let mut ctx = Context::new();
    ctx.insert("id_resource", id_resource);
    ctx.insert("resource_type", resource_type);
    ctx.insert("comments", &items);
    ctx.insert("nb_comments", &nb_comments);
    ctx.insert("current_page", &session.current_page);
    ctx.insert("total_pages", &pager.total_pages());
    ctx.insert("items_per_page", &session.items_per_page);
    ctx.insert("asc_sort", &session.asc_sort);
    ctx.insert("allow_sub_comments", &config.authorize_sub_comments);
    ctx.insert("enable_auth_mode", &config.enable_auth_mode);
    ctx.insert("admin_badge", &config.admin_badge);
    ctx.insert("registered_email", &registered_email);
    ctx.insert("from_url", &from_url);

    state.sessions.save(&token, session);
    Ok(with_session_cookie(
        render_page(state, "view_comments.html", &ctx, StatusCode::OK),
        &token,
        is_new,
    ))
}

/// `add-comment`: renders the submission form.
async fn get_add_comment_page(
    state: &AppState,
    headers: &HeaderMap,
    query: &CommentPageQuery,
    id_resource: &str,
    resource_type: &str,
) -> Result<Response, PageError> {
    let (token, mut session, is_new) = state.sessions.resolve(headers);
    let from_url = resolve_from_url(query.from_url.as_deref(), headers, &mut session);
    state.sessions.save(&token, session.clone());

    let config = match state.services.config.find(id_resource, resource_type) {
        Some(config) => config,
        None => {
            return Ok(site_message(
                state,
                "error",
                MESSAGE_ERROR_GENERIC,
                from_url.as_deref(),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let user = state.services.security.registered_user(headers);
    if config.enable_auth_mode && user.is_none() {
        return Err(PageError::UserNotSignedIn {
            from_url: from_url.unwrap_or_default(),
        });
    }

    let mut ctx = Context::new();
    ctx.insert("id_resource", id_resource);
    ctx.insert("resource_type", resource_type);
    // A present comment id makes the form a reply to that comment.
    ctx.insert("id_parent_comment", &query.id_comment.unwrap_or(0));
    ctx.insert("from_url", &from_url);
    ctx.insert("enable_auth_mode", &config.enable_auth_mode);
    ctx.insert("use_bbcode", &config.use_bbcode_editor);
    ctx.insert("nickname", &user.as_ref().map(|u| u.display_name.clone()));
    ctx.insert("registered_email", &user.as_ref().map(|u| u.email.clone()));
    ctx.insert("is_active_captcha", &state.services.captcha.is_enabled());
    ctx.insert("captcha", &state.services.captcha.html_code());

    Ok(with_session_cookie(
        render_page(state, "add_comment.html", &ctx, StatusCode::OK),
        &token,
        is_new,
    ))
}

/// `confirm-remove-comment`: interstitial asking the author to confirm.
async fn get_confirm_remove_page(
    state: &AppState,
    headers: &HeaderMap,
    query: &CommentPageQuery,
    id_resource: &str,
    resource_type: &str,
) -> Result<Response, PageError> {
    let id_comment = match query.id_comment {
        Some(id) => id,
        None => {
            return Ok(site_message(
                state,
                "error",
                MESSAGE_ERROR_GENERIC,
                None,
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let (token, session, is_new) = state.sessions.resolve(headers);

    let mut ctx = Context::new();
    ctx.insert("id_resource", id_resource);
    ctx.insert("resource_type", resource_type);
    ctx.insert("id_comment", &id_comment);
    ctx.insert("from_url", &session.from_url);

    Ok(with_session_cookie(
        render_page(state, "confirm_remove_comment.html", &ctx, StatusCode::OK),
        &token,
        is_new,
    ))
}

/// `remove-comment`: authorizes and deletes a confirmed removal.
///
/// Removal is only offered in auth mode: the requester must be the
/// comment's author (matched by email), deletion must be enabled in
/// the target's configuration, and the comment must have no replies.
async fn do_remove_comment(
    state: &AppState,
    headers: &HeaderMap,
    query: &CommentPageQuery,
    id_resource: &str,
    resource_type: &str,
) -> Result<Response, PageError> {
    let (token, mut session, is_new) = state.sessions.resolve(headers);
    let from_url = resolve_from_url(query.from_url.as_deref(), headers, &mut session);
    state.sessions.save(&token, session);

    let id_comment = match query.id_comment {
        Some(id) if query.confirm.is_some() => id,
        _ => {
            return Ok(site_message(
                state,
                "error",
                MESSAGE_ERROR_GENERIC,
                from_url.as_deref(),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let comment = match comment_repository::load(&state.db_pool, id_comment).await? {
        Some(comment) => comment,
        None => {
            return Ok(site_message(
                state,
                "error",
                MESSAGE_ERROR_GENERIC,
                from_url.as_deref(),
                StatusCode::NOT_FOUND,
            ))
        }
    };

    let config = state.services.config.find(id_resource, resource_type);
    let config = match config {
        Some(config) if config.enable_auth_mode => config,
        _ => {
            // Anonymous threads have no author identity to authorize
            // against; removal stays a back-office concern there.
            return Ok(site_message(
                state,
                "error",
                MESSAGE_ERROR_GENERIC,
                from_url.as_deref(),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    let user = match state.services.security.registered_user(headers) {
        Some(user) => user,
        None => {
            return Err(PageError::UserNotSignedIn {
                from_url: from_url.unwrap_or_default(),
            })
        }
    };

    if let Some(message) = state
        .services
        .listener
        .check_comment(
            &comment.content,
            resource_type,
            id_resource,
            &user.user_name,
        )
        .await
    {
        return Ok(site_message(
            state,
            "stop",
            &message,
            from_url.as_deref(),
            StatusCode::BAD_REQUEST,
        ));
    }

    let nb_children =
        comment_repository::count_by_id_parent(&state.db_pool, comment.id_comment, false).await?;

    if !config.delete_comments || comment.email != user.email || nb_children > 0 {
        return Ok(site_message(
            state,
            "error",
            MESSAGE_ERROR_CANNOT_DELETE,
            from_url.as_deref(),
            StatusCode::FORBIDDEN,
        ));
    }

    comment_repository::delete(&state.db_pool, comment.id_comment).await?;
    info!(
        id_comment = comment.id_comment,
        user_name = %user.user_name,
        "comment removed by its author"
    );

    let target = from_url
        .map(|url| url.replace(AMPERSAND_ESCAPED, AMPERSAND))
        .unwrap_or_else(|| {
            format!("?id_resource={id_resource}&resource_type={resource_type}")
        });
    Ok(with_session_cookie(
        Redirect::to(&target).into_response(),
        &token,
        is_new,
    ))
}

/// Builds and sends one notification mail per mailing-list recipient.
/// Failures are logged and never affect the created comment.
async fn send_comment_notification(state: &AppState, comment: &Comment, config: &CommentConfig) {
    let recipients = state.services.mailing_lists.recipients(config.id_mailing_list);
    if recipients.is_empty() {
        return;
    }

    let resource_name = state
        .services
        .resource_names
        .display_name(&comment.id_resource, &comment.resource_type)
        .await;
    let resource_url = format!(
        "{}/comment?id_resource={}&resource_type={}",
        state.base_url, comment.id_resource, comment.resource_type
    );
    let subject = format!("New comment: {resource_name}");

    let mut ctx = Context::new();
    ctx.insert("resource_name", &resource_name);
    ctx.insert("resource_url", &resource_url);
    ctx.insert("comment", comment);
    let body = match state.templates.render("comment_notify_message.html", &ctx) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "failed to render comment notification");
            return;
        }
    };

    for recipient in recipients {
        if let Err(e) = state
            .services
            .mailer
            .send_mail_html(
                &recipient.email,
                &comment.name,
                &comment.email,
                &subject,
                &body,
            )
            .await
        {
            warn!(error = %e, recipient = %recipient.email, "comment notification failed");
        }
    }
}

/// Both resource reference parameters are mandatory for every action.
fn require_resource(query: &CommentPageQuery) -> Result<(String, String), Response> {
    let id_resource = query
        .id_resource
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let resource_type = query
        .resource_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match (id_resource, resource_type) {
        (Some(id), Some(ty)) => Ok((id.to_owned(), ty.to_owned())),
        _ => Err((StatusCode::BAD_REQUEST, MESSAGE_MANDATORY_FIELDS).into_response()),
    }
}

/// Field-level constraints checked before anything else; returns the
/// violations joined for the stop-message page.
fn structural_violations(name: &str, email: &str, content: &str) -> Option<String> {
    let mut violations = Vec::new();
    if !email.is_empty() && !email.contains('@') {
        violations.push("The email address is not valid.");
    }
    if name.chars().count() > constants::MAX_NAME_LENGTH {
        violations.push("The name is too long.");
    }
    if content.chars().count() > constants::MAX_COMMENT_CONTENT_LENGTH {
        violations.push("The comment is too long.");
    }
    if violations.is_empty() {
        None
    } else {
        Some(violations.join("<br />"))
    }
}

/// Resolves the originating URL: explicit parameter first (with the
/// `from_session` sentinel reusing the stored one), then the Referer
/// header. The resolved value is stored back in the session with `&`
/// escaped so it survives being carried as a parameter value.
fn resolve_from_url(
    param: Option<&str>,
    headers: &HeaderMap,
    session: &mut CommentSession,
) -> Option<String> {
    let mut from_url = match param {
        Some(constants::FROM_SESSION) => session.from_url.clone(),
        Some(url) if !url.is_empty() => Some(url.to_owned()),
        _ => None,
    };
    if from_url.is_none() {
        from_url = headers
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
    }
    let from_url = from_url.map(|url| url.replace(AMPERSAND, AMPERSAND_ESCAPED));
    session.from_url = from_url.clone();
    from_url
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn render_page(state: &AppState, template: &str, ctx: &Context, status: StatusCode) -> Response {
    match state.templates.render(template, ctx) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, template, "template rendering failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                MESSAGE_ERROR_GENERIC.to_owned(),
            )
                .into_response()
        }
    }
}

/// Renders the stop/error message page used for every validation and
/// policy refusal.
fn site_message(
    state: &AppState,
    kind: &str,
    message: &str,
    back_url: Option<&str>,
    status: StatusCode,
) -> Response {
    let mut ctx = Context::new();
    ctx.insert("kind", kind);
    ctx.insert("message", message);
    ctx.insert(
        "back_url",
        &back_url.map(|url| url.replace(AMPERSAND_ESCAPED, AMPERSAND)),
    );
    render_page(state, "site_message.html", &ctx, status)
}

fn with_session_cookie(mut response: Response, token: &str, is_new: bool) -> Response {
    if is_new {
        session::set_session_cookie(&mut response, token);
    }
    response
}
