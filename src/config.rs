use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where the submission flow lands after a successful creation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddCommentPosition {
    /// Stay on the comment page and show the created-message template.
    NewPage,
    /// Return to the originating page (the form was rendered inline).
    #[default]
    Inline,
}

/// Per-target comment configuration, looked up by `(id_resource,
/// resource_type)`. Owned by the host portal and served through an
/// injected [`ConfigService`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommentConfig {
    /// New comments start unpublished and wait for admin action.
    pub moderated: bool,
    /// Submission and removal require a signed-in identity.
    pub enable_auth_mode: bool,
    /// Replies to root comments are accepted.
    pub authorize_sub_comments: bool,
    /// Authors may delete their own childless comments.
    pub delete_comments: bool,
    /// Mailing list notified on each creation.
    pub id_mailing_list: i64,
    pub use_bbcode_editor: bool,
    /// Badge label rendered next to admin-authored comments.
    pub admin_badge: String,
    /// Message shown on the creation confirmation page.
    pub message_comment_created: String,
    pub add_comment_position: AddCommentPosition,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            moderated: false,
            enable_auth_mode: false,
            authorize_sub_comments: true,
            delete_comments: false,
            id_mailing_list: 0,
            use_bbcode_editor: false,
            admin_badge: String::new(),
            message_comment_created: "Your comment has been saved.".to_string(),
            add_comment_position: AddCommentPosition::default(),
        }
    }
}

/// Configuration lookup for a comment target.
pub trait ConfigService: Send + Sync {
    /// Returns the configuration of the given resource, or `None` when
    /// commenting is not set up for it.
    fn find(&self, id_resource: &str, resource_type: &str) -> Option<CommentConfig>;
}

/// In-memory [`ConfigService`]: exact `(id, type)` entries first, then
/// a per-type fallback, then an optional catch-all default.
pub struct InMemoryConfigService {
    by_resource: HashMap<(String, String), CommentConfig>,
    by_type: HashMap<String, CommentConfig>,
    default: Option<CommentConfig>,
}

impl InMemoryConfigService {
    pub fn new(default: Option<CommentConfig>) -> Self {
        Self {
            by_resource: HashMap::new(),
            by_type: HashMap::new(),
            default,
        }
    }

    pub fn with_resource(mut self, id_resource: &str, resource_type: &str, config: CommentConfig) -> Self {
        self.by_resource
            .insert((id_resource.to_owned(), resource_type.to_owned()), config);
        self
    }

    pub fn with_type(mut self, resource_type: &str, config: CommentConfig) -> Self {
        self.by_type.insert(resource_type.to_owned(), config);
        self
    }
}

impl ConfigService for InMemoryConfigService {
    fn find(&self, id_resource: &str, resource_type: &str) -> Option<CommentConfig> {
        self.by_resource
            .get(&(id_resource.to_owned(), resource_type.to_owned()))
            .or_else(|| self.by_type.get(resource_type))
            .cloned()
            .or_else(|| self.default.clone())
    }
}
