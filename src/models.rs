use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A comment attached to an extendable resource — an opaque
/// `(id_resource, resource_type)` pair owned by the host CMS.
///
/// Threading is an adjacency list: `id_parent_comment == 0` marks a
/// root comment, any other value references an existing comment. The
/// schema does not stop deeper nesting, but the page controller
/// assumes at most one level of replies (roots and their direct
/// children) when rendering threads and deciding what is deletable.
#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct Comment {
    pub id_comment: i64,
    pub id_resource: String,
    pub resource_type: String,
    pub date_comment: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub ip_address: String,
    pub content: String,
    pub is_published: bool,
    pub date_last_modif: DateTime<Utc>,
    pub id_parent_comment: i64,
    pub is_admin_comment: bool,
    pub user_name: Option<String>,
    pub is_pinned: bool,
    pub comment_order: i64,
    pub is_important: bool,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.id_parent_comment == 0
    }
}

/// Publication state selector used by [`CommentFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentState {
    Published,
    Unpublished,
}

/// Composable filter and sort for comment listings.
///
/// Filters are ANDed in a fixed declared order: state, importance,
/// pinned, user name. The sort attribute must be one of
/// `date_comment`, `date_last_modif` or `comment_order`; unrecognized
/// names silently fall back to the modification date, and the
/// direction defaults to descending. Both rules are compatibility
/// contracts, not implementation accidents.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub state: Option<CommentState>,
    pub important: Option<bool>,
    pub pinned: Option<bool>,
    pub user_name: Option<String>,
    pub sorted_attribute: Option<String>,
    pub asc_sort: Option<bool>,
}

impl CommentFilter {
    /// Filter for publicly visible listings.
    pub fn published() -> Self {
        Self {
            state: Some(CommentState::Published),
            ..Self::default()
        }
    }
}

/// A root comment bundled with its direct published replies, as
/// rendered by the threaded view.
#[derive(Serialize, Debug, Clone)]
pub struct CommentThreadItem {
    #[serde(flatten)]
    pub comment: Comment,
    pub sub_comments: Vec<Comment>,
}
