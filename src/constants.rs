//! Action selectors and tuning defaults shared between the page
//! controller and its templates.

// Actions dispatched from the `action` request parameter. Submission
// arrives as a POST and needs no selector.
pub const ACTION_ADD_COMMENT: &str = "add-comment";
pub const ACTION_CONFIRM_REMOVE_COMMENT: &str = "confirm-remove-comment";
pub const ACTION_REMOVE_COMMENT: &str = "remove-comment";

// Sentinel `from_url` value meaning "reuse the URL stored in the session".
pub const FROM_SESSION: &str = "from_session";

// Wildcard resource id accepted by the store's bulk operations.
pub const WILDCARD_ID_RESOURCE: &str = "*";
// SQL LIKE pattern the wildcard maps to.
pub const SQL_WILDCARD_ID_RESOURCE: &str = "%";

// Sort attribute names the store accepts; anything else falls back to
// the modification date.
pub const SORT_BY_DATE_CREATION: &str = "date_comment";
pub const SORT_BY_DATE_MODIFICATION: &str = "date_last_modif";
pub const SORT_BY_COMMENT_ORDER: &str = "comment_order";

pub const DEFAULT_ITEMS_PER_PAGE: u32 = 50;
pub const MAX_COMMENT_CONTENT_LENGTH: usize = 10_000;
pub const MAX_NAME_LENGTH: usize = 255;

// Extender type recorded in the audit history.
pub const EXTENDER_TYPE_COMMENT: &str = "comment";

// Anchor appended to redirect URLs so the browser lands on the result
// message.
pub const ADD_COMMENT_MESSAGE_ANCHOR: &str = "extend-comment-message";
