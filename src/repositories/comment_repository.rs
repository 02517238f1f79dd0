use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::Mutex;

use crate::constants;
use crate::models::{Comment, CommentFilter, CommentState};

const SELECT_ALL: &str = "SELECT id_comment, id_resource, resource_type, date_comment, name, \
     email, ip_address, content, is_published, date_last_modif, id_parent_comment, \
     is_admin_comment, user_name, is_pinned, comment_order, is_important FROM extend_comment";

const INSERT: &str = "INSERT INTO extend_comment ( id_resource, resource_type, date_comment, \
     name, email, ip_address, content, is_published, date_last_modif, id_parent_comment, \
     is_admin_comment, user_name, is_pinned, comment_order, is_important ) \
     VALUES ( ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? )";

const UPDATE: &str = "UPDATE extend_comment SET id_resource = ?, resource_type = ?, \
     date_comment = ?, name = ?, email = ?, ip_address = ?, content = ?, is_published = ?, \
     date_last_modif = ?, id_parent_comment = ?, is_admin_comment = ?, user_name = ?, \
     is_pinned = ?, comment_order = ?, is_important = ? WHERE id_comment = ?";

// Insertion is serialized process-wide so the generated-key read cannot
// race another insert on a shared connection.
static INSERT_LOCK: Mutex<()> = Mutex::const_new(());

/// Inserts a new comment and assigns its generated identifier.
pub async fn insert(pool: &SqlitePool, mut comment: Comment) -> Result<Comment, sqlx::Error> {
    let _guard = INSERT_LOCK.lock().await;
    let mut conn = pool.acquire().await?;

    let result = sqlx::query(INSERT)
        .bind(&comment.id_resource)
        .bind(&comment.resource_type)
        .bind(comment.date_comment)
        .bind(&comment.name)
        .bind(&comment.email)
        .bind(&comment.ip_address)
        .bind(&comment.content)
        .bind(comment.is_published)
        .bind(comment.date_last_modif)
        .bind(comment.id_parent_comment)
        .bind(comment.is_admin_comment)
        .bind(&comment.user_name)
        .bind(comment.is_pinned)
        .bind(comment.comment_order)
        .bind(comment.is_important)
        .execute(&mut *conn)
        .await?;

    comment.id_comment = result.last_insert_rowid();
    Ok(comment)
}

/// Fetches a single comment by its id.
pub async fn load(pool: &SqlitePool, id_comment: i64) -> Result<Option<Comment>, sqlx::Error> {
    sqlx::query_as::<_, Comment>(&format!("{SELECT_ALL} WHERE id_comment = ?"))
        .bind(id_comment)
        .fetch_optional(pool)
        .await
}

/// Full-row update keyed by the comment id.
pub async fn store(pool: &SqlitePool, comment: &Comment) -> Result<(), sqlx::Error> {
    sqlx::query(UPDATE)
        .bind(&comment.id_resource)
        .bind(&comment.resource_type)
        .bind(comment.date_comment)
        .bind(&comment.name)
        .bind(&comment.email)
        .bind(&comment.ip_address)
        .bind(&comment.content)
        .bind(comment.is_published)
        .bind(comment.date_last_modif)
        .bind(comment.id_parent_comment)
        .bind(comment.is_admin_comment)
        .bind(&comment.user_name)
        .bind(comment.is_pinned)
        .bind(comment.comment_order)
        .bind(comment.is_important)
        .bind(comment.id_comment)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes a single comment. Children are NOT cascaded; the controller
/// refuses to delete a comment that still has replies.
pub async fn delete(pool: &SqlitePool, id_comment: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM extend_comment WHERE id_comment = ?")
        .bind(id_comment)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Bulk delete for a resource. The wildcard id (`"*"`) drops the
/// resource-id filter and removes every comment of the given type.
pub async fn delete_by_resource(
    pool: &SqlitePool,
    id_resource: &str,
    resource_type: &str,
) -> Result<u64, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("DELETE FROM extend_comment WHERE resource_type = ");
    qb.push_bind(resource_type.to_owned());
    if id_resource != constants::WILDCARD_ID_RESOURCE {
        qb.push(" AND id_resource = ");
        qb.push_bind(id_resource.to_owned());
    }
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Moderation toggle; stamps the last-modification time to now.
pub async fn update_comment_status(
    pool: &SqlitePool,
    id_comment: i64,
    published: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE extend_comment SET is_published = ?, date_last_modif = ? WHERE id_comment = ?")
        .bind(published)
        .bind(Utc::now())
        .bind(id_comment)
        .execute(pool)
        .await?;
    Ok(())
}

/// Counts comments of a resource type, optionally narrowed to one
/// resource (wildcard id omits that filter), to published comments, or
/// to root comments.
pub async fn get_comment_count(
    pool: &SqlitePool,
    id_resource: &str,
    resource_type: &str,
    parents_only: bool,
    published_only: bool,
) -> Result<i64, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT COUNT(id_comment) FROM extend_comment WHERE resource_type = ");
    qb.push_bind(resource_type.to_owned());
    if id_resource != constants::WILDCARD_ID_RESOURCE {
        qb.push(" AND id_resource = ");
        qb.push_bind(id_resource.to_owned());
    }
    if published_only {
        qb.push(" AND is_published = 1");
    }
    if parents_only {
        qb.push(" AND id_parent_comment = 0");
    }
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Most-recent comments of a resource, pinned comments always
/// excluded, newest first by creation or modification date, capped at
/// `nb_comments` rows.
pub async fn select_last_comments(
    pool: &SqlitePool,
    id_resource: &str,
    resource_type: &str,
    nb_comments: i64,
    published_only: bool,
    parents_only: bool,
    sorted_by_date_creation: bool,
) -> Result<Vec<Comment>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_ALL);
    qb.push(" WHERE id_resource LIKE ");
    qb.push_bind(id_resource.to_owned());
    qb.push(" AND resource_type = ");
    qb.push_bind(resource_type.to_owned());
    if published_only {
        qb.push(" AND is_published = 1");
    }
    if parents_only {
        qb.push(" AND id_parent_comment = 0");
    }
    qb.push(" AND is_pinned = 0");
    if sorted_by_date_creation {
        qb.push(" ORDER BY date_comment DESC");
    } else {
        qb.push(" ORDER BY date_last_modif DESC");
    }
    qb.push(" LIMIT ");
    qb.push_bind(nb_comments);
    qb.build_query_as::<Comment>().fetch_all(pool).await
}

/// Bulk fetch across many resource ids in a single IN-clause query.
/// Callers are expected to pass a non-empty id list; an empty one
/// degenerates to an empty result.
pub async fn select_by_resource_list(
    pool: &SqlitePool,
    id_resources: &[String],
    resource_type: &str,
) -> Result<Vec<Comment>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_ALL);
    qb.push(" WHERE resource_type = ");
    qb.push_bind(resource_type.to_owned());
    qb.push(" AND id_resource IN (");
    let mut separated = qb.separated(", ");
    for id_resource in id_resources {
        separated.push_bind(id_resource.clone());
    }
    separated.push_unseparated(")");
    qb.build_query_as::<Comment>().fetch_all(pool).await
}

/// Paginated listing of the root comments of a resource, with the
/// composable filter and sort of [`CommentFilter`]. The wildcard
/// resource id matches every resource of the type. `max_items <= 0`
/// disables pagination and returns the full set.
pub async fn find_parent_comments_by_resource(
    pool: &SqlitePool,
    id_resource: &str,
    resource_type: &str,
    filter: &CommentFilter,
    items_offset: i64,
    max_items: i64,
) -> Result<Vec<Comment>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_ALL);
    qb.push(" WHERE id_resource LIKE ");
    if id_resource == constants::WILDCARD_ID_RESOURCE {
        qb.push_bind(constants::SQL_WILDCARD_ID_RESOURCE.to_owned());
    } else {
        qb.push_bind(id_resource.to_owned());
    }
    qb.push(" AND resource_type = ");
    qb.push_bind(resource_type.to_owned());
    qb.push(" AND id_parent_comment = 0");
    push_filter(&mut qb, filter);
    push_order_by(&mut qb, filter);
    push_limit(&mut qb, items_offset, max_items);
    qb.build_query_as::<Comment>().fetch_all(pool).await
}

/// Direct children of a comment, with the same filter and sort
/// composition as the root listing.
pub async fn find_by_id_parent(
    pool: &SqlitePool,
    id_parent: i64,
    filter: &CommentFilter,
) -> Result<Vec<Comment>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_ALL);
    qb.push(" WHERE id_parent_comment = ");
    qb.push_bind(id_parent);
    push_filter(&mut qb, filter);
    push_order_by(&mut qb, filter);
    qb.build_query_as::<Comment>().fetch_all(pool).await
}

/// Number of direct children of a comment.
pub async fn count_by_id_parent(
    pool: &SqlitePool,
    id_parent: i64,
    published_only: bool,
) -> Result<i64, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT COUNT(id_comment) FROM extend_comment WHERE id_parent_comment = ");
    qb.push_bind(id_parent);
    if published_only {
        qb.push(" AND is_published = 1");
    }
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Ids of every comment of a resource.
pub async fn find_ids_by_resource(
    pool: &SqlitePool,
    id_resource: &str,
    resource_type: &str,
    published_only: bool,
) -> Result<Vec<i64>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT id_comment FROM extend_comment WHERE id_resource = ");
    qb.push_bind(id_resource.to_owned());
    qb.push(" AND resource_type = ");
    qb.push_bind(resource_type.to_owned());
    if published_only {
        qb.push(" AND is_published = 1");
    }
    qb.build_query_scalar::<i64>().fetch_all(pool).await
}

/// Distinct resource ids of a type ranked by comment count, most
/// commented first, paginated like the other listings.
pub async fn find_id_most_commented_resources(
    pool: &SqlitePool,
    resource_type: &str,
    published_only: bool,
    items_offset: i64,
    max_items: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT DISTINCT id_resource FROM extend_comment e WHERE resource_type = ");
    qb.push_bind(resource_type.to_owned());
    qb.push(
        " ORDER BY ( SELECT COUNT(id_resource) FROM extend_comment ec \
         WHERE e.id_resource = ec.id_resource AND e.resource_type = ec.resource_type",
    );
    if published_only {
        qb.push(" AND is_published = 1");
    }
    qb.push(" ) DESC");
    push_limit(&mut qb, items_offset, max_items);
    qb.build_query_scalar::<String>().fetch_all(pool).await
}

/// Every comment authored by one authenticated identity, paginated.
pub async fn find_comments_by_user_name(
    pool: &SqlitePool,
    user_name: &str,
    items_offset: i64,
    max_items: i64,
) -> Result<Vec<Comment>, sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_ALL);
    qb.push(" WHERE user_name = ");
    qb.push_bind(user_name.to_owned());
    push_limit(&mut qb, items_offset, max_items);
    qb.build_query_as::<Comment>().fetch_all(pool).await
}

/// Appends the composable AND filters in their fixed declared order:
/// state, importance, pinned, user name.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CommentFilter) {
    match filter.state {
        Some(CommentState::Published) => {
            qb.push(" AND is_published = 1");
        }
        Some(CommentState::Unpublished) => {
            qb.push(" AND is_published = 0");
        }
        None => {}
    }
    if let Some(important) = filter.important {
        qb.push(if important {
            " AND is_important = 1"
        } else {
            " AND is_important = 0"
        });
    }
    if let Some(pinned) = filter.pinned {
        qb.push(if pinned {
            " AND is_pinned = 1"
        } else {
            " AND is_pinned = 0"
        });
    }
    if let Some(user_name) = filter.user_name.as_deref() {
        if !user_name.is_empty() {
            qb.push(" AND user_name = ");
            qb.push_bind(user_name.to_owned());
        }
    }
}

/// Appends the ORDER BY clause. Unrecognized attribute names fall back
/// to the modification date; the direction is descending unless an
/// ascending sort was explicitly requested.
fn push_order_by(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CommentFilter) {
    let attribute = match filter.sorted_attribute.as_deref() {
        Some(constants::SORT_BY_DATE_CREATION) => constants::SORT_BY_DATE_CREATION,
        Some(constants::SORT_BY_COMMENT_ORDER) => constants::SORT_BY_COMMENT_ORDER,
        _ => constants::SORT_BY_DATE_MODIFICATION,
    };
    qb.push(" ORDER BY ");
    qb.push(attribute);
    if filter.asc_sort == Some(true) {
        qb.push(" ASC");
    } else {
        qb.push(" DESC");
    }
}

/// Appends pagination. A non-positive `max_items` disables it.
fn push_limit(qb: &mut QueryBuilder<'_, Sqlite>, items_offset: i64, max_items: i64) {
    if max_items > 0 {
        qb.push(" LIMIT ");
        qb.push_bind(max_items);
        if items_offset > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(items_offset);
        }
    }
}
