// Store-level tests for the comment repository.

mod common;

use sqlx::SqlitePool;

use comment_server::constants;
use comment_server::models::{CommentFilter, CommentState};
use comment_server::repositories::comment_repository;

use common::helpers::{sample_comment, seed, ts};

#[sqlx::test]
async fn insert_then_load_round_trips(pool: SqlitePool) {
    let mut comment = sample_comment("article-1", "article", 0);
    comment.user_name = Some("jdoe".to_owned());
    comment.is_important = true;
    comment.comment_order = 3;

    let created = seed(&pool, comment.clone()).await;
    assert!(created.id_comment > 0);

    let loaded = comment_repository::load(&pool, created.id_comment)
        .await
        .unwrap()
        .expect("comment should exist");

    assert_eq!(loaded.id_comment, created.id_comment);
    assert_eq!(loaded.id_resource, comment.id_resource);
    assert_eq!(loaded.resource_type, comment.resource_type);
    assert_eq!(loaded.name, comment.name);
    assert_eq!(loaded.email, comment.email);
    assert_eq!(loaded.ip_address, comment.ip_address);
    assert_eq!(loaded.content, comment.content);
    assert_eq!(loaded.is_published, comment.is_published);
    assert_eq!(loaded.id_parent_comment, comment.id_parent_comment);
    assert_eq!(loaded.is_admin_comment, comment.is_admin_comment);
    assert_eq!(loaded.user_name, comment.user_name);
    assert_eq!(loaded.is_pinned, comment.is_pinned);
    assert_eq!(loaded.comment_order, comment.comment_order);
    assert_eq!(loaded.is_important, comment.is_important);
    assert_eq!(
        loaded.date_comment.timestamp_millis(),
        comment.date_comment.timestamp_millis()
    );
}

#[sqlx::test]
async fn load_absent_comment_returns_none(pool: SqlitePool) {
    let loaded = comment_repository::load(&pool, 424_242).await.unwrap();
    assert!(loaded.is_none());
}

#[sqlx::test]
async fn store_updates_the_full_row(pool: SqlitePool) {
    let created = seed(&pool, sample_comment("article-1", "article", 0)).await;

    let mut updated = created.clone();
    updated.content = "edited body".to_owned();
    updated.is_pinned = true;
    updated.date_last_modif = ts(60);
    comment_repository::store(&pool, &updated).await.unwrap();

    let loaded = comment_repository::load(&pool, created.id_comment)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.content, "edited body");
    assert!(loaded.is_pinned);
}

#[sqlx::test]
async fn delete_by_resource_honors_the_wildcard(pool: SqlitePool) {
    seed(&pool, sample_comment("a", "article", 0)).await;
    seed(&pool, sample_comment("b", "article", 1)).await;
    seed(&pool, sample_comment("a", "document", 2)).await;

    // Concrete resource id: only that resource's comments go away.
    let removed = comment_repository::delete_by_resource(&pool, "a", "article")
        .await
        .unwrap();
    assert_eq!(removed, 1);

    // Wildcard: every remaining comment of the type goes away, other
    // types untouched.
    let removed =
        comment_repository::delete_by_resource(&pool, constants::WILDCARD_ID_RESOURCE, "article")
            .await
            .unwrap();
    assert_eq!(removed, 1);

    let document_count =
        comment_repository::get_comment_count(&pool, "a", "document", false, false)
            .await
            .unwrap();
    assert_eq!(document_count, 1);
}

#[sqlx::test]
async fn parent_listing_never_returns_children(pool: SqlitePool) {
    let root = seed(&pool, sample_comment("a", "article", 0)).await;
    let mut reply = sample_comment("a", "article", 1);
    reply.id_parent_comment = root.id_comment;
    seed(&pool, reply).await;

    let parents = comment_repository::find_parent_comments_by_resource(
        &pool,
        "a",
        "article",
        &CommentFilter::default(),
        0,
        0,
    )
    .await
    .unwrap();

    assert_eq!(parents.len(), 1);
    assert!(parents.iter().all(|c| c.id_parent_comment == 0));
}

#[sqlx::test]
async fn child_count_matches_filtered_child_listing(pool: SqlitePool) {
    let root = seed(&pool, sample_comment("a", "article", 0)).await;
    for i in 0..3 {
        let mut reply = sample_comment("a", "article", i + 1);
        reply.id_parent_comment = root.id_comment;
        reply.is_published = i != 1;
        seed(&pool, reply).await;
    }

    let published_count =
        comment_repository::count_by_id_parent(&pool, root.id_comment, true)
            .await
            .unwrap();
    let published_children = comment_repository::find_by_id_parent(
        &pool,
        root.id_comment,
        &CommentFilter::published(),
    )
    .await
    .unwrap();

    assert_eq!(published_count, 2);
    assert_eq!(published_children.len() as i64, published_count);

    let all_count = comment_repository::count_by_id_parent(&pool, root.id_comment, false)
        .await
        .unwrap();
    assert_eq!(all_count, 3);
}

#[sqlx::test]
async fn unrecognized_sort_falls_back_to_modification_date(pool: SqlitePool) {
    for i in 0..4 {
        let mut comment = sample_comment("a", "article", i);
        // Spread modification dates in reverse of creation order.
        comment.date_last_modif = ts(100 - i);
        seed(&pool, comment).await;
    }

    let bogus = CommentFilter {
        sorted_attribute: Some("name; DROP TABLE extend_comment".to_owned()),
        ..CommentFilter::default()
    };
    let fallback = CommentFilter {
        sorted_attribute: Some(constants::SORT_BY_DATE_MODIFICATION.to_owned()),
        ..CommentFilter::default()
    };

    let with_bogus = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &bogus, 0, 0,
    )
    .await
    .unwrap();
    let with_fallback = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &fallback, 0, 0,
    )
    .await
    .unwrap();

    let ids_bogus: Vec<i64> = with_bogus.iter().map(|c| c.id_comment).collect();
    let ids_fallback: Vec<i64> = with_fallback.iter().map(|c| c.id_comment).collect();
    assert_eq!(ids_bogus, ids_fallback);
    // Default direction is descending on the modification date.
    assert!(with_bogus
        .windows(2)
        .all(|w| w[0].date_last_modif >= w[1].date_last_modif));
}

#[sqlx::test]
async fn comment_order_sort_ranks_by_the_manual_order(pool: SqlitePool) {
    // Manual ordering disagrees with creation order on purpose.
    for (i, order) in [3, 1, 2].into_iter().enumerate() {
        let mut comment = sample_comment("a", "article", i as i64);
        comment.comment_order = order;
        seed(&pool, comment).await;
    }

    let filter = CommentFilter {
        sorted_attribute: Some(constants::SORT_BY_COMMENT_ORDER.to_owned()),
        asc_sort: Some(true),
        ..CommentFilter::default()
    };
    let found = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &filter, 0, 0,
    )
    .await
    .unwrap();

    let orders: Vec<i64> = found.iter().map(|c| c.comment_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[sqlx::test]
async fn pagination_slices_the_ordered_result_set(pool: SqlitePool) {
    for i in 0..7 {
        seed(&pool, sample_comment("a", "article", i)).await;
    }

    let filter = CommentFilter {
        sorted_attribute: Some(constants::SORT_BY_DATE_CREATION.to_owned()),
        asc_sort: Some(true),
        ..CommentFilter::default()
    };

    let full = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &filter, 0, 0,
    )
    .await
    .unwrap();
    assert_eq!(full.len(), 7);

    let slice = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &filter, 2, 3,
    )
    .await
    .unwrap();
    assert_eq!(slice.len(), 3);
    let expected: Vec<i64> = full[2..5].iter().map(|c| c.id_comment).collect();
    let actual: Vec<i64> = slice.iter().map(|c| c.id_comment).collect();
    assert_eq!(actual, expected);
}

#[sqlx::test]
async fn filters_compose_on_state_importance_and_pinned(pool: SqlitePool) {
    let mut a = sample_comment("a", "article", 0);
    a.is_important = true;
    seed(&pool, a).await;
    let mut b = sample_comment("a", "article", 1);
    b.is_important = true;
    b.is_pinned = true;
    seed(&pool, b).await;
    let mut c = sample_comment("a", "article", 2);
    c.is_published = false;
    c.is_important = true;
    seed(&pool, c).await;

    let filter = CommentFilter {
        state: Some(CommentState::Published),
        important: Some(true),
        pinned: Some(false),
        ..CommentFilter::default()
    };
    let found = comment_repository::find_parent_comments_by_resource(
        &pool, "a", "article", &filter, 0, 0,
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].is_important && !found[0].is_pinned && found[0].is_published);
}

#[sqlx::test]
async fn moderated_comment_becomes_countable_once_published(pool: SqlitePool) {
    let mut comment = sample_comment("vol-9", "article", 0);
    comment.is_published = false;
    let created = seed(&pool, comment).await;

    let before = comment_repository::get_comment_count(&pool, "vol-9", "article", true, true)
        .await
        .unwrap();
    assert_eq!(before, 0);

    comment_repository::update_comment_status(&pool, created.id_comment, true)
        .await
        .unwrap();

    let after = comment_repository::get_comment_count(&pool, "vol-9", "article", true, true)
        .await
        .unwrap();
    assert_eq!(after, 1);

    // The moderation toggle also bumps the modification date.
    let reloaded = comment_repository::load(&pool, created.id_comment)
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.date_last_modif > created.date_last_modif);
}

#[sqlx::test]
async fn last_comments_exclude_pinned_and_come_newest_first(pool: SqlitePool) {
    for i in 0..3 {
        let mut pinned = sample_comment("a", "article", i);
        pinned.is_pinned = true;
        seed(&pool, pinned).await;
    }
    let older = seed(&pool, sample_comment("a", "article", 10)).await;
    let newer = seed(&pool, sample_comment("a", "article", 20)).await;

    let last = comment_repository::select_last_comments(&pool, "a", "article", 5, true, true, true)
        .await
        .unwrap();

    let ids: Vec<i64> = last.iter().map(|c| c.id_comment).collect();
    assert_eq!(ids, vec![newer.id_comment, older.id_comment]);
}

#[sqlx::test]
async fn bulk_fetch_spans_multiple_resources(pool: SqlitePool) {
    seed(&pool, sample_comment("a", "article", 0)).await;
    seed(&pool, sample_comment("b", "article", 1)).await;
    seed(&pool, sample_comment("c", "article", 2)).await;
    seed(&pool, sample_comment("a", "document", 3)).await;

    let found = comment_repository::select_by_resource_list(
        &pool,
        &["a".to_owned(), "c".to_owned()],
        "article",
    )
    .await
    .unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|c| c.resource_type == "article"));
}

#[sqlx::test]
async fn most_commented_resources_rank_by_count(pool: SqlitePool) {
    for i in 0..3 {
        seed(&pool, sample_comment("busy", "article", i)).await;
    }
    seed(&pool, sample_comment("quiet", "article", 10)).await;

    let ranked =
        comment_repository::find_id_most_commented_resources(&pool, "article", false, 0, 10)
            .await
            .unwrap();
    assert_eq!(ranked, vec!["busy".to_owned(), "quiet".to_owned()]);
}

#[sqlx::test]
async fn ids_and_user_listings_cover_their_scopes(pool: SqlitePool) {
    let mut by_user = sample_comment("a", "article", 0);
    by_user.user_name = Some("jdoe".to_owned());
    let by_user = seed(&pool, by_user).await;
    let anonymous = seed(&pool, sample_comment("a", "article", 1)).await;

    let ids = comment_repository::find_ids_by_resource(&pool, "a", "article", false)
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&by_user.id_comment) && ids.contains(&anonymous.id_comment));

    let authored = comment_repository::find_comments_by_user_name(&pool, "jdoe", 0, 10)
        .await
        .unwrap();
    assert_eq!(authored.len(), 1);
    assert_eq!(authored[0].id_comment, by_user.id_comment);
}
