use tera::Tera;

/// Builds the template registry used for page fragments and
/// notification mail bodies. Templates are embedded so the binary
/// stays self-contained.
pub fn build_templates() -> Tera {
    let mut tera = Tera::default();

    tera.add_raw_templates(vec![
        (
            "view_comments.html",
            include_str!("../templates/view_comments.html"),
        ),
        (
            "add_comment.html",
            include_str!("../templates/add_comment.html"),
        ),
        (
            "comment_created.html",
            include_str!("../templates/comment_created.html"),
        ),
        (
            "confirm_remove_comment.html",
            include_str!("../templates/confirm_remove_comment.html"),
        ),
        (
            "comment_notify_message.html",
            include_str!("../templates/comment_notify_message.html"),
        ),
        (
            "site_message.html",
            include_str!("../templates/site_message.html"),
        ),
    ])
    .expect("embedded comment templates must parse");

    tera
}
