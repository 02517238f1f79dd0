use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use thiserror::Error;
use tracing::error;

/// Controller failures that map to fixed HTTP responses. Validation
/// and policy refusals are rendered as pages by the handlers; only the
/// cases that short-circuit a whole request end up here.
#[derive(Debug, Error)]
pub enum PageError {
    /// Authentication is required for the target but the request
    /// carries no signed-in identity.
    #[error("user not signed in")]
    UserNotSignedIn { from_url: String },

    /// Any storage failure; propagated untouched, no retries.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::UserNotSignedIn { from_url } => {
                Redirect::to(&format!("/login?from={from_url}")).into_response()
            }
            PageError::Database(e) => {
                error!(error = %e, "comment storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while processing the comment.",
                )
                    .into_response()
            }
        }
    }
}
