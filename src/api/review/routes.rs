use crate::api::review::handlers::{create_review_handler, list_reviews_handler};
use crate::api::state::AppState;
use axum::{routing::get, Router};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews_handler).post(create_review_handler))
}
