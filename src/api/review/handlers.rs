use crate::api::models::AppError;
use crate::api::state::AppState;
use crate::review::Review;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::{info, warn};

/// List every stored review. One invalid document fails the whole list.
pub async fn list_reviews_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Review>>, AppError> {
    let docs = state
        .reviews()?
        .stream()
        .await
        .map_err(|e| AppError::Internal(format!("Error reading reviews: {}", e)))?;

    let reviews = docs
        .into_iter()
        .map(|doc| {
            Review::from_document(doc.data).map_err(|e| {
                warn!(review_id = %doc.id, error = %e, "Stored review failed validation");
                AppError::Internal(format!("Error parsing review: {}", e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(count = reviews.len(), "Listed reviews");
    Ok(Json(reviews))
}

/// Create a review keyed by its `review_id` and echo the request back
pub async fn create_review_handler(
    State(state): State<AppState>,
    payload: Result<Json<Review>, JsonRejection>,
) -> Result<Json<Review>, AppError> {
    let Json(review) = payload?;
    let reviews = state.reviews()?;

    // Check-then-write is not atomic; concurrent creates may both pass
    let existing = reviews
        .get(&review.review_id)
        .await
        .map_err(|e| AppError::Internal(format!("Error reading review document: {}", e)))?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Review already exists".to_string()));
    }

    reviews
        .set(&review.review_id, review.to_document())
        .await
        .map_err(|e| AppError::Internal(format!("Error creating review document: {}", e)))?;

    info!(review_id = %review.review_id, ride_id = %review.ride_id, "Review created");
    Ok(Json(review))
}
