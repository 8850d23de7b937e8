use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::{error::AppResult, middleware::RequestId, models::Listing};

use super::AppState;

/// Handler for similar-listing recommendations
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Listing>>> {
    tracing::debug!(request_id = %request_id, listing_id = id, "Recommendation request");

    let recommendations = state.recommender.recommend(id).await?;
    Ok(Json(recommendations))
}
