use axum::{extract::State, Json};

use crate::{error::AppResult, models::GenreTag, state::AppState};

/// Handler for the genre taxonomy
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<GenreTag>>> {
    let genres = state.context.provider.list_genres().await?;
    Ok(Json(genres))
}
