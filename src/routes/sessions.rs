use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{genre_name, CatalogItem, GenreTag, Participant, PolicyVariant, SessionPhase, SurveyResponse},
    services::{
        posters::{PosterResolver, DEFAULT_POSTER_SIZE},
        session::SessionSnapshot,
        Ignored, Outcome, SelectionSession,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub participant_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub movie_id: u64,
}

/// A movie as rendered on the grid
#[derive(Debug, Serialize)]
pub struct MovieView {
    pub id: u64,
    pub title: String,
    pub release_year: Option<i32>,
    pub poster_url: String,
    pub genres: Vec<String>,
    pub overview: Option<String>,
    pub vote_average: f64,
    pub selected: bool,
}

impl MovieView {
    fn new(item: &CatalogItem, genres: &[GenreTag], posters: &PosterResolver, selected: bool) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            release_year: item.release_year,
            poster_url: posters.url(item.poster_path.as_deref(), DEFAULT_POSTER_SIZE),
            genres: item
                .genre_ids
                .iter()
                .map(|id| genre_name(*id, genres).to_string())
                .collect(),
            overview: item.overview.clone(),
            vote_average: item.vote_average,
            selected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub participant_id: String,
    pub name: String,
    pub group: &'static str,
    pub policy: PolicyVariant,
    pub phase: SessionPhase,
    pub recomputing: bool,
    pub can_refresh: bool,
    pub max_selections: usize,
    pub survey_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub selections: Vec<MovieView>,
    pub display: Vec<MovieView>,
}

impl SessionView {
    pub fn new(snapshot: &SessionSnapshot, posters: &PosterResolver) -> Self {
        let state = &snapshot.state;
        let selected = state.selected_ids();

        Self {
            id: snapshot.id,
            participant_id: snapshot.participant.participant_id.clone(),
            name: snapshot.participant.name.clone(),
            group: snapshot.policy.group(),
            policy: snapshot.policy,
            phase: state.phase,
            recomputing: snapshot.recomputing,
            can_refresh: snapshot.can_refresh,
            max_selections: state.max_selections(),
            survey_submitted: state.survey_submitted,
            created_at: snapshot.created_at,
            selections: state
                .selections
                .iter()
                .map(|item| MovieView::new(item, &state.genres, posters, true))
                .collect(),
            display: state
                .display
                .iter()
                .map(|item| MovieView::new(item, &state.genres, posters, selected.contains(&item.id)))
                .collect(),
        }
    }
}

/// Result of a selection, deselection or refresh
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub applied: bool,
    /// Why the action was a no-op, when it was
    pub ignored: Option<Ignored>,
    pub session: SessionView,
}

async fn respond(
    session: &SelectionSession,
    posters: &PosterResolver,
    outcome: Outcome,
) -> Json<ActionResponse> {
    let view = SessionView::new(&session.snapshot().await, posters);

    let ignored = match outcome {
        Outcome::Applied => None,
        Outcome::Ignored(reason) => Some(reason),
    };

    Json(ActionResponse {
        applied: ignored.is_none(),
        ignored,
        session: view,
    })
}

/// Handler for starting a session
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<SessionView>)> {
    let participant_id = request.participant_id.trim();
    let name = request.name.trim();
    if participant_id.is_empty() || name.is_empty() {
        return Err(AppError::InvalidInput(
            "participant_id and name are required".to_string(),
        ));
    }

    let participant = Participant {
        participant_id: participant_id.to_string(),
        name: name.to_string(),
    };

    let session = state.create_session(participant).await?;
    let view = SessionView::new(&session.snapshot().await, &state.posters);

    Ok((StatusCode::CREATED, Json(view)))
}

/// Handler for reading a session
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<SessionView>> {
    let session = state.session(id).await?;
    Ok(Json(SessionView::new(&session.snapshot().await, &state.posters)))
}

/// Handler for picking a movie from the grid
pub async fn select(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectRequest>,
) -> AppResult<Json<ActionResponse>> {
    let session = state.session(id).await?;
    let item = session
        .find_item(request.movie_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Movie {} is not on the grid", request.movie_id)))?;

    let outcome = session.select_item(item).await?;
    Ok(respond(&session, &state.posters, outcome).await)
}

/// Handler for removing a pick
pub async fn deselect(
    State(state): State<AppState>,
    Path((id, movie_id)): Path<(Uuid, u64)>,
) -> AppResult<Json<ActionResponse>> {
    let session = state.session(id).await?;
    let outcome = session.deselect_item(movie_id).await;
    Ok(respond(&session, &state.posters, outcome).await)
}

/// Handler for "get new options"
pub async fn refresh(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<ActionResponse>> {
    let session = state.session(id).await?;
    let outcome = session.refresh().await?;
    Ok(respond(&session, &state.posters, outcome).await)
}

/// Handler for the post-task questionnaire; the session is closed afterwards
pub async fn survey(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(survey): Json<SurveyResponse>,
) -> AppResult<StatusCode> {
    let session = state.session(id).await?;
    session.submit_survey(survey).await?;
    state.remove_session(id).await;
    Ok(StatusCode::NO_CONTENT)
}
