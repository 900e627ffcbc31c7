//! Selection session: the state machine behind one participant's run
//!
//! Phases move `Initializing → Ready → Submitting → Completed`. Every
//! mutation happens under the session lock and the lock is never held while
//! the catalog is queried, so the state and the recomputing indicator stay
//! readable while a new grid is being built.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        genre_name, CatalogItem, EventKind, EventRecord, GenreTag, Participant, PolicyVariant,
        SessionPhase, SurveyResponse, DISPLAY_SIZE, MAX_SELECTIONS,
    },
    services::{
        diversity::DiversitySampler,
        filter::ContentFilter,
        providers::CatalogProvider,
        random::RandomSource,
        relation::RelationSampler,
        results_logger::ResultsLogger,
    },
};

/// Below this many unselected items the static grid is padded with picks
pub const STATIC_BACKFILL_THRESHOLD: usize = 15;

/// Share of an adaptive grid drawn from the picked movie's genres
pub const ADAPTIVE_RELATED_PERCENT: usize = 80;

/// Refreshes draw from a random page in `1..=REFRESH_MAX_PAGE`
pub const REFRESH_MAX_PAGE: u32 = 5;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_selections: usize,
    /// Minimum time the recomputing indicator stays raised, for both arms
    pub min_recompute: Duration,
    /// Pause between the final pick and completion
    pub submit_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_selections: MAX_SELECTIONS,
            min_recompute: Duration::from_millis(1000),
            submit_delay: Duration::from_millis(1500),
        }
    }
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionContext {
    pub provider: Arc<dyn CatalogProvider>,
    pub diversity: Arc<DiversitySampler>,
    pub relation: Arc<RelationSampler>,
    pub random: Arc<RandomSource>,
    pub logger: ResultsLogger,
    pub settings: SessionSettings,
}

impl SessionContext {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        filter: ContentFilter,
        roster: Vec<u32>,
        random: Arc<RandomSource>,
        logger: ResultsLogger,
        settings: SessionSettings,
    ) -> Self {
        let filter = Arc::new(filter);
        let diversity = Arc::new(DiversitySampler::new(
            provider.clone(),
            filter.clone(),
            roster,
            random.clone(),
        ));
        let relation = Arc::new(
            RelationSampler::new(provider.clone(), filter, diversity.clone(), random.clone())
                .with_related_percent(ADAPTIVE_RELATED_PERCENT),
        );

        Self {
            provider,
            diversity,
            relation,
            random,
            logger,
            settings,
        }
    }
}

/// Why a session event was dropped as a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ignored {
    NotReady,
    LimitReached,
    AlreadySelected,
    NotSelected,
    RefreshDisabled,
    /// A later pick or refresh replaced the grid first
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(Ignored),
}

/// Mutable state of one session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub selections: Vec<CatalogItem>,
    pub display: Vec<CatalogItem>,
    /// Reshuffle source, retained only under the static policy
    pub initial_set: Option<Vec<CatalogItem>>,
    pub genres: Vec<GenreTag>,
    pub survey_submitted: bool,
    max_selections: usize,
}

impl SessionState {
    pub fn new(max_selections: usize) -> Self {
        Self {
            phase: SessionPhase::Initializing,
            selections: Vec::new(),
            display: Vec::new(),
            initial_set: None,
            genres: Vec::new(),
            survey_submitted: false,
            max_selections,
        }
    }

    pub fn max_selections(&self) -> usize {
        self.max_selections
    }

    pub fn is_selected(&self, movie_id: u64) -> bool {
        self.selections.iter().any(|item| item.id == movie_id)
    }

    pub fn selected_ids(&self) -> HashSet<u64> {
        self.selections.iter().map(|item| item.id).collect()
    }

    pub fn is_full(&self) -> bool {
        self.selections.len() >= self.max_selections
    }

    pub fn can_refresh(&self) -> bool {
        self.phase == SessionPhase::Ready && !self.is_full()
    }

    /// Appends a pick if every guard passes
    ///
    /// Moves to `Submitting` when the pick fills the selection set.
    pub fn try_select(&mut self, item: CatalogItem) -> Result<(), Ignored> {
        if self.phase != SessionPhase::Ready {
            return Err(Ignored::NotReady);
        }
        if self.is_full() {
            return Err(Ignored::LimitReached);
        }
        if self.is_selected(item.id) {
            return Err(Ignored::AlreadySelected);
        }

        self.selections.push(item);
        if self.is_full() {
            self.phase = SessionPhase::Submitting;
        }
        Ok(())
    }

    pub fn deselect(&mut self, movie_id: u64) -> Result<CatalogItem, Ignored> {
        if self.phase != SessionPhase::Ready {
            return Err(Ignored::NotReady);
        }
        let index = self
            .selections
            .iter()
            .position(|item| item.id == movie_id)
            .ok_or(Ignored::NotSelected)?;
        Ok(self.selections.remove(index))
    }

    pub fn primary_genre_name(&self, item: &CatalogItem) -> String {
        item.genre_ids
            .first()
            .map(|genre_id| genre_name(*genre_id, &self.genres).to_string())
            .unwrap_or_default()
    }
}

/// Static arm: the retained pool minus current picks, reshuffled
///
/// When fewer than `STATIC_BACKFILL_THRESHOLD` unselected items remain, the
/// earliest picks are shown again to keep the grid populated.
pub fn static_display(
    initial_set: &[CatalogItem],
    selections: &[CatalogItem],
    random: &RandomSource,
) -> Vec<CatalogItem> {
    let selected: HashSet<u64> = selections.iter().map(|item| item.id).collect();

    let mut display: Vec<CatalogItem> = initial_set
        .iter()
        .filter(|item| !selected.contains(&item.id))
        .cloned()
        .collect();

    if display.len() < STATIC_BACKFILL_THRESHOLD {
        let room = DISPLAY_SIZE.saturating_sub(display.len());
        display.extend(selections.iter().take(room).cloned());
    }

    random.shuffle(&mut display);
    display.truncate(DISPLAY_SIZE);
    display
}

/// Point-in-time copy of a session for callers
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub participant: Participant,
    pub policy: PolicyVariant,
    pub created_at: DateTime<Utc>,
    pub recomputing: bool,
    pub can_refresh: bool,
    pub state: SessionState,
}

/// Lowers the recomputing indicator even if the recompute is dropped midway
struct RecomputeGuard<'a>(&'a AtomicUsize);

impl Drop for RecomputeGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SelectionSession {
    id: Uuid,
    participant: Participant,
    policy: PolicyVariant,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    /// Recomputes in flight; the indicator is up while this is non-zero
    recomputing: AtomicUsize,
    /// Bumped by every grid-changing event; older results are discarded
    generation: AtomicU64,
    context: SessionContext,
}

impl SelectionSession {
    /// Loads the genre taxonomy and the first diversity grid
    ///
    /// The policy is fixed here, before any grid exists. A missing taxonomy
    /// only degrades genre names; an empty first grid fails the session.
    pub async fn start(
        participant: Participant,
        policy: PolicyVariant,
        context: SessionContext,
    ) -> AppResult<Self> {
        let id = Uuid::new_v4();
        let mut state = SessionState::new(context.settings.max_selections);

        tracing::info!(
            session_id = %id,
            participant_id = %participant.participant_id,
            policy = %policy,
            "Initializing selection session"
        );

        let (genres, pool) = tokio::join!(
            context.provider.list_genres(),
            context.diversity.sample(DISPLAY_SIZE, 1)
        );

        state.genres = genres.unwrap_or_else(|e| {
            tracing::warn!(session_id = %id, error = %e, "Genre list unavailable");
            Vec::new()
        });

        let pool = pool.map_err(|e| {
            tracing::error!(session_id = %id, error = %e, "Initial grid failed to load");
            e
        })?;

        if policy == PolicyVariant::Static {
            state.initial_set = Some(pool.clone());
        }
        state.display = pool;
        state.phase = SessionPhase::Ready;

        context
            .logger
            .log(EventRecord::new(&participant, policy, EventKind::SessionStart));

        tracing::info!(
            session_id = %id,
            displayed = state.display.len(),
            "Selection session ready"
        );

        Ok(Self {
            id,
            participant,
            policy,
            created_at: Utc::now(),
            state: Mutex::new(state),
            recomputing: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            context,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn policy(&self) -> PolicyVariant {
        self.policy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_recomputing(&self) -> bool {
        self.recomputing.load(Ordering::SeqCst) > 0
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            id: self.id,
            participant: self.participant.clone(),
            policy: self.policy,
            created_at: self.created_at,
            recomputing: self.is_recomputing(),
            can_refresh: state.can_refresh(),
            state: state.clone(),
        }
    }

    /// A movie the participant can currently see, on the grid or among picks
    pub async fn find_item(&self, movie_id: u64) -> Option<CatalogItem> {
        let state = self.state.lock().await;
        state
            .display
            .iter()
            .chain(state.selections.iter())
            .find(|item| item.id == movie_id)
            .cloned()
    }

    fn event(&self, kind: EventKind) -> EventRecord {
        EventRecord::new(&self.participant, self.policy, kind)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Runs `work` with the recomputing indicator raised for at least the
    /// configured minimum
    async fn recompute<T>(&self, work: impl Future<Output = T>) -> T {
        self.recomputing.fetch_add(1, Ordering::SeqCst);
        let _guard = RecomputeGuard(&self.recomputing);
        let started = Instant::now();

        let result = work.await;

        tokio::time::sleep_until(started + self.context.settings.min_recompute).await;
        result
    }

    /// Records a pick and rebuilds the grid according to the policy
    ///
    /// Redundant picks (duplicate id, set already full, session not ready)
    /// are ignored. A pick that passes the guards is kept even if the grid
    /// cannot be rebuilt; picked movies are then taken off the current grid.
    /// Reaching the selection limit completes the session after the submit
    /// delay.
    pub async fn select_item(&self, item: CatalogItem) -> AppResult<Outcome> {
        let (generation, selections, initial_set) = {
            let mut state = self.state.lock().await;

            if let Err(reason) = state.try_select(item.clone()) {
                tracing::debug!(
                    session_id = %self.id,
                    movie_id = item.id,
                    reason = ?reason,
                    "Selection ignored"
                );
                return Ok(Outcome::Ignored(reason));
            }

            let genre = state.primary_genre_name(&item);
            self.context
                .logger
                .log(self.event(EventKind::Select).with_movie(item.id, &genre));

            tracing::info!(
                session_id = %self.id,
                movie_id = item.id,
                selected = state.selections.len(),
                "Movie selected"
            );

            (
                self.next_generation(),
                state.selections.clone(),
                state.initial_set.clone(),
            )
        };

        let recomputed = self
            .recompute(async {
                match self.policy {
                    PolicyVariant::Static => Ok(static_display(
                        initial_set.as_deref().unwrap_or_default(),
                        &selections,
                        &self.context.random,
                    )),
                    PolicyVariant::Adaptive => {
                        let exclude: HashSet<u64> = selections.iter().map(|s| s.id).collect();
                        self.context
                            .relation
                            .sample(item.seed_genres(), &exclude, DISPLAY_SIZE)
                            .await
                    }
                }
            })
            .await;

        let submitting = {
            let mut state = self.state.lock().await;
            match recomputed {
                Ok(display) if self.is_current(generation) => state.display = display,
                Ok(_) => {
                    tracing::debug!(session_id = %self.id, generation, "Discarding stale grid");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.id,
                        error = %e,
                        "Grid rebuild failed, keeping current grid without picks"
                    );
                    if self.is_current(generation) {
                        let selected = state.selected_ids();
                        state.display.retain(|shown| !selected.contains(&shown.id));
                    }
                }
            }
            state.phase == SessionPhase::Submitting
        };

        if submitting {
            self.complete().await;
        }

        Ok(Outcome::Applied)
    }

    async fn complete(&self) {
        tokio::time::sleep(self.context.settings.submit_delay).await;

        let mut state = self.state.lock().await;
        if state.phase != SessionPhase::Submitting {
            return;
        }
        state.phase = SessionPhase::Completed;
        self.context.logger.log(self.event(EventKind::Completed));

        tracing::info!(
            session_id = %self.id,
            selected = state.selections.len(),
            "Selection session completed"
        );
    }

    /// Removes a pick; the grid is left as it is
    pub async fn deselect_item(&self, movie_id: u64) -> Outcome {
        let mut state = self.state.lock().await;

        match state.deselect(movie_id) {
            Ok(item) => {
                let genre = state.primary_genre_name(&item);
                self.context
                    .logger
                    .log(self.event(EventKind::Deselect).with_movie(item.id, &genre));
                tracing::info!(session_id = %self.id, movie_id, "Movie deselected");
                Outcome::Applied
            }
            Err(reason) => Outcome::Ignored(reason),
        }
    }

    /// Replaces the grid with a fresh diversity pool from a random page
    ///
    /// Under the static policy the new pool also becomes the reshuffle
    /// source. Disabled once the selection set is full.
    pub async fn refresh(&self) -> AppResult<Outcome> {
        let (generation, exclude) = {
            let state = self.state.lock().await;
            if !state.can_refresh() {
                return Ok(Outcome::Ignored(Ignored::RefreshDisabled));
            }
            (self.next_generation(), state.selected_ids())
        };

        let page = self.context.random.page(REFRESH_MAX_PAGE);
        let pool = self
            .recompute(
                self.context
                    .diversity
                    .sample(DISPLAY_SIZE + exclude.len(), page),
            )
            .await?;

        let pool: Vec<CatalogItem> = pool
            .into_iter()
            .filter(|item| !exclude.contains(&item.id))
            .take(DISPLAY_SIZE)
            .collect();

        if pool.is_empty() {
            return Err(AppError::PoolExhausted(
                "Refresh produced only already-selected movies".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            tracing::debug!(session_id = %self.id, generation, "Discarding stale refresh");
            return Ok(Outcome::Ignored(Ignored::Superseded));
        }

        if self.policy == PolicyVariant::Static {
            state.initial_set = Some(pool.clone());
        }
        state.display = pool;
        self.context.logger.log(self.event(EventKind::Refresh));

        tracing::info!(
            session_id = %self.id,
            page,
            displayed = state.display.len(),
            "Grid refreshed"
        );

        Ok(Outcome::Applied)
    }

    /// Forwards the post-task questionnaire; accepted once, after completion
    pub async fn submit_survey(&self, survey: SurveyResponse) -> AppResult<()> {
        survey.validate().map_err(AppError::InvalidInput)?;

        let mut state = self.state.lock().await;
        if state.phase != SessionPhase::Completed {
            return Err(AppError::InvalidInput(
                "Survey is only available after completing the selection".to_string(),
            ));
        }
        if state.survey_submitted {
            return Err(AppError::InvalidInput("Survey already submitted".to_string()));
        }

        state.survey_submitted = true;
        self.context
            .logger
            .log(self.event(EventKind::Survey).with_survey(&survey));

        tracing::info!(session_id = %self.id, "Survey submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::movie;
    use crate::services::providers::fake::FakeCatalog;
    use crate::services::results_logger::{recording::RecordingWriter, ResultsLoggerHandle};

    const ROSTER: [u32; 4] = [28, 18, 53, 27];

    fn genre_items(genre_id: u32, start: u64, count: u64) -> Vec<CatalogItem> {
        (start..start + count).map(|id| movie(id, &[genre_id])).collect()
    }

    /// Ten movies per roster genre plus deep Animation and Comedy catalogs
    /// outside the roster
    fn catalog() -> FakeCatalog {
        let mut catalog = FakeCatalog::default();
        for (i, genre_id) in ROSTER.iter().enumerate() {
            catalog = catalog.with_genre(*genre_id, genre_items(*genre_id, (i as u64 + 1) * 100, 10));
        }
        catalog
            .with_genre(16, genre_items(16, 1600, 30))
            .with_genre(35, (3500..3530).map(|id| movie(id, &[35, 16])).collect())
    }

    fn context(
        catalog: FakeCatalog,
        settings: SessionSettings,
    ) -> (SessionContext, Arc<RecordingWriter>, ResultsLoggerHandle) {
        shared_context(Arc::new(catalog), settings)
    }

    fn shared_context(
        catalog: Arc<FakeCatalog>,
        settings: SessionSettings,
    ) -> (SessionContext, Arc<RecordingWriter>, ResultsLoggerHandle) {
        let writer = Arc::new(RecordingWriter::default());
        let (logger, handle) = ResultsLogger::new(writer.clone());
        let context = SessionContext::new(
            catalog,
            ContentFilter::default(),
            ROSTER.to_vec(),
            Arc::new(RandomSource::seeded(17)),
            logger,
            settings,
        );
        (context, writer, handle)
    }

    fn instant_settings() -> SessionSettings {
        SessionSettings {
            min_recompute: Duration::ZERO,
            submit_delay: Duration::ZERO,
            ..SessionSettings::default()
        }
    }

    fn participant() -> Participant {
        Participant {
            participant_id: "S1234".to_string(),
            name: "Ada".to_string(),
        }
    }

    async fn session(policy: PolicyVariant) -> (SelectionSession, Arc<RecordingWriter>, ResultsLoggerHandle) {
        let (context, writer, handle) = context(catalog(), instant_settings());
        let session = SelectionSession::start(participant(), policy, context).await.unwrap();
        (session, writer, handle)
    }

    fn ids(items: &[CatalogItem]) -> HashSet<u64> {
        items.iter().map(|item| item.id).collect()
    }

    fn assert_valid_grid(items: &[CatalogItem]) {
        assert!(items.len() <= DISPLAY_SIZE);
        assert_eq!(ids(items).len(), items.len(), "duplicate ids in grid");
    }

    #[test]
    fn test_static_display_backfills_from_front_of_selections() {
        let initial: Vec<CatalogItem> = (1..=16).map(|id| movie(id, &[28])).collect();
        let selections = vec![initial[0].clone(), initial[1].clone()];

        let display = static_display(&initial, &selections, &RandomSource::seeded(1));

        // 14 unselected is below the threshold, so both picks come back
        assert_eq!(display.len(), 16);
        assert_eq!(ids(&display), ids(&initial));
    }

    #[test]
    fn test_static_display_without_backfill() {
        let initial: Vec<CatalogItem> = (1..=20).map(|id| movie(id, &[28])).collect();
        let selections = vec![initial[3].clone()];

        let display = static_display(&initial, &selections, &RandomSource::seeded(1));

        assert_eq!(display.len(), 19);
        assert!(!ids(&display).contains(&4));
    }

    #[test]
    fn test_state_guards() {
        let mut state = SessionState::new(2);
        assert_eq!(state.try_select(movie(1, &[28])), Err(Ignored::NotReady));

        state.phase = SessionPhase::Ready;
        assert_eq!(state.try_select(movie(1, &[28])), Ok(()));
        assert_eq!(state.try_select(movie(1, &[28])), Err(Ignored::AlreadySelected));
        assert_eq!(state.try_select(movie(2, &[28])), Ok(()));
        assert_eq!(state.phase, SessionPhase::Submitting);
        assert_eq!(state.try_select(movie(3, &[28])), Err(Ignored::NotReady));
        assert_eq!(state.selections.len(), 2);
    }

    #[tokio::test]
    async fn test_start_static_retains_initial_set() {
        let (session, _, _) = session(PolicyVariant::Static).await;
        let snapshot = session.snapshot().await;

        assert_eq!(snapshot.state.phase, SessionPhase::Ready);
        assert_eq!(snapshot.state.display.len(), DISPLAY_SIZE);
        assert_valid_grid(&snapshot.state.display);
        assert_eq!(snapshot.state.initial_set.as_ref(), Some(&snapshot.state.display));
        assert!(!snapshot.state.genres.is_empty());
    }

    #[tokio::test]
    async fn test_start_adaptive_keeps_no_initial_set() {
        let (session, _, _) = session(PolicyVariant::Adaptive).await;
        let snapshot = session.snapshot().await;

        assert_eq!(snapshot.state.display.len(), DISPLAY_SIZE);
        assert!(snapshot.state.initial_set.is_none());
    }

    #[tokio::test]
    async fn test_start_fails_when_no_genre_answers() {
        let mut catalog = catalog();
        for genre_id in ROSTER {
            catalog = catalog.failing(genre_id);
        }
        let (context, _, _) = context(catalog, instant_settings());

        let result = SelectionSession::start(participant(), PolicyVariant::Static, context).await;
        assert!(matches!(result, Err(AppError::PoolExhausted(_))));
    }

    #[tokio::test]
    async fn test_start_survives_missing_genre_list() {
        let mut catalog = catalog();
        catalog.genres_fail = true;
        let (context, _, _) = context(catalog, instant_settings());

        let session = SelectionSession::start(participant(), PolicyVariant::Adaptive, context)
            .await
            .unwrap();
        let snapshot = session.snapshot().await;

        assert!(snapshot.state.genres.is_empty());
        assert_eq!(snapshot.state.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_static_selection_stays_within_initial_pool() {
        let (session, _, _) = session(PolicyVariant::Static).await;
        let initial = session.snapshot().await.state.display;

        let outcome = session.select_item(initial[0].clone()).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let snapshot = session.snapshot().await;
        let allowed: HashSet<u64> = ids(&initial).union(&ids(&snapshot.state.selections)).copied().collect();
        assert_valid_grid(&snapshot.state.display);
        assert!(ids(&snapshot.state.display).is_subset(&allowed));
        assert_eq!(snapshot.state.display.len(), DISPLAY_SIZE - 1);
    }

    #[tokio::test]
    async fn test_adaptive_selection_excludes_selected_ids() {
        let (session, _, _) = session(PolicyVariant::Adaptive).await;
        let first = session.snapshot().await.state.display[0].clone();
        session.select_item(first).await.unwrap();

        let seed = movie(9001, &[16, 35]);
        session.select_item(seed).await.unwrap();

        let snapshot = session.snapshot().await;
        let selected = ids(&snapshot.state.selections);
        assert_valid_grid(&snapshot.state.display);
        assert_eq!(snapshot.state.display.len(), DISPLAY_SIZE);
        assert!(ids(&snapshot.state.display).is_disjoint(&selected));

        let animation = snapshot
            .state
            .display
            .iter()
            .filter(|item| item.genre_ids[0] == 16)
            .count();
        assert!(animation >= 8);
    }

    #[tokio::test]
    async fn test_duplicate_selection_is_ignored() {
        let (session, _, _) = session(PolicyVariant::Static).await;
        let item = session.snapshot().await.state.display[0].clone();

        session.select_item(item.clone()).await.unwrap();
        let outcome = session.select_item(item).await.unwrap();

        assert_eq!(outcome, Outcome::Ignored(Ignored::AlreadySelected));
        assert_eq!(session.snapshot().await.state.selections.len(), 1);
    }

    #[tokio::test]
    async fn test_five_selections_complete_and_sixth_is_ignored() {
        let (session, writer, handle) = session(PolicyVariant::Static).await;
        let grid = session.snapshot().await.state.display;

        for item in grid.iter().take(MAX_SELECTIONS) {
            let outcome = session.select_item(item.clone()).await.unwrap();
            assert_eq!(outcome, Outcome::Applied);
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state.phase, SessionPhase::Completed);
        assert_eq!(snapshot.state.selections.len(), MAX_SELECTIONS);
        assert!(!snapshot.can_refresh);

        let sixth = session.select_item(grid[MAX_SELECTIONS].clone()).await.unwrap();
        assert_eq!(sixth, Outcome::Ignored(Ignored::NotReady));
        assert_eq!(session.snapshot().await.state.selections, snapshot.state.selections);

        handle.shutdown().await;
        let kinds = writer.kinds();
        assert_eq!(kinds.first(), Some(&EventKind::SessionStart));
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Select).count(), 5);
        assert_eq!(kinds.last(), Some(&EventKind::Completed));
    }

    #[tokio::test]
    async fn test_adaptive_session_completes() {
        let (session, _, _) = session(PolicyVariant::Adaptive).await;

        for _ in 0..MAX_SELECTIONS {
            let next = session.snapshot().await.state.display[0].clone();
            session.select_item(next).await.unwrap();
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state.phase, SessionPhase::Completed);
        assert_eq!(ids(&snapshot.state.selections).len(), MAX_SELECTIONS);
    }

    #[tokio::test]
    async fn test_deselect_leaves_grid_untouched() {
        let (session, _, _) = session(PolicyVariant::Static).await;
        let item = session.snapshot().await.state.display[0].clone();
        session.select_item(item.clone()).await.unwrap();
        let grid_before = session.snapshot().await.state.display;

        assert_eq!(session.deselect_item(item.id).await, Outcome::Applied);
        assert_eq!(
            session.deselect_item(item.id).await,
            Outcome::Ignored(Ignored::NotSelected)
        );

        let snapshot = session.snapshot().await;
        assert!(snapshot.state.selections.is_empty());
        assert_eq!(snapshot.state.display, grid_before);
    }

    #[tokio::test]
    async fn test_refresh_resets_static_pool_and_excludes_picks() {
        let (session, writer, handle) = session(PolicyVariant::Static).await;
        let picked = session.snapshot().await.state.display[0].clone();
        session.select_item(picked.clone()).await.unwrap();

        assert_eq!(session.refresh().await.unwrap(), Outcome::Applied);

        let snapshot = session.snapshot().await;
        assert_valid_grid(&snapshot.state.display);
        assert!(!ids(&snapshot.state.display).contains(&picked.id));
        assert_eq!(snapshot.state.initial_set.as_ref(), Some(&snapshot.state.display));

        handle.shutdown().await;
        assert!(writer.kinds().contains(&EventKind::Refresh));
    }

    #[tokio::test]
    async fn test_refresh_disabled_once_full() {
        let (session, _, _) = session(PolicyVariant::Adaptive).await;
        for _ in 0..MAX_SELECTIONS {
            let next = session.snapshot().await.state.display[0].clone();
            session.select_item(next).await.unwrap();
        }

        assert_eq!(
            session.refresh().await.unwrap(),
            Outcome::Ignored(Ignored::RefreshDisabled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recomputing_indicator_held_for_minimum() {
        let settings = SessionSettings {
            min_recompute: Duration::from_millis(1000),
            submit_delay: Duration::ZERO,
            ..SessionSettings::default()
        };
        let (context, _, _) = context(catalog(), settings);
        let session = Arc::new(
            SelectionSession::start(participant(), PolicyVariant::Static, context)
                .await
                .unwrap(),
        );
        let item = session.snapshot().await.state.display[0].clone();

        let started = Instant::now();
        let background = session.clone();
        let task = tokio::spawn(async move { background.select_item(item).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(session.is_recomputing());
        assert!(session.snapshot().await.recomputing);

        task.await.unwrap().unwrap();
        assert!(!session.is_recomputing());
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_adaptive_grid_is_discarded() {
        let catalog = catalog().with_genre(12, genre_items(12, 1200, 30)).slow(12, Duration::from_secs(2));
        let (context, _, _) = context(catalog, instant_settings());
        let session = Arc::new(
            SelectionSession::start(participant(), PolicyVariant::Adaptive, context)
                .await
                .unwrap(),
        );

        // The slow pick starts first but finishes last
        let background = session.clone();
        let slow = tokio::spawn(async move { background.select_item(movie(9001, &[12])).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.select_item(movie(9002, &[16])).await.unwrap();
        slow.await.unwrap().unwrap();

        let display = session.snapshot().await.state.display;
        assert!(display.iter().all(|item| item.genre_ids[0] != 12));
        assert!(display.iter().any(|item| item.genre_ids[0] == 16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_refresh_is_reported() {
        let catalog = catalog().slow(28, Duration::from_secs(2));
        let (context, _, _) = context(catalog, instant_settings());
        let session = Arc::new(
            SelectionSession::start(participant(), PolicyVariant::Static, context)
                .await
                .unwrap(),
        );
        let pick = session.snapshot().await.state.display[0].clone();

        let background = session.clone();
        let refresh = tokio::spawn(async move { background.refresh().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.select_item(pick.clone()).await.unwrap();
        let grid_after_pick = ids(&session.snapshot().await.state.display);

        let outcome = refresh.await.unwrap().unwrap();
        assert_eq!(outcome, Outcome::Ignored(Ignored::Superseded));

        let snapshot = session.snapshot().await;
        assert_eq!(ids(&snapshot.state.display), grid_after_pick);
        assert!(!grid_after_pick.contains(&pick.id));
    }

    #[tokio::test]
    async fn test_pick_survives_catalog_outage() {
        let catalog = Arc::new(catalog());
        let (context, _, _) = shared_context(catalog.clone(), instant_settings());
        let session = SelectionSession::start(participant(), PolicyVariant::Adaptive, context)
            .await
            .unwrap();

        let first = session.snapshot().await.state.display[0].clone();
        assert_eq!(session.select_item(first.clone()).await.unwrap(), Outcome::Applied);

        catalog.go_offline();
        let grid = session.snapshot().await.state.display;
        let second = grid[0].clone();

        let outcome = session.select_item(second.clone()).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let snapshot = session.snapshot().await;
        assert_eq!(ids(&snapshot.state.selections), ids(&[first.clone(), second.clone()]));
        assert_eq!(snapshot.state.phase, SessionPhase::Ready);
        assert!(!snapshot.recomputing);
        assert_valid_grid(&snapshot.state.display);
        assert_eq!(snapshot.state.display.len(), grid.len() - 1);
        assert!(!ids(&snapshot.state.display).contains(&second.id));
        assert!(!ids(&snapshot.state.display).contains(&first.id));

        assert_eq!(
            session.select_item(second).await.unwrap(),
            Outcome::Ignored(Ignored::AlreadySelected)
        );
    }

    #[tokio::test]
    async fn test_survey_only_after_completion() {
        let (session, writer, handle) = session(PolicyVariant::Static).await;
        let survey = SurveyResponse {
            helpfulness: 4,
            satisfaction: 4,
            ease: 5,
            personalization: 3,
            trust: 4,
            reuse: 5,
            open_feedback: String::new(),
        };

        assert!(matches!(
            session.submit_survey(survey.clone()).await,
            Err(AppError::InvalidInput(_))
        ));

        let grid = session.snapshot().await.state.display;
        for item in grid.iter().take(MAX_SELECTIONS) {
            session.select_item(item.clone()).await.unwrap();
        }

        session.submit_survey(survey.clone()).await.unwrap();
        assert!(session.submit_survey(survey).await.is_err());

        handle.shutdown().await;
        let records = writer.records.lock().unwrap();
        let survey_row = records
            .iter()
            .find(|record| record.event_type == EventKind::Survey)
            .unwrap();
        assert_eq!(survey_row.survey_ease, "5");
        assert_eq!(survey_row.group, "A");
    }
}
