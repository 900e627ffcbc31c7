use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{Participant, PolicyVariant},
    services::{
        CatalogProvider, ContentFilter, PosterResolver, RandomSource, ResultsLogger,
        SelectionSession, SessionContext, SessionSettings,
    },
};

/// How often the registry is checked for expired sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub context: SessionContext,
    pub posters: PosterResolver,
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<SelectionSession>>>>,
}

impl AppState {
    pub fn new(context: SessionContext, posters: PosterResolver) -> Self {
        Self {
            context,
            posters,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wires the samplers, filter and session timings from configuration
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn CatalogProvider>,
        logger: ResultsLogger,
    ) -> Self {
        let filter = ContentFilter::new(
            config.excluded_genres.iter().copied(),
            config.filter_language.clone(),
        );
        let settings = SessionSettings {
            max_selections: config.max_selections,
            min_recompute: Duration::from_millis(config.min_recompute_ms),
            submit_delay: Duration::from_millis(config.submit_delay_ms),
        };
        let context = SessionContext::new(
            provider,
            filter,
            config.genre_roster.clone(),
            Arc::new(RandomSource::from_entropy()),
            logger,
            settings,
        );

        Self::new(context, PosterResolver::new(config.tmdb_image_url.clone()))
    }

    /// Starts a session under a randomly assigned policy and registers it
    pub async fn create_session(&self, participant: Participant) -> AppResult<Arc<SelectionSession>> {
        let policy = self.context.random.policy();
        self.create_session_with_policy(participant, policy).await
    }

    pub async fn create_session_with_policy(
        &self,
        participant: Participant,
        policy: PolicyVariant,
    ) -> AppResult<Arc<SelectionSession>> {
        let session = Arc::new(SelectionSession::start(participant, policy, self.context.clone()).await?);

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id(), session.clone());
        tracing::debug!(session_id = %session.id(), active = sessions.len(), "Session registered");

        Ok(session)
    }

    pub async fn session(&self, id: Uuid) -> AppResult<Arc<SelectionSession>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    /// Drops a session from the registry, e.g. once its survey is in
    pub async fn remove_session(&self, id: Uuid) -> Option<Arc<SelectionSession>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, active = sessions.len(), "Session removed");
        }
        removed
    }

    /// Removes sessions created at least `max_age` ago and returns how many
    pub async fn evict_expired(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, session| {
            let age = (now - session.created_at()).to_std().unwrap_or_default();
            age < max_age
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, active = sessions.len(), "Expired sessions evicted");
        }
        evicted
    }

    /// Periodically evicts sessions older than `ttl` until the task is aborted
    pub fn spawn_session_sweeper(&self, ttl: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL.min(ttl));
            loop {
                ticker.tick().await;
                state.evict_expired(ttl).await;
            }
        })
    }
}
