/// Change feed hub and event shapes.
pub mod feed;
/// Runtime session, title and status types.
pub mod session;
/// Forward-only phase machine.
pub mod state_machine;
/// Attrition turn rotation.
pub mod turns;
/// Feed-driven client view reducer.
pub mod view;

use std::{future::Future, sync::Arc, time::SystemTime};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{metadata::MetadataProvider, session_store::SessionStore},
    error::ServiceError,
    rules::scoring::RankBoard,
    state::{
        feed::FeedHub,
        session::Session,
        state_machine::{SessionEvent, SessionPhase, Transition},
    },
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Result of [`AppState::run_transition`].
#[derive(Debug)]
pub enum TransitionOutcome<T> {
    /// This caller moved the session forward.
    Applied {
        /// Session as persisted after the transition.
        session: Session,
        /// Value produced by the transformation.
        value: T,
    },
    /// The session had already left the source phase; nothing was done.
    AlreadyAdvanced {
        /// Phase observed instead.
        phase: SessionPhase,
    },
}

/// Central application state: storage slot, feed hub, metadata provider and
/// the per-session coordination structures.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    feed: FeedHub,
    metadata: Arc<dyn MetadataProvider>,
    config: AppConfig,
    rank_boards: DashMap<(Uuid, String), RankBoard>,
    transition_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    attack_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataProvider>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            feed: FeedHub::new(config.feed_capacity()),
            metadata,
            config,
            rank_boards: DashMap::new(),
            transition_gates: DashMap::new(),
            attack_gates: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow() || self.session_store.read().await.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Hub publishing document changes.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Metadata provider used for decks and winners.
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// In-progress rank boards keyed by session and participant.
    pub fn rank_boards(&self) -> &DashMap<(Uuid, String), RankBoard> {
        &self.rank_boards
    }

    /// Drop every in-memory structure kept for `session_id`.
    pub fn forget_session(&self, session_id: Uuid) {
        self.rank_boards.retain(|(owner, _), _| *owner != session_id);
        self.transition_gates.remove(&session_id);
        self.attack_gates.remove(&session_id);
    }

    /// Lock serialising attacks on `session_id`, held from the turn check to the win check.
    pub async fn lock_attacks(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        gate(&self.attack_gates, session_id).lock_owned().await
    }

    /// Move a session out of `event.source()` exactly once.
    ///
    /// Concurrent callers are serialised per session; whoever runs second sees the
    /// advanced phase and gets [`TransitionOutcome::AlreadyAdvanced`]. `work` receives
    /// the freshly loaded session and returns the session to persist plus a value for
    /// the caller. The session write is a compare-and-swap on the loaded revision, so
    /// a writer in another process also makes this call a no-op.
    pub async fn run_transition<F, Fut, T>(
        &self,
        session_id: Uuid,
        event: SessionEvent,
        work: F,
    ) -> Result<TransitionOutcome<T>, ServiceError>
    where
        F: FnOnce(Session, Arc<dyn SessionStore>) -> Fut,
        Fut: Future<Output = Result<(Session, T), ServiceError>>,
    {
        let _guard = gate(&self.transition_gates, session_id).lock_owned().await;

        let store = self.require_session_store().await?;
        let session: Session = store
            .find_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?
            .try_into()?;

        if session.phase != event.source() {
            debug!(session_id = %session_id, phase = ?session.phase, ?event, "transition already applied");
            return Ok(TransitionOutcome::AlreadyAdvanced {
                phase: session.phase,
            });
        }

        let transition = Transition::plan(session.phase, session.revision, event)?;

        let outcome = match self.config.transition_timeout() {
            Some(limit) => timeout(limit, work(session, store.clone()))
                .await
                .map_err(|_| ServiceError::Timeout)?,
            None => work(session, store.clone()).await,
        };
        let (mut next, value) = outcome?;

        next.phase = transition.to;
        next.updated_at = SystemTime::now();
        if let Err(err) = store
            .update_session(next.clone().into(), transition.revision)
            .await
        {
            if err.is_conflict() {
                debug!(session_id = %session_id, ?event, "lost transition race to another writer");
                return Ok(TransitionOutcome::AlreadyAdvanced {
                    phase: transition.to,
                });
            }
            return Err(err.into());
        }

        next.revision = transition.next_revision();
        Ok(TransitionOutcome::Applied {
            session: next,
            value,
        })
    }
}

fn gate(gates: &DashMap<Uuid, Arc<Mutex<()>>>, session_id: Uuid) -> Arc<Mutex<()>> {
    gates
        .entry(session_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}
