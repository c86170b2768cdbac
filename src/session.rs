use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::AdviceVariant;
use crate::error::{FlowError, ValidationError};
use crate::flow::{AppState, DiagnosisFlow};
use crate::predictor::Predictor;
use crate::present::{present, View};
use crate::progress::ProgressTicker;
use crate::upload::ImageFile;

/// Per-session knobs shared by every session of one process.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub advice_variant: AdviceVariant,
    pub progress_interval: Duration,
}

/// Floor for the expiry sweep period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Inner {
    flow: DiagnosisFlow,
    progress: Option<ProgressTicker>,
    touched: Instant,
}

impl Inner {
    fn view(&self) -> View {
        let step = self.progress.as_ref().map_or(0, ProgressTicker::step);
        present(&self.flow, step)
    }
}

/// One browser tab's worth of flow state. The predictor call runs without
/// holding the lock.
pub struct Session {
    id: Uuid,
    inner: Mutex<Inner>,
    predictor: Arc<dyn Predictor>,
    settings: SessionSettings,
}

impl Session {
    pub fn new(predictor: Arc<dyn Predictor>, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(Inner {
                flow: DiagnosisFlow::new(settings.advice_variant),
                progress: None,
                touched: Instant::now(),
            }),
            predictor,
            settings,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Locks the session and marks it as used.
    async fn touch(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().await;
        inner.touched = Instant::now();
        inner
    }

    pub async fn state(&self) -> AppState {
        self.touch().await.flow.state()
    }

    pub async fn view(&self) -> View {
        self.touch().await.view()
    }

    /// True when nothing used the session for `idle_timeout` and no analysis
    /// is in flight.
    async fn is_idle_for(&self, idle_timeout: Duration) -> bool {
        let inner = self.inner.lock().await;
        inner.flow.state() != AppState::Analyzing && inner.touched.elapsed() >= idle_timeout
    }

    pub async fn select_file(&self, file: ImageFile) -> Result<View, FlowError> {
        let mut inner = self.touch().await;
        inner.flow.select_file(file)?;
        Ok(inner.view())
    }

    /// Records a rejection for a file that never made it into an
    /// [`ImageFile`], such as an over-limit request body.
    pub async fn reject_file(&self, err: &ValidationError) -> Result<(), FlowError> {
        let mut inner = self.touch().await;
        if inner.flow.state() != AppState::Idle {
            return Err(FlowError::Busy);
        }
        inner.flow.upload_mut().reject(err);
        Ok(())
    }

    pub async fn clear_selection(&self) -> Result<View, FlowError> {
        let mut inner = self.touch().await;
        inner.flow.clear_selection()?;
        Ok(inner.view())
    }

    /// Starts one analysis cycle. Returns `None` when the guard refuses
    /// (nothing selected, or not idle). Otherwise the prediction runs on its
    /// own task, so it completes even if the caller goes away; the handle
    /// resolves to the terminal state.
    pub async fn analyze(self: &Arc<Self>) -> Option<JoinHandle<AppState>> {
        let request = {
            let mut inner = self.touch().await;
            let request = inner.flow.begin_analysis()?;
            inner.progress = Some(ProgressTicker::start(self.settings.progress_interval));
            request
        };

        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = session.predictor.predict(&request).await;

            let mut inner = session.touch().await;
            inner.progress = None;
            let state = inner.flow.complete(outcome);
            debug!(session = %session.id, ?state, "analysis cycle closed");
            state
        }))
    }

    /// Returns to idle from a terminal state. `false` when nothing happened.
    pub async fn reset(&self) -> bool {
        let mut inner = self.touch().await;
        let reset = inner.flow.reset();
        if reset {
            inner.progress = None;
        }
        reset
    }

    pub async fn progress_running(&self) -> bool {
        self.touch()
            .await
            .progress
            .as_ref()
            .is_some_and(ProgressTicker::is_running)
    }
}

/// In-memory registry of live sessions.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
    predictor: Arc<dyn Predictor>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(predictor: Arc<dyn Predictor>, settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            predictor,
            settings,
        }
    }

    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Arc::clone(&self.predictor), self.settings));
        self.sessions.insert(session.id(), Arc::clone(&session));
        info!(session = %session.id(), live = self.len(), "session created");
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session left untouched for `idle_timeout`. Sessions with
    /// an analysis in flight are kept. Returns how many were dropped.
    pub async fn expire_idle(&self, idle_timeout: Duration) -> usize {
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut expired = 0;
        for session in candidates {
            if session.is_idle_for(idle_timeout).await && self.remove(&session.id()) {
                debug!(session = %session.id(), "session expired");
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, live = self.len(), "idle sessions expired");
        }
        expired
    }

    /// Runs [`SessionStore::expire_idle`] periodically until the store is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, idle_timeout: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = (idle_timeout / 4).max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.expire_idle(idle_timeout).await;
            }
        })
    }
}
