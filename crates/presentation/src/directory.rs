use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use shared::domain::{PresentationId, Role};
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::{
    actor::PresentationActor,
    registry::{Frame, SessionHandle},
    session::Session,
};

pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 64;

/// Maps presentation ids to their single actor.
pub struct PresentationDirectory {
    actors: RwLock<HashMap<PresentationId, Arc<PresentationActor>>>,
    session_queue_capacity: usize,
}

impl PresentationDirectory {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_SESSION_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(session_queue_capacity: usize) -> Self {
        Self {
            actors: RwLock::new(HashMap::new()),
            session_queue_capacity: session_queue_capacity.max(1),
        }
    }

    /// Returns the actor for `id`, creating it on first reference.
    pub async fn resolve(&self, id: &PresentationId) -> Arc<PresentationActor> {
        if let Some(actor) = self.actors.read().await.get(id) {
            return Arc::clone(actor);
        }

        let mut actors = self.actors.write().await;
        let actor = actors
            .entry(id.clone())
            .or_insert_with(|| Arc::new(PresentationActor::new(id.clone())));
        Arc::clone(actor)
    }

    pub async fn get(&self, id: &PresentationId) -> Option<Arc<PresentationActor>> {
        self.actors.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.actors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actors.read().await.is_empty()
    }

    /// Admits a new session into presentation `id` and returns it open,
    /// together with the queue its connection must drain.
    pub async fn open_session(
        &self,
        id: &PresentationId,
        role: Role,
    ) -> (Session, mpsc::Receiver<Frame>) {
        loop {
            let actor = self.resolve(id).await;
            let (handle, outbound) = SessionHandle::channel(role, self.session_queue_capacity);
            let session_id = handle.id;
            let detached = handle.detached_signal();
            // A retired actor has already left the map, so the next resolve builds a fresh one.
            if actor.admit(handle).await.is_ok() {
                return (Session::open(actor, session_id, role, detached), outbound);
            }
        }
    }

    /// Evicts actors with no sessions that have been idle for `max_idle`.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<PresentationId> {
        let now = Instant::now();
        let mut reaped = Vec::new();
        let mut actors = self.actors.write().await;
        actors.retain(|id, actor| {
            if actor.retire_if_idle(now, max_idle) {
                reaped.push(id.clone());
                false
            } else {
                true
            }
        });
        drop(actors);

        if !reaped.is_empty() {
            info!(count = reaped.len(), "reaped idle presentations");
        }
        reaped
    }
}

impl Default for PresentationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
