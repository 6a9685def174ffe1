use std::time::{Duration, Instant};

use anyhow::Result;
use shared::{
    domain::{PresentationId, PresentationState, Role, SessionId},
    protocol::{ClientMessage, ServerMessage},
};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::{
    command::{self, Effect},
    fanout::{self, Audience},
    region::{self, RegionStore},
    registry::{SessionHandle, SessionRegistry},
    state::StateStore,
};

#[derive(Debug, Error)]
#[error("presentation {0} was retired")]
pub struct Retired(pub PresentationId);

/// The single authority for one presentation.
///
/// State and registry sit behind one async mutex, so admission, removal and
/// command handling for a presentation are applied one at a time in arrival
/// order. Fan-out happens while the lock is held but never waits on a peer.
pub struct PresentationActor {
    id: PresentationId,
    inner: Mutex<Inner>,
    colo: OnceCell<String>,
}

struct Inner {
    store: StateStore,
    registry: SessionRegistry,
    last_activity: Instant,
    retired: bool,
}

impl PresentationActor {
    pub fn new(id: PresentationId) -> Self {
        info!(presentation_id = %id, "presentation created");
        Self {
            id,
            inner: Mutex::new(Inner {
                store: StateStore::new(),
                registry: SessionRegistry::new(),
                last_activity: Instant::now(),
                retired: false,
            }),
            colo: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &PresentationId {
        &self.id
    }

    /// Adds a session. A voter joining is announced to presenters.
    pub async fn admit(&self, session: SessionHandle) -> Result<(), Retired> {
        let mut inner = self.inner.lock().await;
        if inner.retired {
            return Err(Retired(self.id.clone()));
        }
        inner.touch();

        let role = session.role;
        info!(
            presentation_id = %self.id,
            session_id = %session.id,
            %role,
            "session admitted"
        );
        inner.registry.admit(session);
        if role == Role::Voter {
            inner.sync_voter_count(&self.id);
        }
        Ok(())
    }

    /// Removes a session; calling it again for the same session is a no-op.
    pub async fn remove(&self, session_id: SessionId) -> bool {
        let mut inner = self.inner.lock().await;
        inner.touch();
        inner.remove_session(&self.id, session_id)
    }

    /// Applies one command from `session_id`. Returns `false` when the
    /// session is not registered here, in which case nothing happens.
    pub async fn handle(&self, session_id: SessionId, message: ClientMessage) -> bool {
        let mut inner = self.inner.lock().await;
        inner.touch();

        let Some(session) = inner.registry.get(session_id).cloned() else {
            debug!(
                presentation_id = %self.id,
                %session_id,
                kind = message.kind(),
                "command from unknown session ignored"
            );
            return false;
        };

        let kind = message.kind();
        match command::apply(&mut inner.store, session.role, message) {
            Effect::None => {
                debug!(presentation_id = %self.id, %session_id, kind, "command left state unchanged");
            }
            Effect::Reply(reply) => {
                let delivery = fanout::send_to(&session, &reply);
                if !delivery.lagging.is_empty() {
                    inner.drop_lagging(&self.id, delivery.lagging);
                }
            }
            Effect::Broadcast(audience) => {
                debug!(presentation_id = %self.id, %session_id, kind, ?audience, "state changed");
                inner.broadcast(&self.id, audience);
            }
        }
        true
    }

    pub async fn snapshot(&self) -> PresentationState {
        self.inner.lock().await.store.snapshot().clone()
    }

    pub async fn voter_count(&self) -> usize {
        self.inner.lock().await.registry.voter_count()
    }

    pub async fn presenter_count(&self) -> usize {
        self.inner.lock().await.registry.presenter_count()
    }

    /// Storage region of this presentation, resolved at most once per actor.
    pub async fn storage_region(&self, store: &dyn RegionStore, local_colo: &str) -> Result<String> {
        let colo = self
            .colo
            .get_or_try_init(|| region::resolve_colo(store, &self.id, local_colo))
            .await?;
        Ok(colo.clone())
    }

    /// Marks the actor retired if it has no sessions and has been quiet for
    /// at least `max_idle`. Busy actors are skipped, not waited on.
    pub(crate) fn retire_if_idle(&self, now: Instant, max_idle: Duration) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            return false;
        };
        if inner.retired {
            return true;
        }
        let idle_for = now.saturating_duration_since(inner.last_activity);
        if !inner.registry.is_empty() || idle_for < max_idle {
            return false;
        }
        inner.retired = true;
        true
    }
}

impl Inner {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn remove_session(&mut self, id: &PresentationId, session_id: SessionId) -> bool {
        match self.registry.remove(session_id) {
            Some(role) => {
                info!(presentation_id = %id, %session_id, %role, "session removed");
                if role == Role::Voter {
                    self.sync_voter_count(id);
                }
                true
            }
            None => false,
        }
    }

    fn sync_voter_count(&mut self, id: &PresentationId) {
        let voter_count = self.registry.voter_count();
        self.store.set_voter_count(voter_count);
        self.broadcast(id, Audience::Presenters);
    }

    fn broadcast(&mut self, id: &PresentationId, audience: Audience) {
        let message = ServerMessage::PaceChange(self.store.snapshot().clone());
        let delivery = fanout::broadcast(&message, &self.registry.audience(audience));
        if !delivery.lagging.is_empty() {
            self.drop_lagging(id, delivery.lagging);
        }
    }

    /// Drops sessions that cannot keep up and signals their connections to close.
    fn drop_lagging(&mut self, id: &PresentationId, lagging: Vec<SessionId>) {
        for session_id in lagging {
            let Some(session) = self.registry.get(session_id).cloned() else {
                continue;
            };
            warn!(presentation_id = %id, %session_id, "dropping session that cannot keep up");
            self.remove_session(id, session_id);
            session.detach();
        }
    }
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
