use std::{collections::HashMap, sync::Arc};

use shared::domain::{Role, SessionId};
use tokio::sync::{mpsc, Notify};

use crate::fanout::Audience;

/// Outbound frames are shared between recipients of one broadcast.
pub type Frame = Arc<str>;

/// The registry's side of one connection: its role and its outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub role: Role,
    outbound: mpsc::Sender<Frame>,
    detached: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(role: Role, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id: SessionId::new(),
            role,
            outbound,
            detached: Arc::new(Notify::new()),
        }
    }

    /// Creates a handle together with the receiving end of a bounded queue.
    pub fn channel(role: Role, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(role, tx), rx)
    }

    /// Fires once the presentation has dropped this session on its own.
    pub fn detached_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.detached)
    }

    pub(crate) fn detach(&self) {
        self.detached.notify_one();
    }

    pub(crate) fn try_deliver(&self, frame: Frame) -> Result<(), mpsc::error::TrySendError<Frame>> {
        self.outbound.try_send(frame)
    }
}

/// Presenter and voter sessions of one presentation.
///
/// The two sets are independent: removing from one never touches the other.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    presenters: HashMap<SessionId, SessionHandle>,
    voters: HashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, session: SessionHandle) {
        match session.role {
            Role::Presenter => self.presenters.insert(session.id, session),
            Role::Voter => self.voters.insert(session.id, session),
        };
    }

    /// Removes a session and returns the role it had, `None` if it was already gone.
    pub fn remove(&mut self, session_id: SessionId) -> Option<Role> {
        if self.presenters.remove(&session_id).is_some() {
            return Some(Role::Presenter);
        }
        self.voters.remove(&session_id).map(|_| Role::Voter)
    }

    pub fn get(&self, session_id: SessionId) -> Option<&SessionHandle> {
        self.presenters
            .get(&session_id)
            .or_else(|| self.voters.get(&session_id))
    }

    pub fn presenter_count(&self) -> usize {
        self.presenters.len()
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presenters.is_empty() && self.voters.is_empty()
    }

    /// Copies out the recipients for `audience`.
    pub fn audience(&self, audience: Audience) -> Vec<SessionHandle> {
        let presenters = self.presenters.values();
        let voters = self.voters.values();
        match audience {
            Audience::All => presenters.chain(voters).cloned().collect(),
            Audience::Presenters => presenters.cloned().collect(),
            Audience::Voters => voters.cloned().collect(),
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
