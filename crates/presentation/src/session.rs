//! One participant's connection as seen by its presentation.
//!
//! A session is connecting until [`PresentationDirectory::open_session`]
//! admits it, open while frames flow, and closed after [`Session::close`].
//! Closing removes it from the registry exactly once. A session the
//! presentation drops on its own (because it fell behind) is closed too:
//! its detached signal fires and its next frame is refused.
//!
//! [`PresentationDirectory::open_session`]: crate::directory::PresentationDirectory::open_session

use std::sync::Arc;

use shared::{
    domain::{PresentationId, Role, SessionId},
    error::ProtocolError,
    protocol::ClientMessage,
};
use tokio::sync::Notify;
use tracing::debug;

use crate::actor::PresentationActor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Open,
    Closed,
}

pub struct Session {
    actor: Arc<PresentationActor>,
    id: SessionId,
    role: Role,
    phase: SessionPhase,
    detached: Arc<Notify>,
}

impl Session {
    pub(crate) fn open(
        actor: Arc<PresentationActor>,
        id: SessionId,
        role: Role,
        detached: Arc<Notify>,
    ) -> Self {
        Self {
            actor,
            id,
            role,
            phase: SessionPhase::Open,
            detached,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn presentation_id(&self) -> &PresentationId {
        self.actor.id()
    }

    pub fn actor(&self) -> &Arc<PresentationActor> {
        &self.actor
    }

    /// Notified when the presentation drops this session because it fell behind.
    pub fn detached_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.detached)
    }

    /// Feeds one inbound text frame to the presentation.
    ///
    /// Unknown or ill-fitting commands are dropped here; the error is only
    /// returned when the connection has to be closed.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        if self.phase == SessionPhase::Closed {
            return Ok(());
        }
        match ClientMessage::parse(text) {
            Ok(message) => {
                if self.actor.handle(self.id, message).await {
                    Ok(())
                } else {
                    self.phase = SessionPhase::Closed;
                    Err(ProtocolError::Detached)
                }
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                debug!(
                    presentation_id = %self.actor.id(),
                    session_id = %self.id,
                    %error,
                    "ignoring command"
                );
                Ok(())
            }
        }
    }

    pub fn handle_binary(&mut self) -> Result<(), ProtocolError> {
        Err(ProtocolError::BinaryFrame)
    }

    pub async fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Closed;
        self.actor.remove(self.id).await;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
