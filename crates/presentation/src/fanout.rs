use std::sync::Arc;

use shared::{domain::SessionId, protocol::ServerMessage};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::{Frame, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Presenters,
    Voters,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Sessions whose queue was full.
    pub lagging: Vec<SessionId>,
    /// Sessions whose connection already went away.
    pub closed: Vec<SessionId>,
}

pub fn encode(message: &ServerMessage) -> Option<Frame> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(error) => {
            warn!(%error, "failed to serialize server message");
            None
        }
    }
}

/// Serializes `message` once and hands the same frame to every recipient.
///
/// Never waits on a recipient. Failed deliveries are reported, not handled:
/// reaping sessions is the registry owner's job.
pub fn broadcast(message: &ServerMessage, recipients: &[SessionHandle]) -> Delivery {
    let mut delivery = Delivery::default();
    let Some(frame) = encode(message) else {
        return delivery;
    };

    for session in recipients {
        match session.try_deliver(Arc::clone(&frame)) {
            Ok(()) => delivery.delivered += 1,
            Err(TrySendError::Full(_)) => delivery.lagging.push(session.id),
            Err(TrySendError::Closed(_)) => delivery.closed.push(session.id),
        }
    }

    debug!(
        recipients = recipients.len(),
        delivered = delivery.delivered,
        lagging = delivery.lagging.len(),
        closed = delivery.closed.len(),
        "broadcast frame"
    );
    delivery
}

/// Sends a reply to a single session.
pub fn send_to(session: &SessionHandle, message: &ServerMessage) -> Delivery {
    broadcast(message, std::slice::from_ref(session))
}

#[cfg(test)]
#[path = "tests/fanout_tests.rs"]
mod tests;
