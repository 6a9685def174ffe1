use shared::{
    domain::Role,
    protocol::{ClientMessage, ServerMessage},
};

use crate::{fanout::Audience, state::StateStore};

/// What the actor has to do after a command was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Reply(ServerMessage),
    Broadcast(Audience),
}

/// Applies one inbound command from a session with `role`.
pub fn apply(store: &mut StateStore, role: Role, message: ClientMessage) -> Effect {
    match message {
        ClientMessage::ClientReady => {
            Effect::Reply(ServerMessage::InitialState(store.snapshot().clone()))
        }
        ClientMessage::Ping => Effect::Reply(ServerMessage::Pong),
        ClientMessage::NextSlide => broadcast_if(store.next_slide()),
        ClientMessage::PreviousSlide => broadcast_if(store.previous_slide()),
        ClientMessage::UpdateSlides(slides) => match role {
            Role::Presenter => {
                store.replace_slides(slides);
                Effect::Broadcast(Audience::All)
            }
            Role::Voter => Effect::None,
        },
        ClientMessage::Like => broadcast_if(store.like_current()),
    }
}

fn broadcast_if(changed: bool) -> Effect {
    if changed {
        Effect::Broadcast(Audience::All)
    } else {
        Effect::None
    }
}

#[cfg(test)]
#[path = "tests/command_tests.rs"]
mod tests;
