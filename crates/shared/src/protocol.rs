use serde::{Deserialize, Serialize};

use crate::{
    domain::{PresentationState, Slide},
    error::ProtocolError,
};

/// Control messages sent by presenters and voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    ClientReady,
    Ping,
    NextSlide,
    PreviousSlide,
    UpdateSlides(Vec<Slide>),
    Like,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::ClientReady => "CLIENT_READY",
            ClientMessage::Ping => "PING",
            ClientMessage::NextSlide => "NEXT_SLIDE",
            ClientMessage::PreviousSlide => "PREVIOUS_SLIDE",
            ClientMessage::UpdateSlides(_) => "UPDATE_SLIDES",
            ClientMessage::Like => "LIKE",
        }
    }

    /// Parses one inbound text frame.
    ///
    /// The envelope is decoded first so that an unknown `type` or a payload
    /// that does not fit its command can be told apart from a frame that is
    /// not a message at all. Only the latter is fatal for the connection,
    /// see [`ProtocolError::is_fatal`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;

        match envelope.kind.as_str() {
            "CLIENT_READY" => Ok(ClientMessage::ClientReady),
            "PING" => Ok(ClientMessage::Ping),
            "NEXT_SLIDE" => Ok(ClientMessage::NextSlide),
            "PREVIOUS_SLIDE" => Ok(ClientMessage::PreviousSlide),
            "LIKE" => Ok(ClientMessage::Like),
            "UPDATE_SLIDES" => {
                let payload = envelope.payload.unwrap_or(serde_json::Value::Null);
                serde_json::from_value::<Vec<Slide>>(payload)
                    .map(ClientMessage::UpdateSlides)
                    .map_err(|source| ProtocolError::InvalidPayload {
                        kind: "UPDATE_SLIDES",
                        source,
                    })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

/// Frames pushed from a presentation to its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    InitialState(PresentationState),
    PaceChange(PresentationState),
    Pong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegion {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRegion {
    pub colo: String,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
