use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Route key naming one independent presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresentationId(pub String);

impl PresentationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Presenter,
    Voter,
}

impl Role {
    /// Path segment used by the connect routes.
    pub fn as_path(self) -> &'static str {
        match self {
            Role::Presenter => "presenter",
            Role::Voter => "voter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    #[serde(rename = "value")]
    pub text: String,
    #[serde(rename = "likes", default)]
    pub like_count: u64,
}

impl Slide {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            like_count: 0,
        }
    }
}

/// Snapshot of one presentation as every participant sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationState {
    #[serde(rename = "currentSlide")]
    pub current_slide_index: usize,
    #[serde(rename = "numberOfVoters")]
    pub voter_count: usize,
    pub slides: Vec<Slide>,
}

impl PresentationState {
    pub fn current_slide(&self) -> Option<&Slide> {
        self.slides.get(self.current_slide_index)
    }
}
