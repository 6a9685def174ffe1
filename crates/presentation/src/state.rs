use shared::domain::{PresentationState, Slide};

/// Authoritative state of one presentation.
///
/// Every transition is total: out-of-range navigation clamps and a like with
/// no slides is a no-op. Methods report whether the snapshot changed so the
/// caller can skip redundant broadcasts.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    state: PresentationState,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slides(slides: Vec<Slide>) -> Self {
        Self {
            state: PresentationState {
                slides,
                ..PresentationState::default()
            },
        }
    }

    pub fn snapshot(&self) -> &PresentationState {
        &self.state
    }

    pub fn next_slide(&mut self) -> bool {
        let Some(last) = self.state.slides.len().checked_sub(1) else {
            return false;
        };
        let next = (self.state.current_slide_index + 1).min(last);
        self.move_to(next)
    }

    pub fn previous_slide(&mut self) -> bool {
        let previous = self.state.current_slide_index.saturating_sub(1);
        self.move_to(previous)
    }

    /// Replaces the whole slide list verbatim, like counts included.
    ///
    /// A shorter list pulls the index back onto its last slide; an empty list
    /// leaves the index where it was.
    pub fn replace_slides(&mut self, slides: Vec<Slide>) {
        self.state.slides = slides;
        if let Some(last) = self.state.slides.len().checked_sub(1) {
            self.state.current_slide_index = self.state.current_slide_index.min(last);
        }
    }

    pub fn like_current(&mut self) -> bool {
        let index = self.state.current_slide_index;
        match self.state.slides.get_mut(index) {
            Some(slide) => {
                slide.like_count = slide.like_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn set_voter_count(&mut self, voter_count: usize) -> bool {
        if self.state.voter_count == voter_count {
            return false;
        }
        self.state.voter_count = voter_count;
        true
    }

    fn move_to(&mut self, index: usize) -> bool {
        if self.state.current_slide_index == index {
            return false;
        }
        self.state.current_slide_index = index;
        true
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
