use std::sync::Arc;

use presentation::PresentationDirectory;
use storage::Storage;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) directory: Arc<PresentationDirectory>,
    pub(crate) storage: Storage,
    pub(crate) region_code: String,
    pub(crate) max_frame_bytes: usize,
}
