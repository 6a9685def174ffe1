use anyhow::Result;
use async_trait::async_trait;
use shared::domain::PresentationId;

/// Durable home of the per-presentation storage-region value.
#[async_trait]
pub trait RegionStore: Send + Sync {
    async fn load_colo(&self, presentation_id: &PresentationId) -> Result<Option<String>>;

    /// Persists `colo` unless one is already stored; returns the stored value.
    async fn save_colo_if_absent(
        &self,
        presentation_id: &PresentationId,
        colo: &str,
    ) -> Result<String>;
}

/// Resolves the region once: a persisted value wins over `local_colo`.
pub async fn resolve_colo(
    store: &dyn RegionStore,
    presentation_id: &PresentationId,
    local_colo: &str,
) -> Result<String> {
    if let Some(colo) = store.load_colo(presentation_id).await? {
        return Ok(colo);
    }
    store.save_colo_if_absent(presentation_id, local_colo).await
}
