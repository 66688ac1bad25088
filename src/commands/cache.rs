use anyhow::Result;
use tracing::info;

use crate::state::AppState;

/// Remove every cached answer
pub async fn clear(state: &AppState) -> Result<()> {
    let removed = state.cache.clear().await?;
    info!(removed, "cache cleared");
    println!("Cache cleared ({} entries removed).", removed);
    Ok(())
}
