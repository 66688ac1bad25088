use anyhow::Result;
use tracing::info;

use crate::detect::Detector;

/// Detect MCQs in a page and print them as JSON lines
pub async fn scan(page: &str) -> Result<()> {
    let html = super::read_page(page).await?;
    let mcqs = Detector::default().detect(&html);
    info!(page, count = mcqs.len(), "scan complete");

    for mcq in &mcqs {
        println!("{}", serde_json::to_string(mcq)?);
    }
    Ok(())
}
