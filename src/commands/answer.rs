use anyhow::Result;
use futures::future::join_all;
use tracing::info;

use crate::detect::Detector;
use crate::relay::types::RelayMessage;
use crate::state::AppState;

use super::{read_page, render_overlay};

/// Detect MCQs in a page and print a suggested answer for each
pub async fn answer(state: &AppState, page: &str, json: bool) -> Result<()> {
    let html = read_page(page).await?;
    let mcqs = Detector::default().detect(&html);
    if mcqs.is_empty() {
        println!("No multiple-choice questions found.");
        return Ok(());
    }
    info!(page, count = mcqs.len(), model = %state.settings.model, "answering detected MCQs");

    // Requests run concurrently; the cache actor keeps their writes ordered.
    let answers = join_all(mcqs.iter().map(|mcq| state.relay.handle(mcq))).await;

    for (mcq, answer) in mcqs.into_iter().zip(answers) {
        if json {
            let message = RelayMessage::McqAnswer { mcq, answer };
            println!("{}", serde_json::to_string(&message)?);
        } else {
            println!("{}\n", render_overlay(&mcq, &answer));
        }
    }
    Ok(())
}
