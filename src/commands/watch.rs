use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::types::RelayMessage;
use crate::session::{PageEvent, PageSession};
use crate::state::AppState;

use super::render_overlay;

/// Watch an HTML file and answer questions as they appear.
///
/// Every write to the file counts as a structural change. Typing `rescan`
/// on stdin forces a pass, `quit` or Ctrl-C ends the session.
pub async fn watch(state: &AppState, page: PathBuf) -> Result<()> {
    let page = tokio::fs::canonicalize(&page)
        .await
        .with_context(|| format!("Failed to resolve {:?}", page))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let _watcher = page_watcher(&page, events_tx.clone())?;
    spawn_command_reader(events_tx.clone());

    let (relay_tx, relay_rx) = mpsc::unbounded_channel();
    tokio::spawn(state.relay.clone().serve(relay_rx));

    let (answers_tx, mut answers_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(message) = answers_rx.recv().await {
            if let RelayMessage::McqAnswer { mcq, answer } = message {
                println!("{}\n", render_overlay(&mcq, &answer));
            }
        }
    });

    let session = PageSession::new(page, relay_tx, answers_tx);
    let mut session_task = tokio::spawn(session.run(events_rx));

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        res = &mut session_task => {
            res?;
            false
        }
    };
    if interrupted {
        info!("interrupted");
        let _ = events_tx.send(PageEvent::Closed);
        session_task.await?;
    }

    // Answers still in flight belong to a page that is gone.
    printer.abort();
    Ok(())
}

/// Watches the page's directory so editors that replace the file on save
/// are still seen.
fn page_watcher(page: &Path, tx: mpsc::UnboundedSender<PageEvent>) -> Result<RecommendedWatcher> {
    let dir = page.parent().context("page has no parent directory")?;
    let target = page.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            if event.paths.iter().any(|p| p == &target) {
                debug!(kind = ?event.kind, "page changed");
                let _ = tx.send(PageEvent::Changed);
            }
        }
        Err(e) => warn!("Watch error: {:?}", e),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(page = ?page, "watching page");
    Ok(watcher)
}

/// Reads control commands from stdin on a plain thread; a blocked read must
/// not hold up runtime shutdown. EOF stops reading but leaves the session open.
fn spawn_command_reader(tx: mpsc::UnboundedSender<PageEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let event = match parse_command(&line) {
                Some(event) => event,
                None => {
                    if !line.trim().is_empty() {
                        eprintln!("unknown command {:?} (try `rescan` or `quit`)", line.trim());
                    }
                    continue;
                }
            };
            if tx.send(event).is_err() || event == PageEvent::Closed {
                break;
            }
        }
        debug!("command reader finished");
    });
}

fn parse_command(line: &str) -> Option<PageEvent> {
    match line.trim() {
        "rescan" | "r" => Some(PageEvent::Rescan),
        "quit" | "exit" | "q" => Some(PageEvent::Closed),
        _ => None,
    }
}
