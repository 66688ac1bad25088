use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use crate::detect::types::McqId;
use crate::detect::Detector;
use crate::relay::types::RelayMessage;
use crate::relay::Envelope;

/// Quiet period that coalesces bursts of page changes into one pass.
pub const DEBOUNCE: Duration = Duration::from_millis(400);
/// Delay before the first pass of a new session.
pub const INITIAL_DELAY: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The page changed structurally.
    Changed,
    /// Detect now, outside the debounce timer.
    Rescan,
    /// Navigation away; the session ends.
    Closed,
}

/// Detection state for one page: what was last sent and whether a pass is
/// pending. Lives from page load until `Closed`.
pub struct PageSession {
    path: PathBuf,
    detector: Detector,
    last_id: Option<McqId>,
    pending: Option<Instant>,
    last_digest: Option<blake3::Hash>,
    relay: mpsc::UnboundedSender<Envelope>,
    answers: mpsc::UnboundedSender<RelayMessage>,
}

impl PageSession {
    /// `relay` receives detected MCQs; their answers come back on `answers`.
    pub fn new(
        path: PathBuf,
        relay: mpsc::UnboundedSender<Envelope>,
        answers: mpsc::UnboundedSender<RelayMessage>,
    ) -> Self {
        Self {
            path,
            detector: Detector::default(),
            last_id: None,
            pending: None,
            last_digest: None,
            relay,
            answers,
        }
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<PageEvent>) {
        info!(page = ?self.path, "page session started");
        self.pending = Some(Instant::now() + INITIAL_DELAY);

        loop {
            let deadline = self.pending;
            tokio::select! {
                event = events.recv() => match event {
                    Some(PageEvent::Changed) => {
                        self.pending = Some(Instant::now() + DEBOUNCE);
                    }
                    Some(PageEvent::Rescan) => {
                        info!("manual rescan");
                        self.pass(true).await;
                    }
                    Some(PageEvent::Closed) | None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.pending = None;
                    self.pass(false).await;
                }
            }
        }
        info!(page = ?self.path, "page session closed");
    }

    /// One detection pass. Returns how many MCQs were sent to the relay.
    pub async fn pass(&mut self, forced: bool) -> usize {
        let html = match tokio::fs::read_to_string(&self.path).await {
            Ok(html) => html,
            Err(e) => {
                warn!(page = ?self.path, "failed to read page: {}", e);
                return 0;
            }
        };

        let digest = blake3::hash(html.as_bytes());
        if !forced && self.last_digest == Some(digest) {
            debug!("page unchanged, skipping pass");
            return 0;
        }
        self.last_digest = Some(digest);

        let mcqs = self.detector.detect(&html);
        debug!(count = mcqs.len(), "detected MCQs");

        let mut sent = 0;
        for mcq in mcqs {
            if self.last_id.as_deref() == Some(mcq.id.as_str()) {
                continue;
            }
            self.last_id = Some(mcq.id.clone());
            info!(mcq_id = %mcq.id, source = ?mcq.source, options = mcq.options.len(), "sending MCQ");
            let envelope = Envelope {
                message: RelayMessage::McqDetected { mcq },
                reply_to: self.answers.clone(),
            };
            if self.relay.send(envelope).is_err() {
                warn!("relay is gone, dropping detection");
                break;
            }
            sent += 1;
        }
        sent
    }
}
