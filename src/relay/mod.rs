pub mod parse;
pub mod prompts;
pub mod types;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::CacheHandle;
use crate::detect::types::Mcq;
use crate::llm::{ModelBackend, QueryError};
use types::{Answer, RelayMessage};

/// Steps an MCQ moves through on its way to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Detected,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Querying,
    Answered,
    QueryFailed,
    CacheWrite,
    Delivered,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Detected => "DETECTED",
            RelayState::CacheCheck => "CACHE_CHECK",
            RelayState::CacheHit => "CACHE_HIT",
            RelayState::CacheMiss => "CACHE_MISS",
            RelayState::Querying => "QUERYING",
            RelayState::Answered => "ANSWERED",
            RelayState::QueryFailed => "QUERY_FAILED",
            RelayState::CacheWrite => "CACHE_WRITE",
            RelayState::Delivered => "DELIVERED",
        };
        f.write_str(name)
    }
}

/// Ordered record of the states one request walked through.
#[derive(Debug)]
struct Trail<'a> {
    mcq_id: &'a str,
    states: Vec<RelayState>,
}

impl<'a> Trail<'a> {
    fn new(mcq_id: &'a str) -> Self {
        let mut trail = Self {
            mcq_id,
            states: Vec::new(),
        };
        trail.enter(RelayState::Detected);
        trail
    }

    fn enter(&mut self, state: RelayState) {
        debug!(mcq_id = self.mcq_id, state = %state, "relay transition");
        self.states.push(state);
    }
}

/// A message plus the channel its answer should go back to.
pub struct Envelope {
    pub message: RelayMessage,
    pub reply_to: mpsc::UnboundedSender<RelayMessage>,
}

/// Mediates between detection, the response cache and the model backend.
pub struct Relay {
    cache: CacheHandle,
    backend: Arc<dyn ModelBackend>,
    model: String,
}

impl Relay {
    pub fn new(cache: CacheHandle, backend: Arc<dyn ModelBackend>, model: impl Into<String>) -> Self {
        Self {
            cache,
            backend,
            model: model.into(),
        }
    }

    /// Always produces an answer: cached, from the model, or a sentinel.
    pub async fn handle(&self, mcq: &Mcq) -> Answer {
        self.handle_traced(mcq).await.0
    }

    /// Like [`Relay::handle`], also returning the states walked.
    pub async fn handle_traced(&self, mcq: &Mcq) -> (Answer, Vec<RelayState>) {
        let mut trail = Trail::new(&mcq.id);
        let key = mcq.id.as_str();

        trail.enter(RelayState::CacheCheck);
        if let Some(cached) = self.cache.get(key).await {
            trail.enter(RelayState::CacheHit);
            info!(mcq_id = key, choice = ?cached.choice, "cache hit");
            trail.enter(RelayState::Delivered);
            return (cached, trail.states);
        }
        trail.enter(RelayState::CacheMiss);

        trail.enter(RelayState::Querying);
        let prompt = prompts::build_prompt(mcq);
        let answer = match self.backend.query(&prompt, &self.model).await {
            Ok(raw) => {
                trail.enter(RelayState::Answered);
                let answer = parse::parse_model_text(&raw);
                info!(mcq_id = key, choice = ?answer.choice, "model answered");
                answer
            }
            Err(e) => {
                trail.enter(RelayState::QueryFailed);
                warn!(mcq_id = key, "model query failed: {}", e);
                failure_answer(&e)
            }
        };

        // Failures are cached too, under the shorter error TTL.
        trail.enter(RelayState::CacheWrite);
        self.cache.put(key, answer.clone()).await;

        trail.enter(RelayState::Delivered);
        (answer, trail.states)
    }

    /// Handle every envelope on its own task until the inbox closes.
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = inbox.recv().await {
            let relay = self.clone();
            tokio::spawn(async move { relay.deliver(envelope).await });
        }
        debug!("relay inbox closed");
    }

    async fn deliver(&self, envelope: Envelope) {
        match envelope.message {
            RelayMessage::McqDetected { mcq } => {
                let answer = self.handle(&mcq).await;
                let id = mcq.id.clone();
                if envelope
                    .reply_to
                    .send(RelayMessage::McqAnswer { mcq, answer })
                    .is_err()
                {
                    debug!(mcq_id = %id, "originating context gone, answer dropped");
                }
            }
            RelayMessage::McqAnswer { mcq, .. } => {
                warn!(mcq_id = %mcq.id, "relay received an answer message, ignoring");
            }
        }
    }
}

fn failure_answer(err: &QueryError) -> Answer {
    match err {
        QueryError::MissingApiKey => Answer::failure(err.to_string()),
        other => Answer::failure(format!("Error querying model: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::cache::types::TtlPolicy;
    use crate::detect::types::McqSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that replays a canned reply and counts calls.
    struct Stub {
        reply: Result<String, ()>,
        calls: AtomicUsize,
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl Stub {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Default::default(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
                prompts: Default::default(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for Stub {
        async fn query(&self, prompt: &str, _model: &str) -> Result<String, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(()) => Err(QueryError::Malformed("expected value at line 1".into())),
            }
        }
    }

    fn mcq() -> Mcq {
        Mcq {
            id: crate::hash::fingerprint("What is 2+2?|3|4|5"),
            question: "What is 2+2?".into(),
            options: vec!["3".into(), "4".into(), "5".into()],
            source: McqSource::TextHeuristic,
            anchor: None,
        }
    }

    fn relay(backend: Arc<Stub>) -> Relay {
        let cache = CacheHandle::spawn(MemoryStore::new(), TtlPolicy::default());
        Relay::new(cache, backend, "test-model")
    }

    #[tokio::test]
    async fn test_miss_queries_then_hit_skips_backend() {
        let stub = Stub::ok("B");
        let relay = relay(stub.clone());

        let (answer, states) = relay.handle_traced(&mcq()).await;
        assert_eq!(answer.choice.as_deref(), Some("B"));
        assert_eq!(
            states,
            vec![
                RelayState::Detected,
                RelayState::CacheCheck,
                RelayState::CacheMiss,
                RelayState::Querying,
                RelayState::Answered,
                RelayState::CacheWrite,
                RelayState::Delivered,
            ]
        );
        assert_eq!(stub.calls(), 1);
        assert!(stub.prompts.lock().unwrap()[0].contains("B) 4"));

        let (again, states) = relay.handle_traced(&mcq()).await;
        assert_eq!(again, answer);
        assert_eq!(
            states,
            vec![
                RelayState::Detected,
                RelayState::CacheCheck,
                RelayState::CacheHit,
                RelayState::Delivered,
            ]
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let relay = relay(Stub::ok(r#"{"choice":"A","explanation":"because"}"#));
        let answer = relay.handle(&mcq()).await;
        assert_eq!(answer.short.as_deref(), Some("A"));
        assert_eq!(answer.text, "A - because");
    }

    #[tokio::test]
    async fn test_failure_becomes_cached_sentinel() {
        let stub = Stub::failing();
        let relay = relay(stub.clone());

        let (answer, states) = relay.handle_traced(&mcq()).await;
        assert!(answer.failed);
        assert_eq!(answer.choice, None);
        assert!(answer.text.starts_with("Error querying model:"));
        assert!(states.contains(&RelayState::QueryFailed));

        // Within the error TTL the failure is served from cache.
        let again = relay.handle(&mcq()).await;
        assert_eq!(again, answer);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_sentinel_text() {
        let answer = failure_answer(&QueryError::MissingApiKey);
        assert!(answer.failed);
        assert!(answer.text.starts_with("No API key configured"));
    }

    #[tokio::test]
    async fn test_serve_replies_to_originating_channel() {
        let relay = Arc::new(relay(Stub::ok("C")));
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        tokio::spawn(relay.serve(inbox_rx));

        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        inbox_tx
            .send(Envelope {
                message: RelayMessage::McqDetected { mcq: mcq() },
                reply_to: reply_tx,
            })
            .unwrap();

        match reply_rx.recv().await {
            Some(RelayMessage::McqAnswer { mcq: got, answer }) => {
                assert_eq!(got, mcq());
                assert_eq!(answer.choice.as_deref(), Some("C"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_reply_channel_is_not_fatal() {
        let relay = relay(Stub::ok("A"));
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        drop(reply_rx);
        relay
            .deliver(Envelope {
                message: RelayMessage::McqDetected { mcq: mcq() },
                reply_to: reply_tx,
            })
            .await;
    }
}
