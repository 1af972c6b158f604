//! # Response accumulator
//!
//! Folds a provider reply into one assistant turn.
//!
//! ## Guarantees
//! - Streaming: after fragment k the published content is exactly
//!   fragments 1..=k concatenated, in yield order.
//! - Single-shot: one update carries the final text and `Complete` together.
//! - Provider errors never escape as `Err`; they end as a `Failed` turn plus
//!   a [`FailureObserver`] call.
//! - A run is bound to one [`TurnId`]. Once a publish comes back
//!   [`Delivery::Stale`] the run stops consuming its stream.
//!
//! ## NOT Responsible For
//! - Creating the pending turn (the controller does that)
//! - Send-lock or retries

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};

use crate::conversation::{lock, Delivery, SharedConversation, TurnId, TurnStatus, TurnUpdate};
use crate::error::ChatError;

/// Shown in place of a single-shot reply that failed.
pub const DEFAULT_ERROR_MESSAGE: &str = "I'm having trouble connecting. Check your API key.";

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Receives every content/status change for a turn.
pub trait TurnSink {
    fn publish(&self, update: TurnUpdate) -> Delivery;
}

/// Direct mutation of the shared conversation, identity-checked.
impl TurnSink for SharedConversation {
    fn publish(&self, update: TurnUpdate) -> Delivery {
        lock(self).apply(&update)
    }
}

/// Decoupled publish: updates queue in FIFO order and are applied later
/// with [`crate::conversation::Conversation::apply`]. Stale once the
/// receiver is gone.
impl TurnSink for mpsc::UnboundedSender<TurnUpdate> {
    fn publish(&self, update: TurnUpdate) -> Delivery {
        match self.send(update) {
            Ok(()) => Delivery::Applied,
            Err(_) => Delivery::Stale,
        }
    }
}

/// Applies to the conversation, then mirrors applied updates to a renderer.
#[derive(Clone)]
pub struct ConversationSink {
    pub conversation: SharedConversation,
    pub mirror: Option<mpsc::UnboundedSender<TurnUpdate>>,
}

impl TurnSink for ConversationSink {
    fn publish(&self, update: TurnUpdate) -> Delivery {
        let delivery = self.conversation.publish(update.clone());
        if delivery == Delivery::Applied {
            if let Some(tx) = &self.mirror {
                let _ = tx.send(update);
            }
        }
        delivery
    }
}

/// Diagnostic side channel for failures. The user sees only the turn's
/// content; the error detail goes here.
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, turn: TurnId, error: &ChatError);
}

/// Default observer: one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FailureObserver for TracingObserver {
    fn on_failure(&self, turn: TurnId, error: &ChatError) {
        tracing::error!(turn = %turn, error = %error, "generation failed");
    }
}

/// What a stream failure does to text that was already published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFailurePolicy {
    /// Keep the partial text exactly as published.
    #[default]
    Preserve,
    /// Keep the partial text and append this notice.
    AppendNotice(String),
}

impl StreamFailurePolicy {
    fn render(&self, mut partial: String) -> String {
        if let StreamFailurePolicy::AppendNotice(notice) = self {
            partial.push_str(notice);
        }
        partial
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum TurnOutcome {
    Completed { bytes: usize },
    Failed(ChatError),
    /// The turn was superseded or removed; nothing more was published.
    Superseded,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed(_))
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, TurnOutcome::Superseded)
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

pub struct Accumulator<S> {
    turn: TurnId,
    sink: S,
    error_message: String,
    policy: StreamFailurePolicy,
    observer: Arc<dyn FailureObserver>,
}

impl<S: TurnSink> Accumulator<S> {
    pub fn new(turn: TurnId, sink: S) -> Self {
        Accumulator {
            turn,
            sink,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            policy: StreamFailurePolicy::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Text a failed single-shot turn shows instead of a reply.
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_policy(mut self, policy: StreamFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Wait for one complete reply.
    pub async fn run_single<F>(self, response: F) -> TurnOutcome
    where
        F: Future<Output = Result<String, ChatError>>,
    {
        match response.await {
            Ok(text) => self.finish(text),
            Err(error) => {
                let content = self.error_message.clone();
                self.fail(error, content)
            }
        }
    }

    /// Consume a fragment stream until it ends, fails, or goes stale. The
    /// stream is taken by value and never restarted.
    pub async fn run_stream<St>(self, fragments: St) -> TurnOutcome
    where
        St: Stream<Item = Result<String, ChatError>>,
    {
        tokio::pin!(fragments);
        let mut buffer = String::new();
        let mut received = 0usize;

        while let Some(next) = fragments.next().await {
            match next {
                Ok(fragment) => {
                    received += 1;
                    buffer.push_str(&fragment);
                    if self.publish(buffer.clone(), TurnStatus::Pending) == Delivery::Stale {
                        tracing::debug!(
                            turn = %self.turn,
                            received,
                            "turn no longer in flight, dropping stream"
                        );
                        return TurnOutcome::Superseded;
                    }
                }
                Err(error) => {
                    let error = if received > 0 {
                        ChatError::StreamInterrupted { received, source: Box::new(error) }
                    } else {
                        error
                    };
                    let content = self.policy.render(buffer);
                    return self.fail(error, content);
                }
            }
        }

        self.finish(buffer)
    }

    fn publish(&self, content: String, status: TurnStatus) -> Delivery {
        self.sink.publish(TurnUpdate { id: self.turn, content, status })
    }

    fn finish(&self, content: String) -> TurnOutcome {
        let bytes = content.len();
        match self.publish(content, TurnStatus::Complete) {
            Delivery::Applied => {
                tracing::info!(turn = %self.turn, bytes, "reply complete");
                TurnOutcome::Completed { bytes }
            }
            Delivery::Stale => TurnOutcome::Superseded,
        }
    }

    fn fail(&self, error: ChatError, content: String) -> TurnOutcome {
        self.observer.on_failure(self.turn, &error);
        match self.publish(content, TurnStatus::Failed) {
            Delivery::Applied => TurnOutcome::Failed(error),
            Delivery::Stale => TurnOutcome::Superseded,
        }
    }
}
