//! Turns and the ordered conversation that holds them.
//!
//! ## Invariants
//! - Insertion order is display order.
//! - At most one turn is `Pending`; it is the conversation's in-flight turn.
//! - A `Complete` or `Failed` turn never changes again.
//!
//! Updates for a turn that is not the current in-flight turn are refused,
//! which is how a superseded or cleared stream is silenced.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::providers::ContextTurn;

/// Shared conversation handle: the controller and every accumulator sink
/// hold a clone.
pub type SharedConversation = Arc<Mutex<Conversation>>;

/// Create a new empty SharedConversation.
pub fn new_shared_conversation() -> SharedConversation {
    Arc::new(Mutex::new(Conversation::new()))
}

/// Lock the conversation, recovering the data if a previous holder panicked.
pub fn lock(conversation: &SharedConversation) -> MutexGuard<'_, Conversation> {
    conversation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Identity, role, status
// ---------------------------------------------------------------------------

/// Opaque per-turn identity, stable for the turn's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        TurnId(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines and the terminal UI.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Complete,
    Failed,
}

impl TurnStatus {
    /// `Complete` and `Failed` are final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnStatus::Pending)
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// One conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    status: TurnStatus,
}

impl Turn {
    fn new(role: Role, content: String, status: TurnStatus) -> Self {
        Turn { id: TurnId::new(), role, content, status }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> TurnStatus {
        self.status
    }
}

/// A content/status change for one turn: the `onUpdate(identity, content,
/// status)` message. `content` is always the full text, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnUpdate {
    pub id: TurnId,
    pub content: String,
    pub status: TurnStatus,
}

/// Whether an update reached its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// The turn is gone, finished, or no longer the in-flight request.
    Stale,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    in_flight: Option<TurnId>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// The turn currently awaiting a reply, if any.
    pub fn in_flight(&self) -> Option<TurnId> {
        self.in_flight
    }

    pub fn pending(&self) -> Option<&Turn> {
        self.in_flight.and_then(|id| self.get(id))
    }

    pub fn is_loading(&self) -> bool {
        self.pending().is_some()
    }

    /// The most recent assistant turn, whatever its status.
    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }

    /// Completed turns in order, as context for the next request.
    /// Failed turns carry error text, not model output, and are left out.
    pub fn history(&self) -> Vec<ContextTurn> {
        self.turns
            .iter()
            .filter(|t| t.status == TurnStatus::Complete)
            .map(|t| ContextTurn { role: t.role, content: t.content.clone() })
            .collect()
    }

    /// Record the user's prompt and a pending assistant placeholder; the
    /// placeholder becomes the in-flight turn and its id is returned.
    ///
    /// Last request wins: a turn still pending is failed with its partial
    /// content kept, and any further updates for it are refused.
    pub fn begin_exchange(&mut self, prompt: &str) -> TurnId {
        if let Some(old) = self.in_flight.take() {
            if let Some(turn) = self.turns.iter_mut().find(|t| t.id == old) {
                turn.status = TurnStatus::Failed;
                tracing::debug!(turn = %old, "pending turn superseded by a new request");
            }
        }
        self.turns.push(Turn::new(Role::User, prompt.to_string(), TurnStatus::Complete));
        let placeholder = Turn::new(Role::Assistant, String::new(), TurnStatus::Pending);
        let id = placeholder.id;
        self.turns.push(placeholder);
        self.in_flight = Some(id);
        id
    }

    /// Append an assistant turn that failed before any request was sent.
    pub fn push_failed_assistant(&mut self, message: &str) -> TurnId {
        let turn = Turn::new(Role::Assistant, message.to_string(), TurnStatus::Failed);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Apply an update if it targets the in-flight turn.
    pub fn apply(&mut self, update: &TurnUpdate) -> Delivery {
        if self.in_flight != Some(update.id) {
            return Delivery::Stale;
        }
        let Some(turn) = self.turns.iter_mut().find(|t| t.id == update.id) else {
            self.in_flight = None;
            return Delivery::Stale;
        };
        if turn.status.is_terminal() {
            return Delivery::Stale;
        }
        turn.content.clone_from(&update.content);
        turn.status = update.status;
        if update.status.is_terminal() {
            self.in_flight = None;
        }
        Delivery::Applied
    }

    /// Drop every turn. An accumulator still running finds its turn gone at
    /// its next publish and stops.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.in_flight = None;
    }
}
