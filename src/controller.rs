//! Conversation controller: accepts prompts, enforces the send-lock, and
//! hands each reply to an [`Accumulator`] bound to a fresh assistant turn.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::accumulator::{
    Accumulator, ConversationSink, FailureObserver, TracingObserver, TurnOutcome,
};
use crate::config::ChatConfig;
use crate::conversation::{
    lock, new_shared_conversation, SharedConversation, Turn, TurnId, TurnStatus, TurnUpdate,
};
use crate::error::ChatError;
use crate::providers::{build_provider, GenerationProvider, GenerationRequest};
use crate::ui::UiState;

pub struct ChatController {
    conversation: SharedConversation,
    /// `None` when no API key was available; every prompt then gets the
    /// missing-key reply.
    provider: Option<Box<dyn GenerationProvider>>,
    config: ChatConfig,
    pub ui: UiState,
    observer: Arc<dyn FailureObserver>,
    /// When set, every applied turn update is mirrored here for rendering.
    pub updates_tx: Option<mpsc::UnboundedSender<TurnUpdate>>,
}

impl ChatController {
    pub fn new(config: ChatConfig, provider: Box<dyn GenerationProvider>) -> Self {
        Self::assemble(config, Some(provider))
    }

    /// A controller with no provider; prompts are answered with the
    /// missing-key message.
    pub fn unconfigured(config: ChatConfig) -> Self {
        Self::assemble(config, None)
    }

    /// Build the provider the config names. A missing API key is not an
    /// error here: the controller starts unconfigured.
    pub fn from_config(config: ChatConfig) -> Result<Self, ChatError> {
        match build_provider(&config) {
            Ok(provider) => Ok(Self::new(config, provider)),
            Err(ChatError::MissingApiKey(var)) => {
                tracing::warn!(var, "API key not set, replies will report it");
                Ok(Self::unconfigured(config))
            }
            Err(e) => Err(e),
        }
    }

    fn assemble(config: ChatConfig, provider: Option<Box<dyn GenerationProvider>>) -> Self {
        ChatController {
            conversation: new_shared_conversation(),
            provider,
            ui: UiState::new(config.theme, config.voice_enabled),
            config,
            observer: Arc::new(TracingObserver),
            updates_tx: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Shared handle to the turn list.
    pub fn conversation(&self) -> SharedConversation {
        self.conversation.clone()
    }

    /// Copy of every turn in display order.
    pub fn snapshot(&self) -> Vec<Turn> {
        lock(&self.conversation).turns().to_vec()
    }

    /// Whether a reply is still pending.
    pub fn is_loading(&self) -> bool {
        lock(&self.conversation).is_loading()
    }

    pub fn last_assistant_id(&self) -> Option<TurnId> {
        lock(&self.conversation).last_assistant().map(|t| t.id())
    }

    /// Empty the conversation. A reply still streaming stops at its next
    /// fragment.
    pub fn clear(&mut self) {
        lock(&self.conversation).clear();
        self.ui.reset_speech();
    }

    /// Send one prompt and wait for its reply to finish.
    ///
    /// Provider failures end up in the returned outcome and in the turn,
    /// never as `Err`; `Err` is reserved for prompts that were not sent.
    pub async fn submit(&self, prompt: &str) -> Result<TurnOutcome, ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if self.is_loading() {
            return Err(ChatError::Busy);
        }

        let Some(provider) = &self.provider else {
            return Ok(self.reply_missing_key());
        };

        let (turn, request) = {
            let mut conversation = lock(&self.conversation);
            let request = GenerationRequest {
                prompt: prompt.to_string(),
                context: conversation.history(),
                system_prompt: self.config.system_prompt.clone(),
            };
            (conversation.begin_exchange(prompt), request)
        };

        tracing::debug!(
            turn = %turn,
            provider = %provider.kind(),
            model = provider.model(),
            streaming = self.config.streaming,
            context_turns = request.context.len(),
            "dispatching request"
        );

        let sink = ConversationSink {
            conversation: self.conversation.clone(),
            mirror: self.updates_tx.clone(),
        };
        let accumulator = Accumulator::new(turn, sink)
            .with_error_message(self.config.error_message.clone())
            .with_policy(self.config.failure_policy.clone())
            .with_observer(self.observer.clone());

        let outcome = if self.config.streaming {
            accumulator.run_stream(provider.generate_stream(&request)).await
        } else {
            accumulator.run_single(provider.generate(&request)).await
        };
        Ok(outcome)
    }

    fn reply_missing_key(&self) -> TurnOutcome {
        let var = self.config.provider.api_key_env();
        let message = self.config.missing_key_message();
        let id = lock(&self.conversation).push_failed_assistant(&message);
        let error = ChatError::MissingApiKey(var);
        self.observer.on_failure(id, &error);
        if let Some(tx) = &self.updates_tx {
            let _ = tx.send(TurnUpdate { id, content: message, status: TurnStatus::Failed });
        }
        TurnOutcome::Failed(error)
    }
}
