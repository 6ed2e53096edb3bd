use thiserror::Error;
use tracing::info;

use crate::history::{Message, StoreError};
use crate::inference::{Inference, InferenceError};
use crate::manager::ConversationManager;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyInput,
    #[error("a reply is already pending")]
    TurnInFlight,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One request/response turn at a time. `AwaitingReply` holds from the moment
/// the user message is durable until the reply lands or the call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

/// Drives a turn against the active conversation: append the user message,
/// call out for a reply, append it, keep the store in sync throughout. The
/// begin/complete split exists so a UI can run the network call as its own
/// task; `send` composes the whole turn for headless callers.
pub struct ChatController<C> {
    manager: ConversationManager,
    client: C,
    model: String,
    state: TurnState,
    /// Conversation the in-flight turn runs against. The reply lands here
    /// even if the user switches chats while waiting.
    pending_chat: Option<String>,
}

impl<C: Inference> ChatController<C> {
    pub fn new(manager: ConversationManager, client: C, model: String) -> Self {
        Self {
            manager,
            client,
            model,
            state: TurnState::Idle,
            pending_chat: None,
        }
    }

    pub fn manager(&self) -> &ConversationManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConversationManager {
        &mut self.manager
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: String) {
        self.model = model;
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.state == TurnState::AwaitingReply
    }

    /// Validates and appends the user message, derives the title on a first
    /// user message, and persists, all before any network traffic. Returns
    /// the full ordered message sequence to send to the model.
    pub fn begin_turn(&mut self, input: &str) -> Result<Vec<Message>, ChatError> {
        if self.state == TurnState::AwaitingReply {
            return Err(ChatError::TurnInFlight);
        }
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let id = self.manager.ensure_active_chat()?;
        self.manager.append_message(&id, Message::user(input))?;
        self.state = TurnState::AwaitingReply;
        self.pending_chat = Some(id.clone());

        Ok(self
            .manager
            .get(&id)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }

    /// Id of the conversation the in-flight turn belongs to.
    pub fn pending_chat(&self) -> Option<&str> {
        self.pending_chat.as_deref()
    }

    /// Appends the completed reply and persists. The reply arrives as one
    /// unit; any typewriter rendering is the presentation layer's business.
    pub fn complete_turn(&mut self, reply: String) -> Result<(), ChatError> {
        self.state = TurnState::Idle;
        let Some(id) = self.pending_chat.take() else {
            return Ok(());
        };
        // append_message drops the reply silently if the chat was deleted
        // while the call was in flight.
        self.manager.append_message(&id, Message::assistant(reply))?;
        Ok(())
    }

    /// A failed turn appends nothing; the user message stays where
    /// `begin_turn` put it, ready for a retry.
    pub fn fail_turn(&mut self) {
        self.state = TurnState::Idle;
        self.pending_chat = None;
    }

    /// Whole turn in one call. One attempt, no retry.
    pub async fn send(&mut self, input: &str) -> Result<String, ChatError> {
        let messages = self.begin_turn(input)?;
        info!("sending {} messages to {}", messages.len(), self.model);
        match self.client.chat(&self.model, &messages).await {
            Ok(reply) => {
                self.complete_turn(reply.clone())?;
                Ok(reply)
            }
            Err(err) => {
                self.fail_turn();
                Err(err.into())
            }
        }
    }

    /// File-attachment text lands verbatim as a system message in the active
    /// conversation.
    pub fn attach(&mut self, content: &str) -> Result<(), ChatError> {
        let id = self.manager.ensure_active_chat()?;
        self.manager.append_message(&id, Message::system(content))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryStore, Role, SENTINEL_TITLE};
    use crate::manager::GREETING;
    use async_trait::async_trait;
    use reqwest::StatusCode;

    enum StubReply {
        Text(&'static str),
        ServerError,
    }

    struct StubModel(StubReply);

    #[async_trait]
    impl Inference for StubModel {
        async fn chat(&self, _model: &str, _messages: &[Message]) -> Result<String, InferenceError> {
            match &self.0 {
                StubReply::Text(text) => Ok((*text).to_string()),
                StubReply::ServerError => Err(InferenceError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "upstream exploded".to_string(),
                }),
            }
        }
    }

    fn controller_in(
        dir: &tempfile::TempDir,
        reply: StubReply,
    ) -> ChatController<StubModel> {
        let manager =
            ConversationManager::new(HistoryStore::new(dir.path().join("history.json")));
        ChatController::new(manager, StubModel(reply), "test-model".to_string())
    }

    #[tokio::test]
    async fn successful_turn_appends_both_messages_and_titles_the_chat() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::Text("4"));

        let reply = controller.send("2+2?").await.unwrap();
        assert_eq!(reply, "4");

        let manager = controller.manager();
        let conversation = manager.history().active().unwrap();
        assert_eq!(conversation.title, "2+2?");
        let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(conversation.messages[0].content, GREETING);
        assert_eq!(conversation.messages[1].content, "2+2?");
        assert_eq!(conversation.messages[2].content, "4");
    }

    #[tokio::test]
    async fn failed_turn_keeps_the_user_message_and_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::ServerError);

        let err = controller.send("anyone home?").await.unwrap_err();
        assert!(matches!(err, ChatError::Inference(_)));
        assert!(!controller.is_awaiting_reply());

        let conversation = controller.manager().history().active().unwrap();
        let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User]);
        // The user message was durable before the call, title included.
        assert_eq!(conversation.title, "anyone home?");
    }

    #[tokio::test]
    async fn empty_input_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::Text("unused"));
        controller.manager_mut().ensure_active_chat().unwrap();

        let err = controller.send("   ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyInput));

        let conversation = controller.manager().history().active().unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.title, SENTINEL_TITLE);
    }

    #[tokio::test]
    async fn second_turn_is_refused_while_one_is_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::Text("ok"));

        controller.begin_turn("first").unwrap();
        let err = controller.begin_turn("second").unwrap_err();
        assert!(matches!(err, ChatError::TurnInFlight));
    }

    #[tokio::test]
    async fn reply_for_a_deleted_chat_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::Text("late"));

        controller.begin_turn("hello").unwrap();
        let id = controller.manager().active_id().unwrap().to_string();
        controller.manager_mut().delete_chat(&id).unwrap();

        controller.complete_turn("late".to_string()).unwrap();
        assert!(controller.manager().get(&id).is_none());
        assert!(!controller.is_awaiting_reply());
    }

    #[tokio::test]
    async fn attachment_becomes_a_verbatim_system_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_in(&dir, StubReply::Text("ok"));

        controller.attach("line one\nline two").unwrap();
        let conversation = controller.manager().history().active().unwrap();
        let last = conversation.messages.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert_eq!(last.content, "line one\nline two");
    }
}
