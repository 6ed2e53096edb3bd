use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::history::{
    ChatHistory, Conversation, HistoryStore, Message, Role, StoreError, SENTINEL_TITLE,
};

/// Assistant message every new conversation starts with.
pub const GREETING: &str = "Hey! I'm Ramble. How can I help you today?";

const TITLE_MAX_CHARS: usize = 30;

/// Owns the in-memory collection for one session and keeps the store in sync:
/// every operation that changes state saves before returning.
pub struct ConversationManager {
    store: HistoryStore,
    history: ChatHistory,
}

impl ConversationManager {
    pub fn new(store: HistoryStore) -> Self {
        let history = store.load();
        Self { store, history }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn active_id(&self) -> Option<&str> {
        self.history.active_chat.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.history.conversations.get(id)
    }

    /// Repairs the active pointer when it is unset or dangling, creating and
    /// activating a fresh conversation. No-op when already valid.
    pub fn ensure_active_chat(&mut self) -> Result<String, StoreError> {
        if let Some(id) = self.history.active_chat.as_ref() {
            if self.history.conversations.contains_key(id) {
                return Ok(id.clone());
            }
        }
        self.new_chat()
    }

    /// Always creates a new conversation and makes it active, even when a
    /// valid one exists.
    pub fn new_chat(&mut self) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.history.conversations.insert(
            id.clone(),
            Conversation {
                title: SENTINEL_TITLE.to_string(),
                created: Utc::now(),
                messages: vec![Message::assistant(GREETING)],
            },
        );
        self.history.active_chat = Some(id.clone());
        self.store.save(&self.history)?;
        Ok(id)
    }

    /// Removes one conversation. Deleting the active one leaves the pointer
    /// unset until the next `ensure_active_chat`. Unknown ids are ignored.
    pub fn delete_chat(&mut self, id: &str) -> Result<(), StoreError> {
        if self.history.conversations.remove(id).is_none() {
            return Ok(());
        }
        if self.history.active_chat.as_deref() == Some(id) {
            self.history.active_chat = None;
        }
        self.store.save(&self.history)
    }

    /// Drops every conversation and purges the persisted file.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        self.history.conversations.clear();
        self.history.active_chat = None;
        self.store.clear()
    }

    /// Switches the active chat. Unknown ids and re-selecting the current
    /// chat are both no-ops, so no redundant save happens.
    pub fn select_chat(&mut self, id: &str) -> Result<(), StoreError> {
        if self.history.active_chat.as_deref() == Some(id) {
            return Ok(());
        }
        if !self.history.conversations.contains_key(id) {
            return Ok(());
        }
        self.history.active_chat = Some(id.to_string());
        self.store.save(&self.history)
    }

    /// Appends to a conversation and saves. A user message also triggers
    /// title derivation first, so the derived title lands in the same save.
    /// Unknown ids are dropped silently; callers validate via
    /// `ensure_active_chat`.
    pub fn append_message(&mut self, id: &str, message: Message) -> Result<(), StoreError> {
        let is_user = message.role == Role::User;
        let Some(conversation) = self.history.conversations.get_mut(id) else {
            debug!("dropping message for unknown conversation {id}");
            return Ok(());
        };
        conversation.messages.push(message);
        if is_user {
            self.derive_title(id);
        }
        self.store.save(&self.history)
    }

    /// Replaces a sentinel title with one derived from the first user
    /// message, then saves if anything changed.
    pub fn derive_title_if_unset(&mut self, id: &str) -> Result<(), StoreError> {
        if self.derive_title(id) {
            self.store.save(&self.history)?;
        }
        Ok(())
    }

    fn derive_title(&mut self, id: &str) -> bool {
        let Some(conversation) = self.history.conversations.get_mut(id) else {
            return false;
        };
        if conversation.title != SENTINEL_TITLE {
            return false;
        }
        let Some(first_user) = conversation
            .messages
            .iter()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        else {
            return false;
        };
        conversation.title = title_from(&first_user.content);
        true
    }

    /// `(id, title)` pairs, newest first. Equal timestamps fall back to id
    /// order so the listing is stable.
    pub fn list_chats(&self) -> Vec<(String, String)> {
        let mut chats: Vec<_> = self
            .history
            .conversations
            .iter()
            .map(|(id, c)| (id.clone(), c.title.clone(), c.created))
            .collect();
        chats.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        chats.into_iter().map(|(id, title, _)| (id, title)).collect()
    }

    /// Plain-text rendering of one conversation, one `role: content` line
    /// per message, for the export feature.
    pub fn export_transcript(&self, id: &str) -> Option<String> {
        let conversation = self.history.conversations.get(id)?;
        let lines: Vec<String> = conversation
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect();
        Some(lines.join("\n"))
    }
}

/// First line of the content, cut at `TITLE_MAX_CHARS` characters with an
/// ellipsis marker when something was cut.
fn title_from(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or(content).trim();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        cut + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manager_in(dir: &tempfile::TempDir) -> ConversationManager {
        ConversationManager::new(HistoryStore::new(dir.path().join("history.json")))
    }

    #[test]
    fn ensure_active_chat_seeds_one_greeting() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        let id = manager.ensure_active_chat().unwrap();
        let conversation = manager.get(&id).unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::Assistant);
        assert_eq!(conversation.title, SENTINEL_TITLE);
    }

    #[test]
    fn ensure_active_chat_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        let first = manager.ensure_active_chat().unwrap();
        let second = manager.ensure_active_chat().unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.history().conversations.len(), 1);
    }

    #[test]
    fn new_chat_always_creates() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        let first = manager.new_chat().unwrap();
        let second = manager.new_chat().unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.active_id(), Some(second.as_str()));
        assert_eq!(manager.history().conversations.len(), 2);
    }

    #[test]
    fn deleting_active_chat_heals_with_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        let old = manager.ensure_active_chat().unwrap();
        manager.delete_chat(&old).unwrap();
        assert_eq!(manager.active_id(), None);

        let fresh = manager.ensure_active_chat().unwrap();
        assert_ne!(fresh, old);
        assert_eq!(manager.active_id(), Some(fresh.as_str()));
    }

    #[test]
    fn deleting_unknown_id_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager.delete_chat("no-such-id").unwrap();
        assert_eq!(manager.active_id(), Some(id.as_str()));
        assert_eq!(manager.history().conversations.len(), 1);
    }

    #[test]
    fn select_chat_ignores_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager.select_chat("no-such-id").unwrap();
        assert_eq!(manager.active_id(), Some(id.as_str()));
    }

    #[test]
    fn select_chat_switches_between_existing_chats() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        let first = manager.new_chat().unwrap();
        let second = manager.new_chat().unwrap();
        assert_eq!(manager.active_id(), Some(second.as_str()));

        manager.select_chat(&first).unwrap();
        assert_eq!(manager.active_id(), Some(first.as_str()));
    }

    #[test]
    fn title_comes_from_first_user_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager
            .append_message(&id, Message::user("Hello there, how are you?\nSecond line"))
            .unwrap();
        assert_eq!(manager.get(&id).unwrap().title, "Hello there, how are you?");
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager
            .append_message(
                &id,
                Message::user("This first line is definitely longer than thirty characters"),
            )
            .unwrap();
        let title = manager.get(&id).unwrap().title.clone();
        assert_eq!(title, "This first line is definitely …");
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
    }

    #[test]
    fn title_stays_sentinel_without_user_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager.derive_title_if_unset(&id).unwrap();
        assert_eq!(manager.get(&id).unwrap().title, SENTINEL_TITLE);
    }

    #[test]
    fn title_is_derived_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();

        manager.append_message(&id, Message::user("first question")).unwrap();
        manager.append_message(&id, Message::user("second question")).unwrap();
        assert_eq!(manager.get(&id).unwrap().title, "first question");
    }

    #[test]
    fn list_chats_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);

        for (id, day) in [("t1", 1), ("t2", 2), ("t3", 3)] {
            manager.history.conversations.insert(
                id.to_string(),
                Conversation {
                    title: id.to_string(),
                    created: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
                    messages: vec![Message::assistant(GREETING)],
                },
            );
        }

        let ids: Vec<String> = manager.list_chats().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["t3", "t2", "t1"]);
    }

    #[test]
    fn clear_all_empties_collection_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        manager.ensure_active_chat().unwrap();

        manager.clear_all().unwrap();
        assert!(manager.history().conversations.is_empty());
        assert_eq!(manager.active_id(), None);
        assert!(!dir.path().join("history.json").exists());

        // A second session over the same path starts empty.
        let reopened = manager_in(&dir);
        assert!(reopened.history().conversations.is_empty());
    }

    #[test]
    fn state_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut manager = manager_in(&dir);
            let id = manager.ensure_active_chat().unwrap();
            manager.append_message(&id, Message::user("remember me")).unwrap();
            id
        };

        let reopened = manager_in(&dir);
        assert_eq!(reopened.active_id(), Some(id.as_str()));
        let conversation = reopened.get(&id).unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.title, "remember me");
    }

    #[test]
    fn export_lists_role_and_content_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(&dir);
        let id = manager.ensure_active_chat().unwrap();
        manager.append_message(&id, Message::user("2+2?")).unwrap();

        let transcript = manager.export_transcript(&id).unwrap();
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(lines[0], format!("assistant: {GREETING}"));
        assert_eq!(lines[1], "user: 2+2?");
    }
}
