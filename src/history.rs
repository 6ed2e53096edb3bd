use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

/// Placeholder title until one is derived from the first user message.
pub const SENTINEL_TITLE: &str = "New Chat";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write chat history to {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to remove chat history at {path}: {source}")]
    Remove {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to serialize chat history: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One chat thread. The conversation id is the key in `ChatHistory::conversations`,
/// not a field here, matching the persisted layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub title: String,
    pub created: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// Every conversation plus the pointer to the one currently receiving input.
/// `active_chat`, when set, must name a key in `conversations`; the manager
/// repairs the pointer whenever that stops holding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    pub conversations: HashMap<String, Conversation>,
    pub active_chat: Option<String>,
}

impl ChatHistory {
    pub fn active(&self) -> Option<&Conversation> {
        self.active_chat
            .as_ref()
            .and_then(|id| self.conversations.get(id))
    }
}

/// On-disk layout. Written whole on every save.
#[derive(Deserialize)]
struct HistoryFile {
    conversations: HashMap<String, Conversation>,
    active_chat: Option<String>,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    conversations: &'a HashMap<String, Conversation>,
    active_chat: &'a Option<String>,
    saved_at: DateTime<Utc>,
}

/// File-backed store for the whole collection. Single writer per file; the
/// process that owns the session owns the file.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Reads prior state. Anything short of a clean parse falls back to an
    /// empty history; a fresh start is always a valid session.
    pub fn load(&self) -> ChatHistory {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return ChatHistory::default(),
            Err(err) => {
                warn!("could not read chat history at {}: {err}", self.path.display());
                return ChatHistory::default();
            }
        };

        match serde_json::from_str::<HistoryFile>(&raw) {
            Ok(file) => ChatHistory {
                conversations: file.conversations,
                active_chat: file.active_chat,
            },
            Err(err) => {
                warn!(
                    "chat history at {} is unreadable, starting fresh: {err}",
                    self.path.display()
                );
                ChatHistory::default()
            }
        }
    }

    /// Replaces the persisted file in full. Write failures propagate: losing
    /// chat history silently is worse than showing an error.
    pub fn save(&self, history: &ChatHistory) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let file = HistoryFileRef {
            conversations: &history.conversations,
            active_chat: &history.active_chat,
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, contents).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Removes the persisted file entirely, as opposed to saving an empty
    /// collection.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"))
    }

    fn sample_history() -> ChatHistory {
        let mut history = ChatHistory::default();
        history.conversations.insert(
            "abc".to_string(),
            Conversation {
                title: "Greetings".to_string(),
                created: Utc::now(),
                messages: vec![Message::assistant("hello"), Message::user("hi there")],
            },
        );
        history.active_chat = Some("abc".to_string());
        history
    }

    #[test]
    fn load_without_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = store_in(&dir).load();
        assert!(history.conversations.is_empty());
        assert!(history.active_chat.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let history = sample_history();

        store.save(&history).unwrap();
        assert_eq!(store.load(), history);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested/deeper/history.json"));

        store.save(&sample_history()).unwrap();
        assert_eq!(store.load().conversations.len(), 1);
    }

    #[test]
    fn unparsable_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();

        let history = HistoryStore::new(path).load();
        assert!(history.conversations.is_empty());
        assert!(history.active_chat.is_none());
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_history()).unwrap();

        store.clear().unwrap();
        assert!(!dir.path().join("history.json").exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::system("ctx")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"ctx"}"#);
    }
}
