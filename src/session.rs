//! Conversation history kept as JSON blobs in a data directory.

use crate::chat_api::ModelType;
use crate::settings::AppSettings;
use crate::turn::FinishedTurn;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SESSIONS_KEY: &str = "qalamx_sessions.json";
const SETTINGS_KEY: &str = "qalamx_settings.json";
const CURRENT_SESSION_KEY: &str = "qalamx_current_session_id";
const TITLE_MAX_CHARS: usize = 40;
const UNTITLED: &str = "New chat";

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Base64 without a data-URL prefix.
    pub data: String,
    pub size: u64,
}

impl Attachment {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            mime_type: guess_mime_type(&name).to_string(),
            name,
            size: bytes.len() as u64,
            data: STANDARD.encode(&bytes),
        })
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default)]
    pub is_thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, attachment: Option<Attachment>) -> Self {
        Self {
            id: generate_id(),
            role: Role::User,
            content: content.into(),
            thinking: None,
            is_thinking: false,
            attachment,
            timestamp: now_millis(),
        }
    }

    /// Freezes a finished turn into a history entry.
    pub fn from_turn(turn: &FinishedTurn) -> Self {
        Self {
            id: generate_id(),
            role: Role::Model,
            content: turn.result.content.clone(),
            thinking: turn.result.thinking.clone(),
            is_thinking: turn.result.is_thinking,
            attachment: None,
            timestamp: now_millis(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub model: ModelType,
    pub last_updated: i64,
}

impl ChatSession {
    pub fn new(model: ModelType) -> Self {
        Self {
            id: generate_id(),
            title: UNTITLED.to_string(),
            messages: Vec::new(),
            model,
            last_updated: now_millis(),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.title == UNTITLED && message.role == Role::User {
            if let Some(title) = derive_title(&message.content) {
                self.title = title;
            }
        }
        self.last_updated = message.timestamp.max(self.last_updated);
        self.messages.push(message);
    }
}

fn derive_title(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|line| !line.is_empty())?;
    let mut title: String = line.chars().take(TITLE_MAX_CHARS).collect();
    if line.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    Some(title)
}

/// Key/value blob store rooted at a directory, one file per key.
#[derive(Clone, Debug)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("qalamx"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All stored sessions, most recent first. Unreadable data yields an empty list.
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.read_json(SESSIONS_KEY).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<ChatSession> {
        self.sessions().into_iter().find(|session| session.id == id)
    }

    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let mut sessions = self.sessions();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.insert(0, session.clone()),
        }
        self.write_json(SESSIONS_KEY, &sessions)?;
        info!(session_id = %session.id, messages = session.messages.len(), "session saved");
        Ok(())
    }

    /// Returns whether a session with `id` existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|session| session.id != id);
        let removed = sessions.len() != before;
        if removed {
            self.write_json(SESSIONS_KEY, &sessions)?;
            if self.current_session_id().as_deref() == Some(id) {
                self.remove(CURRENT_SESSION_KEY)?;
            }
            info!(session_id = %id, "session deleted");
        }
        Ok(removed)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.remove(SESSIONS_KEY)?;
        self.remove(CURRENT_SESSION_KEY)?;
        info!("all sessions cleared");
        Ok(())
    }

    pub fn current_session_id(&self) -> Option<String> {
        let raw = self.read_raw(CURRENT_SESSION_KEY)?;
        let id = raw.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    pub fn set_current_session_id(&self, id: &str) -> Result<()> {
        self.write_raw(CURRENT_SESSION_KEY, id)
    }

    pub fn settings(&self) -> AppSettings {
        self.read_json(SETTINGS_KEY).unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        self.write_json(SETTINGS_KEY, settings)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        let path = self.path(key);
        match fs::read_to_string(&path) {
            Ok(data) => Some(data),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read store entry");
                None
            }
        }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.read_raw(key)?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "ignoring corrupt store entry");
                None
            }
        }
    }

    fn write_raw(&self, key: &str, data: &str) -> Result<()> {
        let path = self.path(key);
        fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(key, bytes = data.len(), "store entry written");
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value).context("Failed to serialize store entry")?;
        self.write_raw(key, &data)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(err).with_context(|| format!("Failed to remove {}", path.display()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Turn;

    #[test]
    fn title_comes_from_first_user_line() {
        let mut session = ChatSession::new(ModelType::Lite);
        session.push(ChatMessage::user("\n  What is Rust?\nmore", None));
        session.push(ChatMessage::user("ignored for title", None));
        assert_eq!(session.title, "What is Rust?");
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn long_titles_are_truncated_on_chars() {
        let long = "ا".repeat(60);
        assert_eq!(
            derive_title(&long),
            Some(format!("{}...", "ا".repeat(TITLE_MAX_CHARS)))
        );
        assert_eq!(derive_title("   "), None);
    }

    #[test]
    fn from_turn_keeps_parse_fields() {
        let mut turn = Turn::new();
        turn.push("<thinking>why</thinking>because");
        let message = ChatMessage::from_turn(&turn.finish());
        assert_eq!(message.role, Role::Model);
        assert_eq!(message.thinking.as_deref(), Some("why"));
        assert_eq!(message.content, "because");
        assert!(!message.is_thinking);
    }

    #[test]
    fn message_json_skips_absent_fields() {
        let mut message = ChatMessage::user("hi", None);
        message.id = "m1".to_string();
        message.timestamp = 7;
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"id":"m1","role":"user","content":"hi","is_thinking":false,"timestamp":7}"#
        );
    }

    #[test]
    fn guess_mime_type_by_extension() {
        assert_eq!(guess_mime_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_mime_type("doc.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn generate_id_is_unique() {
        assert_ne!(generate_id(), generate_id());
    }
}
