//! Session storage.
//!
//! - [`SessionStore`] - Loads and saves one [`Conversation`] per [`ConversationKey`]
//!
//! # Built-in Implementations
//!
//! [`InMemoryStore`] is suitable for testing and single-process deployments.
//! [`FileStore`] keeps one JSON file per conversation and survives restarts.

use crate::conversation::Conversation;
use crate::types::ConversationKey;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Trait for persisting conversations between turns.
///
/// The gateway loads a conversation before a turn and saves it afterwards,
/// whether the turn succeeded or not. Loading twice without a save in
/// between must return the same state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the conversation for `key`, or `None` if it was never saved.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read or decoded.
    async fn load(&self, key: &ConversationKey) -> Result<Option<Conversation>>;

    /// Persist the conversation under `key`, replacing any previous state.
    ///
    /// # Errors
    /// Returns an error if the conversation cannot be written.
    async fn save(&self, key: &ConversationKey, conversation: &Conversation) -> Result<()>;

    /// Remove the conversation for `key`. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be modified.
    async fn delete(&self, key: &ConversationKey) -> Result<()>;
}

/// In-memory implementation of [`SessionStore`].
#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<ConversationKey, Conversation>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load(&self, key: &ConversationKey) -> Result<Option<Conversation>> {
        let conversations = self.conversations.read().ok().context("lock poisoned")?;
        Ok(conversations.get(key).cloned())
    }

    async fn save(&self, key: &ConversationKey, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .ok()
            .context("lock poisoned")?
            .insert(key.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<()> {
        self.conversations
            .write()
            .ok()
            .context("lock poisoned")?
            .remove(key);
        Ok(())
    }
}

/// JSON-file implementation of [`SessionStore`].
///
/// Each conversation is stored as `<dir>/<channel>/<conversation>.json`,
/// both components hex-encoded so distinct keys never share a file on any
/// filesystem. Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous version intact.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create sessions directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn channel_dir(&self, key: &ConversationKey) -> PathBuf {
        self.dir.join(format!("c{}", hex::encode(&key.channel_id)))
    }

    fn path_for(&self, key: &ConversationKey) -> PathBuf {
        self.channel_dir(key)
            .join(format!("s{}.json", hex::encode(&key.conversation_id)))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self, key: &ConversationKey) -> Result<Option<Conversation>> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session {}", path.display()));
            }
        };

        let conversation: Conversation = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session file {}", path.display()))?;
        if conversation.key != *key {
            bail!(
                "Session file {} holds {}, expected {key}",
                path.display(),
                conversation.key
            );
        }
        Ok(Some(conversation))
    }

    async fn save(&self, key: &ConversationKey, conversation: &Conversation) -> Result<()> {
        if conversation.key != *key {
            bail!("Refusing to save {} under {key}", conversation.key);
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(conversation)?;

        let channel_dir = self.channel_dir(key);
        tokio::fs::create_dir_all(&channel_dir)
            .await
            .with_context(|| format!("Failed to create {}", channel_dir.display()))?;

        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write session {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move session into place at {}", path.display()))?;

        log::debug!("Saved session {key} ({} messages)", conversation.len());
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete session {}", path.display()))
            }
        }
    }
}
