//! Session State
//!
//! The logged-in user, echoed to a key/value store so it survives a reload.
//! The store is injected; `MemorySessionStore` mirrors browser local storage
//! and `FileSessionStore` keeps the echo in a JSON file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Storage key for the user echo
pub const SESSION_KEY: &str = "alertship_user";

/// Error type for session persistence
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// Raw storage for the serialized user
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, SessionError>;
    async fn save(&self, value: &str) -> Result<(), SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a raw stored value (possibly malformed)
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(value.into())),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, SessionError> {
        self.slot
            .lock()
            .map_err(|e| SessionError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(self.slot()?.clone())
    }

    async fn save(&self, value: &str) -> Result<(), SessionError> {
        *self.slot()? = Some(value.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.slot()? = None;
        Ok(())
    }
}

/// JSON file store, one file per session key
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store under `dir/alertship_user.json`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{SESSION_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<String>, SessionError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, value: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, value).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Current authentication state, passed to whatever needs to know it
pub struct Session {
    store: Arc<dyn SessionStore>,
    user: Option<User>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("user", &self.user).finish()
    }
}

impl Session {
    /// A logged-out session over `store`, ignoring anything already stored
    pub fn anonymous(store: Arc<dyn SessionStore>) -> Self {
        Self { store, user: None }
    }

    /// Restore the user echoed in `store`
    ///
    /// A stored value that does not parse leaves the session logged out.
    pub async fn restore(store: Arc<dyn SessionStore>) -> Result<Self, SessionError> {
        let user = match store.load().await? {
            Some(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => {
                    debug!(email = %user.email, "Restored session");
                    Some(user)
                }
                Err(e) => {
                    error!(error = %e, "Error parsing stored user data");
                    None
                }
            },
            None => None,
        };

        Ok(Self { store, user })
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Log in and echo the user to the store
    pub async fn log_in(&mut self, user: User) -> Result<(), SessionError> {
        let raw = serde_json::to_string(&user)?;
        self.store.save(&raw).await?;
        info!(email = %user.email, "User logged in");
        self.user = Some(user);
        Ok(())
    }

    /// Log out and clear the stored echo
    pub async fn log_out(&mut self) -> Result<(), SessionError> {
        self.store.clear().await?;
        if let Some(user) = self.user.take() {
            info!(email = %user.email, "User logged out");
        }
        Ok(())
    }
}
