//! Session token storage.
//!
//! The backend authenticates every call with a bearer token persisted on the
//! client. No token means "guest": the cart is simply unavailable, which is
//! not an error. A 401 from the backend ends the session and wipes the token.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors reading or writing the persisted session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Filesystem operation failed.
    #[error("session storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored session file is not valid JSON.
    #[error("session storage format error: {0}")]
    Format(#[from] serde_json::Error),

    /// In-memory store lock was poisoned by a panicking writer.
    #[error("session storage lock poisoned")]
    Poisoned,
}

/// A bearer token for the backend.
///
/// `Debug` never prints the token.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// Wrap a raw token. Surrounding whitespace is trimmed; an empty token is `None`.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(SecretString::from(trimmed.to_owned())))
        }
    }
}

impl ExposeSecret<str> for SessionToken {
    fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<SecretString> for SessionToken {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Client-side persisted storage for the session token.
pub trait TokenStore: Send + Sync {
    /// Read the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load(&self) -> Result<Option<SessionToken>, SessionError>;

    /// Persist a token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn save(&self, token: &SessionToken) -> Result<(), SessionError>;

    /// Remove the stored token. Removing an absent token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn clear(&self) -> Result<(), SessionError>;
}

// =============================================================================
// FileTokenStore
// =============================================================================

#[derive(Serialize, Deserialize)]
struct StoredSession {
    token: String,
}

/// Token store backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store for `path`. Nothing is touched until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<SessionToken>, SessionError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredSession = serde_json::from_str(&contents)?;
        Ok(SessionToken::new(&stored.token))
    }

    fn save(&self, token: &SessionToken) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredSession {
            token: token.expose_secret().to_owned(),
        };
        fs::write(&self.path, serde_json::to_vec(&stored)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MemoryTokenStore
// =============================================================================

/// Token store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryTokenStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `token`.
    #[must_use]
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<SessionToken>, SessionError> {
        Ok(self.token.lock().map_err(|_| SessionError::Poisoned)?.clone())
    }

    fn save(&self, token: &SessionToken) -> Result<(), SessionError> {
        *self.token.lock().map_err(|_| SessionError::Poisoned)? = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.token.lock().map_err(|_| SessionError::Poisoned)? = None;
        Ok(())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Handle to the current session's credentials.
///
/// Cheaply cloneable; clones share the same store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
}

impl Session {
    /// Create a session over a token store.
    #[must_use]
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// A session held only in memory, starting with `token` if given.
    #[must_use]
    pub fn in_memory(token: Option<SessionToken>) -> Self {
        match token {
            Some(token) => Self::new(MemoryTokenStore::with_token(token)),
            None => Self::new(MemoryTokenStore::new()),
        }
    }

    /// The current token, or `None` for a guest.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub fn token(&self) -> Result<Option<SessionToken>, SessionError> {
        self.store.load()
    }

    /// Whether a token is present.
    ///
    /// Storage errors count as "no session".
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.store.load(), Ok(Some(_)))
    }

    /// Store a new token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    pub fn begin(&self, token: &SessionToken) -> Result<(), SessionError> {
        self.store.save(token)?;
        info!("Session started");
        Ok(())
    }

    /// Forget the token (logout, or the backend answered 401).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    pub fn end(&self) -> Result<(), SessionError> {
        self.store.clear()?;
        debug!("Session credentials cleared");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.is_active())
            .finish()
    }
}
