//! # Sessions
//!
//! Thread-safe, in-memory session storage keyed by a random session id.
//!
//! A [`Session`] is a cheap handle: clones share the same map, so values a
//! controller writes are visible to the server when it finishes the
//! request, and to the next request carrying the same cookie.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles session storage and retrieval
//! - **O**: Values are `serde_json::Value`, so any serializable type fits
//! - **D**: Controllers see `Session`, never the store behind it

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Session key holding the last successfully served GET URL
pub const PREVIOUS_URL_KEY: &str = "_previous_url";
/// Session key holding the last submitted form input
pub const OLD_INPUT_KEY: &str = "_old_input";
/// Session key holding one-shot flash messages
pub const FLASH_KEY: &str = "_flash";

/// Number of random bytes in a session id
const SESSION_ID_BYTES: usize = 16;

type SessionData = HashMap<String, Value>;

/// One client's session
#[derive(Clone, Default)]
pub struct Session {
    data: Arc<RwLock<SessionData>>,
}

impl Session {
    /// Create a new empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a cloned value by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Get a value deserialized into `T`
    ///
    /// Returns `None` if the key is missing or the value doesn't fit `T`.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Store a value, overwriting any existing one
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write().insert(key.into(), value.into());
    }

    /// Check if a key exists
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Remove a value by key
    pub fn unset(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Drop every value
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Store a value meant to be read once by the next request
    pub fn flash(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut data = self.write();
        let flashes = data
            .entry(FLASH_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !flashes.is_object() {
            *flashes = Value::Object(Map::new());
        }
        if let Value::Object(map) = flashes {
            map.insert(key.into(), value.into());
        }
    }

    /// Read and remove a value, flashed or plain
    #[must_use]
    pub fn take(&self, key: &str) -> Option<Value> {
        let mut data = self.write();
        let flashed = data
            .get_mut(FLASH_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|map| map.remove(key));
        flashed.or_else(|| data.remove(key))
    }

    /// Read and remove every flashed value
    #[must_use]
    pub fn take_flashes(&self) -> Map<String, Value> {
        match self.write().remove(FLASH_KEY) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// URL of the last page served to this client
    #[must_use]
    pub fn previous_url(&self) -> Option<String> {
        self.get_as(PREVIOUS_URL_KEY)
    }

    /// Remember `url` as the page to go back to
    pub fn set_previous_url(&self, url: impl Into<String>) {
        self.set(PREVIOUS_URL_KEY, url.into());
    }

    /// Keep submitted input so a redisplayed form can refill it
    pub fn set_old_input(&self, input: &HashMap<String, String>) {
        let map: serde_json::Map<String, Value> = input
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.set(OLD_INPUT_KEY, Value::Object(map));
    }

    /// A field of the previously submitted input
    #[must_use]
    pub fn old_input(&self, field: &str) -> Option<String> {
        self.read()
            .get(OLD_INPUT_KEY)
            .and_then(|old| old.get(field))
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// Get the number of stored items
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if session is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("keys", &self.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Idle lifetime used by [`SessionStore::new`]
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

struct StoredSession {
    session: Session,
    last_seen: Instant,
}

/// All live sessions, keyed by id
///
/// A session only enters the store once [`SessionStore::persist`] sees it
/// holding data, so cookieless one-off requests leave nothing behind.
/// Sessions idle for longer than the store's timeout are swept on the next
/// lookup.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    /// Create an empty store with the default idle timeout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store dropping sessions unused for `idle_timeout`
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// How long an unused session is kept
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredSession>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find the session for `id`, or start a new one
    ///
    /// Returns `(id, session, created)`. Unknown, expired or missing ids get
    /// a fresh id, so clients can't pick their own. A new session is not
    /// stored until it is persisted.
    #[must_use]
    pub fn load_or_create(&self, id: Option<&str>) -> (String, Session, bool) {
        let now = Instant::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, stored| now.duration_since(stored.last_seen) <= self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "Dropped idle sessions");
        }

        if let Some(stored) = id.and_then(|id| sessions.get_mut(id)) {
            stored.last_seen = now;
            return (id.unwrap_or_default().to_string(), stored.session.clone(), false);
        }

        (new_session_id(), Session::new(), true)
    }

    /// Keep `session` under `id` if it holds any data
    ///
    /// Returns whether the session is now stored.
    pub fn persist(&self, id: &str, session: &Session) -> bool {
        let mut sessions = self.write();
        if let Some(stored) = sessions.get_mut(id) {
            stored.last_seen = Instant::now();
            return true;
        }
        if session.is_empty() {
            return false;
        }
        sessions.insert(
            id.to_string(),
            StoredSession {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        true
    }

    /// Forget a session
    pub fn destroy(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Random hex session id
fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
