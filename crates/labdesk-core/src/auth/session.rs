use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Storage key holding the opaque bearer token
pub const TOKEN_KEY: &str = "authToken";

/// Storage key holding the expiry instant as base-10 epoch milliseconds
pub const EXPIRATION_KEY: &str = "tokenExpiration";

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.json";

/// Client-side session lifetime in hours.
/// Fixed at login and never extended; the server may reject the token sooner.
const SESSION_TTL_HOURS: i64 = 24;

/// A source of the current wall-clock instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// String-keyed persisted storage backing a [`SessionStore`].
///
/// Writers receive every entry of a change in one call so a backend can
/// apply them together.
pub trait SessionStorage: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set_entries(&mut self, entries: &[(&str, &str)]) -> Result<()>;
    fn remove_entries(&mut self, keys: &[&str]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_entries(&mut self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_entries(&mut self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }
}

/// Session entries kept as one JSON object on disk.
///
/// The file is re-read on every lookup so a logout from another process is
/// observed, and rewritten through a temporary file so a reader never sees
/// half of an update.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at `<cache_dir>/session.json`
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self::new(cache_dir.into().join(SESSION_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_entries(&mut self, entries: &[(&str, &str)]) -> Result<()> {
        let mut all = self.read_all().unwrap_or_default();
        for (key, value) in entries {
            all.insert((*key).to_string(), (*value).to_string());
        }
        self.write_all(&all)
    }

    fn remove_entries(&mut self, keys: &[&str]) -> Result<()> {
        let mut all = self.read_all().unwrap_or_default();
        for key in keys {
            all.remove(*key);
        }
        self.write_all(&all)
    }
}

/// The (token, expiry) pair as seen by a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// Single source of truth for whether the caller holds a usable token.
///
/// Both fields live behind one lock, so the store can be shared through an
/// `Arc` between tasks on a multi-threaded runtime without a reader ever
/// observing a token without its expiry (or the reverse).
pub struct SessionStore {
    storage: Mutex<Box<dyn SessionStorage>>,
    clock: Box<dyn Clock>,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage + 'static, clock: impl Clock + 'static) -> Self {
        Self {
            storage: Mutex::new(Box::new(storage)),
            clock: Box::new(clock),
        }
    }

    /// Volatile store using the system clock
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(), SystemClock)
    }

    /// Store persisted to `<cache_dir>/session.json` using the system clock
    pub fn persistent(cache_dir: impl Into<PathBuf>) -> Self {
        Self::new(FileStorage::in_dir(cache_dir), SystemClock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store `token` with an expiry of `issued_at + 24h`.
    pub fn save_session(&self, token: &str, issued_at: DateTime<Utc>) {
        let expires_at = issued_at + Duration::hours(SESSION_TTL_HOURS);
        let expiration = expires_at.timestamp_millis().to_string();

        let mut storage = self.lock();
        let result = storage.set_entries(&[(TOKEN_KEY, token), (EXPIRATION_KEY, &expiration)]);
        match result {
            Ok(()) => info!(expires_at = %expires_at, "Session saved"),
            Err(e) => {
                warn!(error = %e, "Failed to persist session");
                // Never leave one half of the pair behind
                if let Err(e) = storage.remove_entries(&[TOKEN_KEY, EXPIRATION_KEY]) {
                    warn!(error = %e, "Failed to roll back partial session");
                }
            }
        }
    }

    /// The stored token, unless the session is absent or expired.
    /// An expired session is cleared as a side effect.
    pub fn current_token(&self) -> Option<String> {
        self.session().map(|s| s.token)
    }

    /// Same expiry side effect as [`current_token`](Self::current_token).
    pub fn is_logged_in(&self) -> bool {
        self.current_token().is_some()
    }

    /// The full session, after the expiry check.
    pub fn session(&self) -> Option<Session> {
        let now = self.clock.now();
        let mut storage = self.lock();
        match Self::read_valid(storage.as_ref(), now) {
            Ok(Some(session)) => Some(session),
            Ok(None) => None,
            Err(reason) => {
                info!(reason, "Discarding session");
                Self::clear_locked(storage.as_mut());
                None
            }
        }
    }

    /// Remove both fields. Calling this without a session is a no-op.
    pub fn clear_session(&self) {
        let mut storage = self.lock();
        Self::clear_locked(storage.as_mut());
    }

    /// `Ok(None)` when there is no session at all, `Err` when there is stale
    /// or inconsistent state that must be cleared.
    fn read_valid(
        storage: &dyn SessionStorage,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<Session>, &'static str> {
        let expiration = match storage.get(EXPIRATION_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to read session expiry");
                return Ok(None);
            }
        };
        let token = match storage.get(TOKEN_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                return Ok(None);
            }
        };

        let (token, expiration) = match (token, expiration) {
            (None, None) => return Ok(None),
            (Some(token), Some(expiration)) => (token, expiration),
            _ => return Err("incomplete"),
        };

        let expires_ms: i64 = expiration.trim().parse().map_err(|_| "malformed expiry")?;
        let expires_at = Utc
            .timestamp_millis_opt(expires_ms)
            .single()
            .ok_or("malformed expiry")?;

        if now > expires_at {
            return Err("expired");
        }

        debug!("Session valid");
        Ok(Some(Session { token, expires_at }))
    }

    fn clear_locked(storage: &mut dyn SessionStorage) {
        if let Err(e) = storage.remove_entries(&[TOKEN_KEY, EXPIRATION_KEY]) {
            warn!(error = %e, "Failed to clear session");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn SessionStorage>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
