//! Session lifecycle: sign-up, login, logout, expiry and restore.
//!
//! The manager is either unauthenticated (nothing published, no timer) or
//! authenticated (a valid [`SessionRecord`] published and exactly one armed
//! expiration timer). Every transition goes through the same lock so that a
//! login response, a logout and a firing timer can never interleave halfway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{AuthResponse, IdentityProvider};
use crate::storage::LocalStorage;

use super::session::SESSION_STORAGE_KEY;
use super::{AuthError, SessionRecord};

/// Route the client is sent to after logout.
pub const AUTH_ROUTE: &str = "/auth";

/// Routing layer of the front end.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Source of the current instant for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

/// Hands out the bearer token of a session that is still valid.
pub trait TokenSource: Send + Sync {
    fn valid_token(&self) -> Option<String>;
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct ArmedTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn LocalStorage>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    user: watch::Sender<Option<SessionRecord>>,
    /// Bumped by every authentication attempt and every logout. A response is
    /// only applied if the epoch it started under is still current.
    auth_epoch: Mutex<u64>,
    expiration_timer: Mutex<Option<ArmedTimer>>,
    timer_seq: AtomicU64,
}

/// Owns the published session and its expiration timer.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn LocalStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_clock(provider, storage, navigator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn LocalStorage>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                provider,
                storage,
                navigator,
                clock,
                user,
                auth_epoch: Mutex::new(0),
                expiration_timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Create an account and sign in with it.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SessionRecord, AuthError> {
        let epoch = self.inner.begin_attempt();
        let result = self.inner.provider.sign_up(email, password).await;
        self.inner.handle_authentication(epoch, result)
    }

    /// Sign in with an existing account.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, AuthError> {
        let epoch = self.inner.begin_attempt();
        let result = self.inner.provider.sign_in_with_password(email, password).await;
        self.inner.handle_authentication(epoch, result)
    }

    /// Drop the current session, if any. Safe to call repeatedly.
    pub fn logout(&self) {
        self.inner.logout();
    }

    /// Restore a still-valid session from local storage.
    ///
    /// Returns whether a session was restored. An expired or unreadable
    /// entry is left where it is. Outside a tokio runtime nothing can be
    /// restored, since the expiration timer has nowhere to run.
    pub fn auto_login(&self) -> bool {
        match Handle::try_current() {
            Ok(runtime) => self.inner.auto_login(&runtime),
            Err(e) => {
                warn!(error = %e, "Cannot restore session outside a tokio runtime");
                false
            }
        }
    }

    /// Log out once `duration` has elapsed, replacing any pending expiry.
    ///
    /// Does nothing outside a tokio runtime.
    pub fn auto_logout(&self, duration: Duration) {
        match Handle::try_current() {
            Ok(runtime) => self.inner.arm_expiration_timer(&runtime, duration),
            Err(e) => warn!(error = %e, "Cannot arm expiration timer outside a tokio runtime"),
        }
    }

    /// Watch the published session.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionRecord>> {
        self.inner.user.subscribe()
    }

    /// The published session, whether or not its token is still valid.
    pub fn current(&self) -> Option<SessionRecord> {
        self.inner.user.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Token of the published session if it has not expired.
    pub fn token(&self) -> Option<String> {
        let now = self.inner.clock.now();
        self.inner
            .user
            .borrow()
            .as_ref()
            .and_then(|record| record.valid_token_at(now).map(str::to_string))
    }

    pub fn has_pending_expiry(&self) -> bool {
        self.inner.expiration_timer.lock().is_some()
    }
}

impl TokenSource for SessionManager {
    fn valid_token(&self) -> Option<String> {
        self.token()
    }
}

impl Inner {
    fn begin_attempt(&self) -> u64 {
        let mut epoch = self.auth_epoch.lock();
        *epoch += 1;
        *epoch
    }

    fn handle_authentication(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<AuthResponse, AuthError>,
    ) -> Result<SessionRecord, AuthError> {
        let response = result.inspect_err(|e| warn!(error = %e, "Authentication failed"))?;
        let lifetime = response.lifetime().inspect_err(|e| warn!(error = %e, "Rejecting token lifetime"))?;
        let timer_lifetime = lifetime
            .to_std()
            .map_err(|_| AuthError::unknown(format!("token lifetime out of range: {}", lifetime)))?;
        let runtime = Handle::try_current()
            .map_err(|e| AuthError::unknown(format!("no tokio runtime for the expiration timer: {}", e)))?;

        let current = self.auth_epoch.lock();
        if *current != epoch {
            info!("Discarding authentication response superseded by logout or a newer attempt");
            return Err(AuthError::Superseded);
        }

        let record = SessionRecord::from_expires_in(
            response.email,
            response.local_id,
            response.id_token,
            lifetime,
            self.clock.now(),
        )
        .ok_or_else(|| AuthError::unknown(format!("token expiry out of range: expiresIn {}", response.expires_in)))?;

        self.user.send_replace(Some(record.clone()));
        self.arm_expiration_timer(&runtime, timer_lifetime);
        self.persist(&record);
        drop(current);

        info!(expires_at = %record.expires_at(), "Session established");
        debug!(email = record.email(), user_id = record.user_id(), "Authenticated user");
        Ok(record)
    }

    fn persist(&self, record: &SessionRecord) {
        let result = record
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set_item(SESSION_STORAGE_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn auto_login(self: &Arc<Self>, runtime: &Handle) -> bool {
        let raw = match self.storage.get_item(SESSION_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted session");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return false;
            }
        };

        let Some(record) = SessionRecord::from_json(&raw) else {
            return false;
        };

        let _guard = self.auth_epoch.lock();
        let now = self.clock.now();
        if record.valid_token_at(now).is_none() {
            debug!(expired_at = %record.expires_at(), "Persisted session has expired");
            return false;
        }

        let remaining = record.time_until_expiry_at(now);
        self.user.send_replace(Some(record));
        self.arm_expiration_timer(runtime, remaining.to_std().unwrap_or(Duration::ZERO));

        info!(remaining_secs = remaining.num_seconds(), "Session restored");
        true
    }

    fn arm_expiration_timer(self: &Arc<Self>, runtime: &Handle, duration: Duration) {
        let seq = self.timer_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = Arc::downgrade(self);

        // Slot stays locked until the new handle is stored, so a zero-length
        // timer cannot fire before it owns the slot.
        let mut slot = self.expiration_timer.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(seq);
            }
        });

        if let Some(previous) = slot.replace(ArmedTimer { seq, handle }) {
            previous.handle.abort();
            debug!(seq = previous.seq, "Cancelled previous expiration timer");
        }
        debug!(seq, duration_ms = duration.as_millis() as u64, "Expiration timer armed");
    }

    fn expire(&self, seq: u64) {
        {
            let mut epoch = self.auth_epoch.lock();
            {
                let mut slot = self.expiration_timer.lock();
                if !slot.as_ref().is_some_and(|timer| timer.seq == seq) {
                    debug!(seq, "Ignoring stale expiration timer");
                    return;
                }
                // Dropping our own handle detaches it; this task is already finishing.
                slot.take();
            }
            info!("Session expired");
            self.clear_locked(&mut epoch);
        }
        self.navigator.navigate(AUTH_ROUTE);
    }

    fn logout(&self) {
        {
            let mut epoch = self.auth_epoch.lock();
            self.clear_locked(&mut epoch);
        }
        self.navigator.navigate(AUTH_ROUTE);
    }

    fn clear_locked(&self, epoch: &mut u64) {
        *epoch += 1;

        let was_authenticated = self.user.send_replace(None).is_some();

        if let Some(timer) = self.expiration_timer.lock().take() {
            timer.handle.abort();
        }

        if let Err(e) = self.storage.remove_item(SESSION_STORAGE_KEY) {
            warn!(error = %e, "Failed to remove persisted session");
        }

        if was_authenticated {
            info!("Logged out");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.expiration_timer.get_mut().take() {
            timer.handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
