//! Vault session management.
//!
//! A session owns the derived vault key for the lifetime of an unlocked
//! period. All transitions serialize on one mutex: concurrent unlock
//! attempts run the derivation and verifier check exactly once per
//! attempt, and callers racing an in-flight unlock observe the winner's
//! outcome instead of re-deriving. Keys are zeroized when the session
//! locks or is dropped.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::VaultConfig;
use keyhaven_common::{Error, Result};
use keyhaven_crypto::VaultKey;

/// State of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No vault configuration exists yet; setup has not run.
    Uninitialized,
    /// Vault exists but no key is held in memory.
    Locked,
    /// Key is held in memory; secret operations are permitted.
    Unlocked,
}

struct SessionInner {
    state: SessionState,
    key: Option<VaultKey>,
    last_activity: Option<Instant>,
}

impl SessionInner {
    /// Idle expiry is checked lazily, under the same lock as every other
    /// transition.
    fn expire_if_idle(&mut self, idle_timeout: Option<Duration>) {
        if self.state != SessionState::Unlocked {
            return;
        }
        let Some(timeout) = idle_timeout else { return };
        let expired = self
            .last_activity
            .map(|at| at.elapsed() >= timeout)
            .unwrap_or(true);
        if expired {
            info!("session idle timeout reached, locking");
            self.key = None;
            self.last_activity = None;
            self.state = SessionState::Locked;
        }
    }
}

/// Process-wide session state machine.
pub struct SessionManager {
    inner: Mutex<SessionInner>,
    idle_timeout: Option<Duration>,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// `initialized` selects the starting state; `idle_timeout` of `None`
    /// disables idle locking.
    pub fn new(initialized: bool, idle_timeout: Option<Duration>) -> Self {
        let state = if initialized {
            SessionState::Locked
        } else {
            SessionState::Uninitialized
        };
        Self {
            inner: Mutex::new(SessionInner {
                state,
                key: None,
                last_activity: None,
            }),
            idle_timeout,
        }
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        let mut inner = self.inner.lock().await;
        inner.expire_if_idle(self.idle_timeout);
        inner.state
    }

    /// Record that setup completed; the vault is now present but locked.
    pub async fn mark_initialized(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Uninitialized {
            inner.state = SessionState::Locked;
        }
    }

    /// Unlock the session by validating the master password against the
    /// configuration.
    ///
    /// Runs derivation and verification inside the session critical
    /// section. If another caller already unlocked the session, this
    /// returns success without deriving again.
    ///
    /// # Errors
    /// - `Validation` if the vault is uninitialized
    /// - `InvalidCredentials` on password mismatch
    pub async fn unlock_with(&self, config: &VaultConfig, master_password: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.expire_if_idle(self.idle_timeout);

        match inner.state {
            SessionState::Uninitialized => Err(Error::Validation(
                "vault is not initialized; run setup first".to_string(),
            )),
            SessionState::Unlocked => {
                debug!("unlock requested on already-unlocked session");
                inner.last_activity = Some(Instant::now());
                Ok(())
            }
            SessionState::Locked => {
                let key = config.unlock(master_password)?;
                inner.key = Some(key);
                inner.state = SessionState::Unlocked;
                inner.last_activity = Some(Instant::now());
                info!("vault unlocked");
                Ok(())
            }
        }
    }

    /// Lock the session, dropping the key from memory.
    pub async fn lock(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Unlocked {
            inner.key = None;
            inner.last_activity = None;
            inner.state = SessionState::Locked;
            info!("vault locked");
        }
    }

    /// Get the vault key for a secret-touching operation.
    ///
    /// Refreshes the idle deadline on success.
    ///
    /// # Errors
    /// - `LockedVault` outside the Unlocked state
    pub async fn key(&self) -> Result<VaultKey> {
        let mut inner = self.inner.lock().await;
        inner.expire_if_idle(self.idle_timeout);

        if inner.state == SessionState::Unlocked {
            if let Some(key) = inner.key.clone() {
                inner.last_activity = Some(Instant::now());
                return Ok(key);
            }
        }
        Err(Error::LockedVault)
    }

    /// Swap in a key derived from a new master password.
    ///
    /// Used by rotation so an unlocked session stays usable after the
    /// configuration changed underneath it. No-op while locked.
    pub async fn install_key(&self, key: VaultKey) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Unlocked {
            inner.key = Some(key);
            inner.last_activity = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyhaven_crypto::KdfParams;
    use std::sync::Arc;

    fn test_config(password: &[u8]) -> VaultConfig {
        VaultConfig::create(password, KdfParams::moderate()).unwrap().0
    }

    #[tokio::test]
    async fn test_initial_states() {
        assert_eq!(
            SessionManager::new(false, None).state().await,
            SessionState::Uninitialized
        );
        assert_eq!(
            SessionManager::new(true, None).state().await,
            SessionState::Locked
        );
    }

    #[tokio::test]
    async fn test_unlock_and_lock() {
        let config = test_config(b"pw");
        let session = SessionManager::new(true, None);

        assert!(matches!(session.key().await, Err(Error::LockedVault)));

        session.unlock_with(&config, b"pw").await.unwrap();
        assert_eq!(session.state().await, SessionState::Unlocked);
        assert!(session.key().await.is_ok());

        session.lock().await;
        assert_eq!(session.state().await, SessionState::Locked);
        assert!(matches!(session.key().await, Err(Error::LockedVault)));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let config = test_config(b"right");
        let session = SessionManager::new(true, None);

        assert!(matches!(
            session.unlock_with(&config, b"wrong").await,
            Err(Error::InvalidCredentials)
        ));
        assert_eq!(session.state().await, SessionState::Locked);
    }

    #[tokio::test]
    async fn test_unlock_uninitialized_fails() {
        let config = test_config(b"pw");
        let session = SessionManager::new(false, None);

        assert!(matches!(
            session.unlock_with(&config, b"pw").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_unlocks_linearize() {
        let config = Arc::new(test_config(b"pw"));
        let session = Arc::new(SessionManager::new(true, None));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = session.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                session.unlock_with(&config, b"pw").await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(session.state().await, SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_idle_timeout_locks() {
        let config = test_config(b"pw");
        let session = SessionManager::new(true, Some(Duration::from_millis(10)));

        session.unlock_with(&config, b"pw").await.unwrap();
        assert!(session.key().await.is_ok());

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(session.key().await, Err(Error::LockedVault)));
        assert_eq!(session.state().await, SessionState::Locked);
    }
}
