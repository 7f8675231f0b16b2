//! Access Guard: PIN lifecycle and the session authentication gate.
//!
//! The gate has two states. A session starts `Unauthenticated`; it becomes
//! `Authenticated` immediately when no PIN is configured, or after a
//! successful `verify`. There is no transition back: no re-lock, timeout or
//! logout exists.
//!
//! PIN administration (enable/disable/change) is independent of the gate
//! and persists to the store before returning.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{PassVaultError, Result};
use crate::state::AppState;
use crate::storage::{PinKdfSettings, PIN_KEY};

/// Salt size in bytes (128 bits)
const SALT_SIZE: usize = 16;

/// Prefix of PHC strings produced by [`hash_pin`].
const HASHED_PIN_PREFIX: &str = "$argon2";

/// Gate state of the current session.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionState {
    /// PIN required before entries may be viewed
    #[default]
    Unauthenticated,
    /// Gate passed; terminal for the session
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

pub struct AccessGuard {
    state: Arc<AppState>,
}

impl AccessGuard {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Read the PIN record at launch. Without one the gate opens at once.
    pub async fn initialize(&self) -> Result<SessionState> {
        let pin_enabled = self.pin_enabled().await?;
        let mut session = self.state.session.write().await;
        if !pin_enabled {
            *session = SessionState::Authenticated;
            info!("No PIN configured, session authenticated");
        } else {
            info!("PIN configured, waiting for verification");
        }
        Ok(*session)
    }

    pub async fn state(&self) -> SessionState {
        *self.state.session.read().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.is_authenticated().await
    }

    pub async fn pin_enabled(&self) -> Result<bool> {
        Ok(self.load_record().await?.is_some())
    }

    /// Check `candidate` against the stored PIN.
    ///
    /// On a match the session becomes `Authenticated`; on a mismatch the
    /// state is left as it was and `InvalidPin` is returned. There is no
    /// lockout or retry limit.
    pub async fn verify(&self, candidate: &str) -> Result<()> {
        let Some(record) = self.load_record().await? else {
            *self.state.session.write().await = SessionState::Authenticated;
            return Ok(());
        };

        if !verify_pin_record(&record, candidate)? {
            debug!("PIN verification failed");
            return Err(PassVaultError::InvalidPin);
        }

        if !is_hashed(&record) {
            self.upgrade_legacy_record(candidate).await;
        }

        *self.state.session.write().await = SessionState::Authenticated;
        info!("PIN verified, session authenticated");
        Ok(())
    }

    /// Configure a PIN. Fails without writing anything when the
    /// confirmation differs or the PIN is empty.
    pub async fn enable_pin(&self, new_pin: &str, confirm_pin: &str) -> Result<()> {
        check_new_pin(new_pin, confirm_pin)?;
        self.store_pin(new_pin).await?;
        info!("PIN protection enabled");
        Ok(())
    }

    /// Remove the PIN record. No re-authentication is required.
    pub async fn disable_pin(&self) -> Result<()> {
        self.state.store.remove(PIN_KEY).await?;
        info!("PIN protection disabled");
        Ok(())
    }

    pub async fn change_pin(&self, current_pin: &str, new_pin: &str, confirm_pin: &str) -> Result<()> {
        let record = self.load_record().await?;
        let current_ok = match record {
            Some(ref record) => verify_pin_record(record, current_pin)?,
            None => false,
        };
        if !current_ok {
            return Err(PassVaultError::InvalidPin);
        }

        check_new_pin(new_pin, confirm_pin)?;
        self.store_pin(new_pin).await?;
        info!("PIN changed");
        Ok(())
    }

    async fn load_record(&self) -> Result<Option<Zeroizing<String>>> {
        Ok(self
            .state
            .store
            .get(PIN_KEY)
            .await?
            // An empty record means no PIN, as with earlier releases.
            .filter(|record| !record.is_empty())
            .map(Zeroizing::new))
    }

    async fn store_pin(&self, pin: &str) -> Result<()> {
        let kdf = self.state.settings.read().await.pin_kdf;
        let record = Zeroizing::new(hash_pin(pin, &kdf)?);
        self.state.store.set(PIN_KEY, &record).await
    }

    async fn upgrade_legacy_record(&self, pin: &str) {
        match self.store_pin(pin).await {
            Ok(()) => info!("Upgraded plaintext PIN record to Argon2id"),
            Err(e) => warn!("Failed to upgrade plaintext PIN record: {}", e),
        }
    }
}

fn check_new_pin(new_pin: &str, confirm_pin: &str) -> Result<()> {
    if new_pin != confirm_pin {
        return Err(PassVaultError::PinMismatch);
    }
    if new_pin.is_empty() {
        return Err(PassVaultError::EmptyPin);
    }
    Ok(())
}

fn is_hashed(record: &str) -> bool {
    record.starts_with(HASHED_PIN_PREFIX)
}

/// Hash `pin` into an Argon2id PHC string with a fresh random salt.
pub fn hash_pin(pin: &str, kdf: &PinKdfSettings) -> Result<String> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, None)
        .map_err(|e| PassVaultError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut salt_bytes = [0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| PassVaultError::KeyDerivation(format!("Invalid salt: {}", e)))?;

    let hash = argon2
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| PassVaultError::KeyDerivation(format!("PIN hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Exact-match check of `candidate` against a stored record, hashed or legacy plaintext.
pub fn verify_pin_record(record: &str, candidate: &str) -> Result<bool> {
    if !is_hashed(record) {
        return Ok(record.as_bytes().ct_eq(candidate.as_bytes()).into());
    }

    let parsed = PasswordHash::new(record)
        .map_err(|e| PassVaultError::Storage(format!("PIN record is corrupted: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AppSettings, KeyValueStore, MemoryStore};

    const FAST_KDF: PinKdfSettings = PinKdfSettings {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    fn guard() -> (AccessGuard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let settings = AppSettings {
            pin_kdf: FAST_KDF,
            ..AppSettings::default()
        };
        let state = Arc::new(AppState::new(store.clone(), settings));
        (AccessGuard::new(state), store)
    }

    #[tokio::test]
    async fn test_no_pin_authenticates_without_verify() {
        let (guard, _) = guard();
        assert_eq!(guard.state().await, SessionState::Unauthenticated);

        assert_eq!(guard.initialize().await.unwrap(), SessionState::Authenticated);
        assert!(guard.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_stored_legacy_pin_gates_session() {
        let (guard, store) = guard();
        store.set(PIN_KEY, "1234").await.unwrap();

        assert_eq!(guard.initialize().await.unwrap(), SessionState::Unauthenticated);

        let err = guard.verify("0000").await.unwrap_err();
        assert!(matches!(err, PassVaultError::InvalidPin));
        assert_eq!(guard.state().await, SessionState::Unauthenticated);

        guard.verify("1234").await.unwrap();
        assert_eq!(guard.state().await, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_legacy_pin_upgraded_after_verify() {
        let (guard, store) = guard();
        store.set(PIN_KEY, "1234").await.unwrap();

        guard.verify("1234").await.unwrap();

        let record = store.get(PIN_KEY).await.unwrap().unwrap();
        assert!(record.starts_with("$argon2id$"));
        assert!(verify_pin_record(&record, "1234").unwrap());
    }

    #[tokio::test]
    async fn test_enable_pin_mismatch_writes_nothing() {
        let (guard, store) = guard();

        let err = guard.enable_pin("1111", "2222").await.unwrap_err();
        assert!(matches!(err, PassVaultError::PinMismatch));
        assert_eq!(store.get(PIN_KEY).await.unwrap(), None);
        assert!(!guard.pin_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_enable_pin_rejects_empty() {
        let (guard, store) = guard();

        let err = guard.enable_pin("", "").await.unwrap_err();
        assert!(matches!(err, PassVaultError::EmptyPin));
        assert_eq!(store.get(PIN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_enable_pin_stores_hash_not_plaintext() {
        let (guard, store) = guard();
        guard.enable_pin("4321", "4321").await.unwrap();

        let record = store.get(PIN_KEY).await.unwrap().unwrap();
        assert!(!record.contains("4321"));
        assert!(guard.pin_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_new_session_requires_enabled_pin() {
        let store = Arc::new(MemoryStore::new());
        let settings = AppSettings {
            pin_kdf: FAST_KDF,
            ..AppSettings::default()
        };
        let first = AccessGuard::new(Arc::new(AppState::new(store.clone(), settings.clone())));
        first.initialize().await.unwrap();
        first.enable_pin("2468", "2468").await.unwrap();
        // Enabling a PIN does not re-lock the running session.
        assert!(first.is_authenticated().await);

        let second = AccessGuard::new(Arc::new(AppState::new(store, settings)));
        assert_eq!(second.initialize().await.unwrap(), SessionState::Unauthenticated);
        assert!(second.verify("1357").await.is_err());
        second.verify("2468").await.unwrap();
        assert!(second.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_disable_pin_is_unconditional() {
        let (guard, store) = guard();
        guard.enable_pin("1111", "1111").await.unwrap();

        guard.disable_pin().await.unwrap();
        assert_eq!(store.get(PIN_KEY).await.unwrap(), None);
        guard.disable_pin().await.unwrap();
    }

    #[tokio::test]
    async fn test_change_pin() {
        let (guard, _) = guard();
        guard.enable_pin("1111", "1111").await.unwrap();

        assert!(matches!(
            guard.change_pin("9999", "2222", "2222").await,
            Err(PassVaultError::InvalidPin)
        ));
        assert!(matches!(
            guard.change_pin("1111", "2222", "3333").await,
            Err(PassVaultError::PinMismatch)
        ));

        guard.change_pin("1111", "2222", "2222").await.unwrap();
        assert!(guard.verify("1111").await.is_err());
        guard.verify("2222").await.unwrap();
    }

    #[tokio::test]
    async fn test_change_pin_without_pin_configured() {
        let (guard, store) = guard();

        assert!(matches!(
            guard.change_pin("", "1234", "1234").await,
            Err(PassVaultError::InvalidPin)
        ));
        assert_eq!(store.get(PIN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_record_means_no_pin() {
        let (guard, store) = guard();
        store.set(PIN_KEY, "").await.unwrap();

        assert_eq!(guard.initialize().await.unwrap(), SessionState::Authenticated);
    }

    #[test]
    fn test_hash_pin_uses_fresh_salt() {
        let a = hash_pin("1234", &FAST_KDF).unwrap();
        let b = hash_pin("1234", &FAST_KDF).unwrap();
        assert_ne!(a, b);
        assert!(verify_pin_record(&a, "1234").unwrap());
        assert!(verify_pin_record(&b, "1234").unwrap());
        assert!(!verify_pin_record(&a, "12345").unwrap());
    }

    #[test]
    fn test_corrupted_hash_record_never_verifies() {
        for record in ["$argon2id$garbage", "$argon2id$v=19$m=64,t=1,p=1$!!!!"] {
            assert!(!matches!(verify_pin_record(record, "1234"), Ok(true)));
        }
    }

    #[test]
    fn test_session_state_serialization() {
        let json = serde_json::to_string(&SessionState::Authenticated).unwrap();
        assert_eq!(json, "\"Authenticated\"");
    }
}
