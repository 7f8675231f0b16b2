use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::storage::{AppSettings, KeyValueStore};
use crate::vault::{Entry, SessionState};

/// Application state shared by the repository, expiry engine and access guard.
///
/// Handed out as `Arc<AppState>`; nothing in the crate keeps process-wide
/// mutable state of its own.
pub struct AppState {
    /// Persistent store. Source of truth for entries and the PIN record.
    pub store: Arc<dyn KeyValueStore>,
    pub settings: RwLock<AppSettings>,
    /// In-memory cache of the persisted entry collection, in display order.
    pub entries: RwLock<Vec<Entry>>,
    /// Gate state for the current session
    pub session: RwLock<SessionState>,
    /// Held for the whole read-mutate-persist cycle of every mutation
    /// (user edits, imports, expiry recomputation) so no write is lost.
    pub mutation_lock: Mutex<()>,
    /// Highest id handed out this session, so deleted ids are not reissued.
    pub last_issued_id: AtomicU64,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: AppSettings) -> Self {
        Self {
            store,
            settings: RwLock::new(settings),
            entries: RwLock::new(Vec::new()),
            session: RwLock::new(SessionState::Unauthenticated),
            mutation_lock: Mutex::new(()),
            last_issued_id: AtomicU64::new(0),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        *self.session.read().await == SessionState::Authenticated
    }
}
