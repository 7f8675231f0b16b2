pub mod commands;
pub mod error;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod vault;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{PassVaultError, Result};
pub use state::AppState;
pub use storage::{AppSettings, FileStore, KeyValueStore, MemoryStore};
pub use transfer::{FileExportSink, FileImportSource, ImportOutcome};
pub use vault::{AccessGuard, Entry, EntryRepository, ExpiryEngine, SessionState};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "passvault_app=debug";

/// Install the global tracing subscriber. Logs go to stderr.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Handle to a running vault: shared state plus the components that act on it.
pub struct PassVault {
    pub state: Arc<AppState>,
    pub repository: Arc<EntryRepository>,
    pub guard: AccessGuard,
    pub expiry: ExpiryEngine,
}

impl PassVault {
    /// Call when the app returns to the foreground after a suspension.
    pub async fn on_resume(&self) -> Result<usize> {
        self.expiry.on_resume().await
    }

    pub async fn shutdown(&self) {
        self.expiry.stop().await;
        info!("PassVault shut down");
    }
}

/// Build the application state, open the session gate if no PIN is set,
/// load the entries and catch up on expiry.
///
/// The daily scheduler is not started here; call `expiry.start()` for
/// long-running front-ends.
pub async fn initialize_app(store: Arc<dyn KeyValueStore>, settings: AppSettings) -> Result<PassVault> {
    let recompute_on_start = settings.recompute_on_start;
    let state = Arc::new(AppState::new(store, settings));

    let guard = AccessGuard::new(Arc::clone(&state));
    let session = guard.initialize().await?;

    let repository = Arc::new(EntryRepository::new(Arc::clone(&state)));
    repository.load().await?;

    let expiry = ExpiryEngine::new(Arc::clone(&repository));
    if recompute_on_start {
        expiry.recompute_now().await?;
    }

    info!("PassVault initialized, session {}", session);
    Ok(PassVault {
        state,
        repository,
        guard,
        expiry,
    })
}
