//! User-facing operations. Anything that reads or changes entries checks the
//! session gate first and fails with `Locked` until the PIN is verified.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PassVaultError, Result};
use crate::storage::{save_settings, AppSettings};
use crate::transfer::{self, ExportSink, ImportOutcome, ImportSource};
use crate::vault::{parse_validity_days, Entry, SessionState};
use crate::PassVault;

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub pin_enabled: bool,
    /// Entry counts are only reported once the session is authenticated.
    pub entry_count: Option<usize>,
    pub expired_count: Option<usize>,
    pub last_recompute: Option<DateTime<Utc>>,
}

async fn ensure_unlocked(app: &PassVault) -> Result<()> {
    if app.guard.is_authenticated().await {
        Ok(())
    } else {
        debug!("Rejected command on locked session");
        Err(PassVaultError::Locked)
    }
}

// Entry commands
pub async fn list_entries(app: &PassVault) -> Result<Vec<Entry>> {
    ensure_unlocked(app).await?;
    Ok(app.repository.list().await)
}

pub async fn search_entries(app: &PassVault, query: &str) -> Result<Vec<Entry>> {
    ensure_unlocked(app).await?;
    Ok(app.repository.search(query).await)
}

/// Add an entry from form input; `validity` is the text the user typed.
pub async fn add_entry(
    app: &PassVault,
    description: &str,
    secret: &str,
    validity: &str,
) -> Result<Entry> {
    ensure_unlocked(app).await?;
    app.repository
        .add_raw_validity(description, secret, validity)
        .await
}

/// Returns `false` when no entry has `id`. Without `validity` the stored
/// validity is kept, so expired entries can still be renamed.
pub async fn edit_entry(
    app: &PassVault,
    id: u64,
    description: &str,
    secret: &str,
    validity: Option<&str>,
) -> Result<bool> {
    ensure_unlocked(app).await?;
    let validity_days = validity.map(parse_validity_days).transpose()?;
    app.repository
        .edit(id, description, secret, validity_days)
        .await
}

pub async fn delete_entry(app: &PassVault, id: u64) -> Result<bool> {
    ensure_unlocked(app).await?;
    app.repository.delete(id).await
}

// Transfer commands
pub async fn export_entries(app: &PassVault, sink: &dyn ExportSink) -> Result<PathBuf> {
    ensure_unlocked(app).await?;
    transfer::export_entries(&app.state, sink).await
}

pub async fn import_entries(app: &PassVault, source: &dyn ImportSource) -> Result<ImportOutcome> {
    ensure_unlocked(app).await?;
    transfer::import_entries(&app.state, source).await
}

// Session commands
pub async fn unlock(app: &PassVault, pin: &str) -> Result<SessionState> {
    app.guard.verify(pin).await?;
    Ok(app.guard.state().await)
}

pub async fn session_status(app: &PassVault) -> Result<SessionStatus> {
    let state = app.guard.state().await;
    let pin_enabled = app.guard.pin_enabled().await?;

    let (entry_count, expired_count) = if state == SessionState::Authenticated {
        let entries = app.repository.list().await;
        let expired = entries.iter().filter(|e| e.is_expired()).count();
        (Some(entries.len()), Some(expired))
    } else {
        (None, None)
    };

    Ok(SessionStatus {
        state,
        pin_enabled,
        entry_count,
        expired_count,
        last_recompute: app.expiry.last_run().await,
    })
}

// PIN settings
pub async fn enable_pin(app: &PassVault, new_pin: &str, confirm_pin: &str) -> Result<()> {
    ensure_unlocked(app).await?;
    app.guard.enable_pin(new_pin, confirm_pin).await
}

pub async fn disable_pin(app: &PassVault) -> Result<()> {
    ensure_unlocked(app).await?;
    app.guard.disable_pin().await
}

pub async fn change_pin(
    app: &PassVault,
    current_pin: &str,
    new_pin: &str,
    confirm_pin: &str,
) -> Result<()> {
    ensure_unlocked(app).await?;
    app.guard.change_pin(current_pin, new_pin, confirm_pin).await?;
    info!("PIN updated from settings");
    Ok(())
}

// Settings
pub async fn get_settings(app: &PassVault) -> Result<AppSettings> {
    let settings = app.state.settings.read().await;
    Ok(settings.clone())
}

/// Persist `settings` to `data_dir` and apply them to the running vault.
pub async fn update_settings(app: &PassVault, data_dir: &Path, settings: AppSettings) -> Result<()> {
    ensure_unlocked(app).await?;
    save_settings(data_dir, &settings)?;

    let mut current = app.state.settings.write().await;
    *current = settings;
    debug!("Settings updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::initialize_app;
    use crate::storage::{
        load_settings, KeyValueStore, MemoryStore, PinKdfSettings, ENTRIES_KEY, PIN_KEY,
    };
    use crate::transfer::{FileExportSink, FileImportSource};

    fn settings() -> AppSettings {
        AppSettings {
            pin_kdf: PinKdfSettings {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..AppSettings::default()
        }
    }

    async fn locked_app() -> PassVault {
        let store = Arc::new(MemoryStore::new());
        store.set(PIN_KEY, "1234").await.unwrap();
        initialize_app(store, settings()).await.unwrap()
    }

    #[tokio::test]
    async fn test_locked_session_rejects_entry_commands() {
        let app = locked_app().await;

        assert!(matches!(list_entries(&app).await, Err(PassVaultError::Locked)));
        assert!(matches!(search_entries(&app, "").await, Err(PassVaultError::Locked)));
        assert!(matches!(
            add_entry(&app, "mail", "pw", "30").await,
            Err(PassVaultError::Locked)
        ));
        assert!(matches!(
            edit_entry(&app, 1, "mail", "pw", Some("30")).await,
            Err(PassVaultError::Locked)
        ));
        assert!(matches!(delete_entry(&app, 1).await, Err(PassVaultError::Locked)));
        assert!(matches!(
            import_entries(&app, &FileImportSource::cancelled()).await,
            Err(PassVaultError::Locked)
        ));
        assert!(matches!(disable_pin(&app).await, Err(PassVaultError::Locked)));

        let status = session_status(&app).await.unwrap();
        assert_eq!(status.state, SessionState::Unauthenticated);
        assert!(status.pin_enabled);
        assert_eq!(status.entry_count, None);
    }

    #[tokio::test]
    async fn test_unlock_opens_commands() {
        let app = locked_app().await;

        assert!(matches!(unlock(&app, "0000").await, Err(PassVaultError::InvalidPin)));
        assert_eq!(unlock(&app, "1234").await.unwrap(), SessionState::Authenticated);

        let entry = add_entry(&app, "mail", "pw", "30").await.unwrap();
        assert_eq!(entry.id, 1);
        assert_eq!(list_entries(&app).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_entry_lifecycle_without_pin() {
        let app = initialize_app(Arc::new(MemoryStore::new()), settings())
            .await
            .unwrap();

        let entry = add_entry(&app, "mail", "pw", "30").await.unwrap();
        assert!(edit_entry(&app, entry.id, "email", "pw2", Some("10")).await.unwrap());
        assert!(!edit_entry(&app, 42, "x", "y", None).await.unwrap());
        assert!(matches!(
            edit_entry(&app, entry.id, "email", "pw2", Some("ten")).await,
            Err(PassVaultError::Validation(_))
        ));

        assert_eq!(search_entries(&app, "EMA").await.unwrap().len(), 1);
        assert!(delete_entry(&app, entry.id).await.unwrap());
        assert!(!delete_entry(&app, entry.id).await.unwrap());

        let status = session_status(&app).await.unwrap();
        assert_eq!(status.entry_count, Some(0));
        assert!(status.last_recompute.is_some());
    }

    #[tokio::test]
    async fn test_rename_expired_entry_without_new_validity() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                ENTRIES_KEY,
                r#"[{"id":1,"description":"mail","password":"pw","validity":10,"createdAt":0,"validityWindow":10}]"#,
            )
            .await
            .unwrap();
        let app = initialize_app(store, settings()).await.unwrap();
        let expired = list_entries(&app).await.unwrap().remove(0);
        assert!(expired.is_expired());

        assert!(edit_entry(&app, 1, "renamed", "pw", None).await.unwrap());

        let edited = list_entries(&app).await.unwrap().remove(0);
        assert_eq!(edited.description, "renamed");
        assert_eq!(edited.validity_days, expired.validity_days);
        let current = expired.validity_days.to_string();
        assert!(matches!(
            edit_entry(&app, 1, "renamed", "pw", Some(current.as_str())).await,
            Err(PassVaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_settings_persists_and_applies() {
        let dir = tempfile::tempdir().unwrap();
        let app = initialize_app(Arc::new(MemoryStore::new()), settings())
            .await
            .unwrap();

        let mut updated = get_settings(&app).await.unwrap();
        updated.export_file_name = "backup.json".into();
        update_settings(&app, dir.path(), updated.clone()).await.unwrap();

        assert_eq!(get_settings(&app).await.unwrap(), updated);
        assert_eq!(load_settings(dir.path()).unwrap(), updated);

        let path = export_entries(&app, &FileExportSink::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "backup.json");
    }

    #[tokio::test]
    async fn test_update_settings_requires_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let app = locked_app().await;

        assert!(matches!(
            update_settings(&app, dir.path(), AppSettings::default()).await,
            Err(PassVaultError::Locked)
        ));
        assert!(!dir.path().join("settings.json").exists());
    }

    #[tokio::test]
    async fn test_export_then_import_renumbers_copies() {
        let dir = tempfile::tempdir().unwrap();
        let app = initialize_app(Arc::new(MemoryStore::new()), settings())
            .await
            .unwrap();
        add_entry(&app, "a", "pw", "30").await.unwrap();
        add_entry(&app, "b", "pw", "30").await.unwrap();

        let path = export_entries(&app, &FileExportSink::new(dir.path()))
            .await
            .unwrap();
        let outcome = import_entries(&app, &FileImportSource::new(path))
            .await
            .unwrap();

        assert_eq!(outcome, ImportOutcome::Imported { added: 2, renumbered: 2 });
        let ids: Vec<u64> = list_entries(&app).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_pin_settings_commands() {
        let store = Arc::new(MemoryStore::new());
        let app = initialize_app(store.clone(), settings()).await.unwrap();

        assert!(matches!(
            enable_pin(&app, "1111", "2222").await,
            Err(PassVaultError::PinMismatch)
        ));
        assert_eq!(store.get(PIN_KEY).await.unwrap(), None);

        enable_pin(&app, "1111", "1111").await.unwrap();
        change_pin(&app, "1111", "2222", "2222").await.unwrap();
        assert!(session_status(&app).await.unwrap().pin_enabled);

        disable_pin(&app).await.unwrap();
        assert!(!session_status(&app).await.unwrap().pin_enabled);
    }
}
