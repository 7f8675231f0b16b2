//! Entry Repository: the ordered collection of credentials and its persistence.
//!
//! Every mutation follows the same cycle under `AppState::mutation_lock`:
//! copy the cached collection, apply the change, write the full collection
//! to the store, and only then publish the new collection to the cache. A
//! failed write leaves both the store and the cache as they were.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{PassVaultError, Result};
use crate::state::AppState;
use crate::storage::ENTRIES_KEY;
use crate::vault::entry::{
    parse_validity_days, pin_window, validate_fields, validate_text_fields, Entry,
};

pub struct EntryRepository {
    state: Arc<AppState>,
}

impl EntryRepository {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Load the collection from the store into the cache.
    ///
    /// An absent or malformed document yields an empty collection. Only a
    /// failure of the store itself is reported.
    pub async fn load(&self) -> Result<Vec<Entry>> {
        let _guard = self.state.mutation_lock.lock().await;

        let entries = match self.state.store.get(ENTRIES_KEY).await? {
            Some(raw) => match serde_json::from_str::<Vec<Entry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Stored entries are malformed, starting empty: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        self.state
            .last_issued_id
            .fetch_max(max_id(&entries), Ordering::Relaxed);

        info!("Loaded {} entries", entries.len());
        *self.state.entries.write().await = entries.clone();
        Ok(entries)
    }

    /// Serialize the full collection and overwrite the store key.
    pub async fn save(&self, entries: &[Entry]) -> Result<()> {
        let content = serde_json::to_string(entries)?;
        self.state.store.set(ENTRIES_KEY, &content).await?;
        debug!("Persisted {} entries", entries.len());
        Ok(())
    }

    pub async fn list(&self) -> Vec<Entry> {
        self.state.entries.read().await.clone()
    }

    pub async fn get(&self, id: u64) -> Option<Entry> {
        self.state
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Case-insensitive substring match on the description.
    pub async fn search(&self, query: &str) -> Vec<Entry> {
        let needle = query.to_lowercase();
        self.state
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.description.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub async fn add(&self, description: &str, secret: &str, validity_days: i64) -> Result<Entry> {
        validate_fields(description, secret, validity_days)?;

        let last_issued = &self.state.last_issued_id;
        self.mutate(move |entries| {
            let id = next_id(entries, last_issued.load(Ordering::Relaxed))?;
            let entry = Entry {
                id,
                description: description.to_string(),
                secret: secret.to_string(),
                validity_days,
                created_at: Utc::now().timestamp_millis(),
                validity_window: Some(validity_days),
            };
            entries.push(entry.clone());
            last_issued.fetch_max(id, Ordering::Relaxed);
            debug!("Added entry {}", id);
            Ok((entry, true))
        })
        .await
    }

    /// Add an entry with validity typed by the user, e.g. `"30"`.
    pub async fn add_raw_validity(
        &self,
        description: &str,
        secret: &str,
        validity: &str,
    ) -> Result<Entry> {
        let validity_days = parse_validity_days(validity)?;
        self.add(description, secret, validity_days).await
    }

    /// Replace the editable fields of entry `id`.
    ///
    /// `validity_days`, when given, is the new number of days remaining from
    /// now; `None` keeps the current validity, expired or not. Returns
    /// `false` when no entry has that id; nothing is persisted in that case.
    pub async fn edit(
        &self,
        id: u64,
        description: &str,
        secret: &str,
        validity_days: Option<i64>,
    ) -> Result<bool> {
        match validity_days {
            Some(days) => validate_fields(description, secret, days)?,
            None => validate_text_fields(description, secret)?,
        }

        let now = Utc::now().timestamp_millis();
        self.mutate(move |entries| {
            let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
                debug!("Edit of unknown entry {} ignored", id);
                return Ok((false, false));
            };
            entry.description = description.to_string();
            entry.secret = secret.to_string();
            if let Some(days) = validity_days {
                entry.validity_days = days;
                entry.validity_window = Some(pin_window(days, entry.created_at, now));
            }
            Ok((true, true))
        })
        .await
    }

    /// Remove entry `id`. Returns `false` (and persists nothing) when absent.
    pub async fn delete(&self, id: u64) -> Result<bool> {
        self.mutate(move |entries| {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            let deleted = entries.len() < before;
            if !deleted {
                debug!("Delete of unknown entry {} ignored", id);
            }
            Ok((deleted, deleted))
        })
        .await
    }

    pub async fn replace_all(&self, entries: Vec<Entry>) -> Result<()> {
        self.replace_with(move |_| Ok(entries)).await?;
        info!("Replaced entry collection");
        Ok(())
    }

    /// Replace the whole collection with the result of `merge(current)`.
    ///
    /// Used by import, which must compute the merge against the collection
    /// as it is once the mutation lock is held.
    pub async fn replace_with<F>(&self, merge: F) -> Result<Vec<Entry>>
    where
        F: FnOnce(&[Entry]) -> Result<Vec<Entry>>,
    {
        let last_issued = &self.state.last_issued_id;
        self.mutate(move |entries| {
            *entries = merge(entries)?;
            last_issued.fetch_max(max_id(entries), Ordering::Relaxed);
            Ok((entries.clone(), true))
        })
        .await
    }

    /// Recompute days remaining for every entry at `now_ms` and persist.
    /// Returns the number of entries whose value changed.
    pub async fn recompute_expiry(&self, now_ms: i64) -> Result<usize> {
        self.mutate(move |entries| {
            let changed = entries
                .iter_mut()
                .map(|entry| entry.refresh_validity(now_ms))
                .filter(|changed| *changed)
                .count();
            Ok((changed, true))
        })
        .await
    }

    /// Run `op` on a working copy. `op` returns its outcome and whether the
    /// working copy must be persisted and published.
    async fn mutate<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Entry>) -> Result<(T, bool)>,
    {
        let _guard = self.state.mutation_lock.lock().await;

        let mut working = self.state.entries.read().await.clone();
        let (outcome, persist) = op(&mut working)?;
        if persist {
            self.save(&working).await?;
            *self.state.entries.write().await = working;
        }
        Ok(outcome)
    }
}

fn max_id(entries: &[Entry]) -> u64 {
    entries.iter().map(|e| e.id).max().unwrap_or(0)
}

fn next_id(entries: &[Entry], last_issued: u64) -> Result<u64> {
    max_id(entries)
        .max(last_issued)
        .checked_add(1)
        .ok_or_else(|| PassVaultError::Validation("No entry ids left to assign".into()))
}
