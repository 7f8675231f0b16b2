use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::document::{export_document, merge_with_report, parse_document};
use crate::error::{PassVaultError, Result};
use crate::state::AppState;
use crate::vault::EntryRepository;

/// Media type of exported documents.
pub const EXPORT_MIME: &str = "application/json";

/// Destination for an exported document (share sheet, download folder, ...).
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Hand over `document` under `file_name`; returns where it ended up.
    async fn deliver(&self, file_name: &str, mime: &str, document: &str) -> Result<PathBuf>;
}

/// Origin of an import document, typically a file picker.
#[async_trait]
pub trait ImportSource: Send + Sync {
    /// `Ok(None)` means the user cancelled the pick.
    async fn pick(&self) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Cancelled,
    Imported { added: usize, renumbered: usize },
}

/// Writes exported documents into a directory.
#[derive(Debug, Clone)]
pub struct FileExportSink {
    dir: PathBuf,
}

impl FileExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ExportSink for FileExportSink {
    async fn deliver(&self, file_name: &str, mime: &str, document: &str) -> Result<PathBuf> {
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(PassVaultError::Validation(format!(
                "Export file name must not contain a path: {:?}",
                file_name
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);

        // Write atomically (write to temp file, then rename)
        let temp_path = self.dir.join(format!(".{}.tmp", file_name));
        tokio::fs::write(&temp_path, document).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        // The document holds every secret in plaintext
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&path, perms).await?;
        }

        debug!("Delivered {} document to {:?}", mime, path);
        Ok(path)
    }
}

/// Reads an import document from a chosen path. No path means the pick
/// was cancelled.
#[derive(Debug, Clone, Default)]
pub struct FileImportSource {
    path: Option<PathBuf>,
}

impl FileImportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImportSource for FileImportSource {
    async fn pick(&self) -> Result<Option<String>> {
        match &self.path {
            Some(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            None => Ok(None),
        }
    }
}

/// Export the whole collection through `sink`.
pub async fn export_entries(state: &Arc<AppState>, sink: &dyn ExportSink) -> Result<PathBuf> {
    let (file_name, pretty) = {
        let settings = state.settings.read().await;
        (settings.export_file_name.clone(), settings.pretty_export)
    };

    let entries = state.entries.read().await.clone();
    let document = export_document(&entries, pretty)?;
    let path = sink.deliver(&file_name, EXPORT_MIME, &document).await?;

    info!("Exported {} entries", entries.len());
    Ok(path)
}

/// Read a document from `source`, validate it and merge it into the
/// collection. A rejected document leaves the collection untouched.
pub async fn import_entries(state: &Arc<AppState>, source: &dyn ImportSource) -> Result<ImportOutcome> {
    let Some(text) = source.pick().await? else {
        info!("Import cancelled");
        return Ok(ImportOutcome::Cancelled);
    };

    let imported = parse_document(&text)?;
    let added = imported.len();

    let mut renumbered = 0;
    EntryRepository::new(Arc::clone(state))
        .replace_with(|existing| {
            let (merged, count) = merge_with_report(existing, imported)?;
            renumbered = count;
            Ok(merged)
        })
        .await?;

    info!("Imported {} entries, {} renumbered", added, renumbered);
    Ok(ImportOutcome::Imported { added, renumbered })
}
