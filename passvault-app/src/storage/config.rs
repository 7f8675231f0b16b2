use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PassVaultError, Result};

/// Default name of the exported document.
pub const DEFAULT_EXPORT_FILE_NAME: &str = "passwords.json";

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Argon2id cost parameters used when hashing a new PIN.
///
/// Existing PIN records keep the parameters they were hashed with, so these
/// can be changed without invalidating a stored PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinKdfSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PinKdfSettings {
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub export_file_name: String,
    pub pretty_export: bool,
    /// Recompute remaining validity once when the app starts.
    pub recompute_on_start: bool,
    pub pin_kdf: PinKdfSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
            pretty_export: true,
            recompute_on_start: true,
            pin_kdf: PinKdfSettings::default(),
        }
    }
}

fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE_NAME)
}

pub fn load_settings(data_dir: &Path) -> Result<AppSettings> {
    let path = get_settings_path(data_dir);

    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: AppSettings = serde_json::from_str(&content)
        .map_err(|e| PassVaultError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &AppSettings) -> Result<()> {
    let path = get_settings_path(data_dir);
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}
