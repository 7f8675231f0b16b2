//! Credential entry type and its validity arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::{PassVaultError, Result};

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// One stored credential.
///
/// Field names on the wire match documents exported by earlier releases of
/// the app (`password`, `validity`, `createdAt`), so those files import
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: u64,
    pub description: String,
    #[serde(rename = "password")]
    pub secret: String,
    /// Days remaining until expiry. Negative once expired.
    #[serde(rename = "validity")]
    pub validity_days: i64,
    /// Creation time in epoch milliseconds. Anchor for expiry.
    pub created_at: i64,
    /// Validity length in days as originally granted. Absent on records
    /// written before the window was tracked; pinned on first recompute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_window: Option<i64>,
}

impl Entry {
    pub fn is_expired(&self) -> bool {
        self.validity_days <= 0
    }

    /// Recompute `validity_days` for `now_ms`, pinning the window first if
    /// this record predates it. Returns whether the stored value changed.
    pub fn refresh_validity(&mut self, now_ms: i64) -> bool {
        let window = match self.validity_window {
            Some(window) => window,
            None => {
                let pinned = pin_window(self.validity_days, self.created_at, now_ms);
                self.validity_window = Some(pinned);
                pinned
            }
        };

        let remaining = remaining_days(self.created_at, window, now_ms);
        let changed = remaining != self.validity_days;
        self.validity_days = remaining;
        changed
    }
}

/// `ceil((created_at + window * DAY_MS - now_ms) / DAY_MS)`, exact in integers.
pub fn remaining_days(created_at: i64, window_days: i64, now_ms: i64) -> i64 {
    let expires_at = created_at.saturating_add(window_days.saturating_mul(DAY_MS));
    let delta = expires_at.saturating_sub(now_ms);

    // Integer division truncates toward zero, which is already the ceiling
    // for negative deltas.
    let days = delta / DAY_MS;
    if delta % DAY_MS > 0 {
        days + 1
    } else {
        days
    }
}

/// Window that keeps `current_remaining` unchanged when recomputed at `now_ms`.
pub(crate) fn pin_window(current_remaining: i64, created_at: i64, now_ms: i64) -> i64 {
    let elapsed_days = now_ms.saturating_sub(created_at).max(0) / DAY_MS;
    current_remaining.saturating_add(elapsed_days)
}

/// Check the user-editable fields of an entry.
pub fn validate_fields(description: &str, secret: &str, validity_days: i64) -> Result<()> {
    validate_text_fields(description, secret)?;
    validate_validity_days(validity_days)
}

/// Description and password are required; validity is checked separately
/// since an edit may keep the stored value.
pub fn validate_text_fields(description: &str, secret: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(PassVaultError::Validation("Description is required".into()));
    }
    if secret.is_empty() {
        return Err(PassVaultError::Validation("Password is required".into()));
    }
    Ok(())
}

fn validate_validity_days(validity_days: i64) -> Result<()> {
    if validity_days <= 0 {
        return Err(PassVaultError::Validation(format!(
            "Validity must be a positive number of days, got {}",
            validity_days
        )));
    }
    Ok(())
}

/// Parse user-typed validity, e.g. from a text field.
pub fn parse_validity_days(input: &str) -> Result<i64> {
    let days: i64 = input.trim().parse().map_err(|_| {
        PassVaultError::Validation(format!("Validity must be a whole number of days: {:?}", input))
    })?;
    validate_validity_days(days)?;
    Ok(days)
}
