//! Credential storage in the system keychain
//!
//! The GitHub token and the model API key live together in one keychain
//! entry as JSON, so macOS asks for permission once instead of twice.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::warn;

const KEYRING_SERVICE: &str = "issue-mender-credentials";
const KEYRING_USERNAME: &str = "default";

/// Set to 1/true/yes to skip the keychain entirely (CI, containers).
pub const DISABLE_KEYRING_ENV: &str = "ISSUE_MENDER_DISABLE_KEYRING";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var(DISABLE_KEYRING_ENV)
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Warn about keychain errors only once per session
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    warn!(
        "couldn't access system keychain for {}: {}. Set GITHUB_TOKEN and the model key env var to bypass it.",
        context, err
    );
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return Err("system keychain is disabled".to_string());
    }
    let json = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    entry.set_password(&json).map_err(|e| e.to_string())
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(ref creds) = *guard {
        return Ok(creds.clone());
    }

    let creds = read_credentials_uncached()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn update_credentials(apply: impl FnOnce(&mut StoredCredentials)) -> KeyringResult<()> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    apply(&mut creds);
    write_credentials(&creds)?;

    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds);
    Ok(())
}

// ============================================================================
// Public API
// ============================================================================

pub fn get_github_token() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.github_token)
}

pub fn set_github_token(token: &str) -> KeyringResult<()> {
    update_credentials(|creds| creds.github_token = Some(token.to_string()))
}

pub fn get_model_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.model_api_key)
}

pub fn set_model_api_key(key: &str) -> KeyringResult<()> {
    update_credentials(|creds| creds.model_api_key = Some(key.to_string()))
}
