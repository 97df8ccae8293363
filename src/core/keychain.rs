//! API key storage in the OS keychain.

use keyring::Entry;

use agent_core::Credential;

const SERVICE_NAME: &str = "beastmode";
const ACCOUNT: &str = "openrouter";

fn entry(account: &str) -> keyring::Result<Entry> {
    Entry::new(SERVICE_NAME, account)
}

/// Save the API key.
///
/// # Errors
///
/// Returns error if the keychain is unavailable.
pub fn store_api_key(api_key: &str) -> anyhow::Result<()> {
    entry(ACCOUNT)?.set_password(api_key.trim())?;
    tracing::debug!("api key stored in keychain");
    Ok(())
}

/// Saved API key, if any. An unavailable keychain reads as empty.
#[must_use]
pub fn load_credential() -> Option<Credential> {
    let password = entry(ACCOUNT).ok()?.get_password().ok()?;
    Credential::new(password)
}

/// Remove the saved API key. A missing entry is not an error.
///
/// # Errors
///
/// Returns error if the keychain is unavailable.
pub fn delete_api_key() -> anyhow::Result<()> {
    match entry(ACCOUNT)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
