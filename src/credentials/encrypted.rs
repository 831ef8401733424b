//! Cross-platform encrypted credential storage.
//!
//! Uses the `keyring` crate which provides OS-appropriate secure storage:
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//! - **Windows**: Windows Credential Manager
//! - **Other**: Encrypted file-based storage

use super::{CredentialError, CredentialManager, CredentialRef};

/// Service name for all orchestrator credentials in the platform credential store.
const SERVICE_NAME: &str = "packmind-credentials";

/// Credential manager using platform-specific encrypted storage via `keyring`.
pub struct EncryptedCredentialManager;

impl EncryptedCredentialManager {
    /// Create a new encrypted credential manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for EncryptedCredentialManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialManager for EncryptedCredentialManager {
    fn store(&self, account: &str, value: &str) -> Result<CredentialRef, CredentialError> {
        let entry = keyring::Entry::new(SERVICE_NAME, account).map_err(|e| {
            CredentialError::StorageError(format!("Failed to create keyring entry: {e}"))
        })?;

        entry.set_password(value).map_err(|e| {
            CredentialError::StorageError(format!("Failed to store credential: {e}"))
        })?;

        Ok(CredentialRef::Keychain {
            service: SERVICE_NAME.to_owned(),
            account: account.to_owned(),
        })
    }

    fn retrieve(&self, cred_ref: &CredentialRef) -> Result<Option<String>, CredentialError> {
        match cred_ref {
            CredentialRef::None => Ok(None),
            CredentialRef::Plaintext(value) => Ok(Some(value.clone())),
            CredentialRef::Keychain { service, account } => {
                let entry = keyring::Entry::new(service, account).map_err(|e| {
                    CredentialError::StorageError(format!("Failed to create keyring entry: {e}"))
                })?;

                match entry.get_password() {
                    Ok(password) => Ok(Some(password)),
                    Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound),
                    Err(e) => Err(CredentialError::StorageError(format!(
                        "Failed to retrieve credential: {e}"
                    ))),
                }
            }
        }
    }

    fn delete(&self, cred_ref: &CredentialRef) -> Result<(), CredentialError> {
        match cred_ref {
            CredentialRef::None | CredentialRef::Plaintext(_) => {
                // Nothing to delete from encrypted storage
                Ok(())
            }
            CredentialRef::Keychain { service, account } => {
                let entry = keyring::Entry::new(service, account).map_err(|e| {
                    CredentialError::StorageError(format!("Failed to create keyring entry: {e}"))
                })?;

                match entry.delete_credential() {
                    Ok(()) => Ok(()),
                    Err(keyring::Error::NoEntry) => Ok(()), // Idempotent: already deleted
                    Err(e) => Err(CredentialError::StorageError(format!(
                        "Failed to delete credential: {e}"
                    ))),
                }
            }
        }
    }
}
