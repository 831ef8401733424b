//! macOS Keychain Services credential backend.
//!
//! Uses the Security framework to store credentials in the macOS Keychain,
//! which provides encrypted storage with OS-level access control.

use super::{CredentialError, CredentialManager, CredentialRef};

/// Service name for all orchestrator credentials in the keychain.
const SERVICE_NAME: &str = "com.packmind.orch";

/// Credential manager using macOS Keychain Services.
pub struct KeychainCredentialManager;

impl KeychainCredentialManager {
    /// Create a new Keychain credential manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeychainCredentialManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialManager for KeychainCredentialManager {
    fn store(&self, account: &str, value: &str) -> Result<CredentialRef, CredentialError> {
        security_framework::passwords::set_generic_password(
            SERVICE_NAME,
            account,
            value.as_bytes(),
        )
        .map_err(|e| CredentialError::KeychainAccess(format!("Failed to store credential: {e}")))?;

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
                match security_framework::passwords::get_generic_password(service, account) {
                    Ok(data) => {
                        let value = String::from_utf8(data).map_err(|e| {
                            CredentialError::InvalidReference(format!(
                                "Credential contains invalid UTF-8: {e}"
                            ))
                        })?;
                        Ok(Some(value))
                    }
                    Err(e) => {
                        // Check if this is a "not found" error vs other keychain errors
                        let err_str = format!("{e:?}");
                        if err_str.contains("errSecItemNotFound") || err_str.contains("-25300") {
                            Err(CredentialError::NotFound)
                        } else {
                            Err(CredentialError::KeychainAccess(format!(
                                "Failed to retrieve credential: {e}"
                            )))
                        }
                    }
                }
            }
        }
    }

    fn delete(&self, cred_ref: &CredentialRef) -> Result<(), CredentialError> {
        match cred_ref {
            CredentialRef::None | CredentialRef::Plaintext(_) => {
                // Nothing to delete from keychain
                Ok(())
            }
            CredentialRef::Keychain { service, account } => {
                match security_framework::passwords::delete_generic_password(service, account) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        // Deleting a non-existent item is not an error (idempotent delete)
                        let err_str = format!("{e:?}");
                        if err_str.contains("errSecItemNotFound") || err_str.contains("-25300") {
                            return Ok(()); // Idempotent: already deleted
                        }
                        Err(CredentialError::KeychainAccess(format!(
                            "Failed to delete credential: {e}"
                        )))
                    }
                }
            }
        }
    }
}
