/// Secret storage keyed by `(service, user)`.
///
/// `get` returns `Ok(None)` for a missing entry; `delete` reports a missing
/// entry as `keyring::Error::NoEntry` and lets the caller decide.
pub trait SecretBackend: Send + Sync {
    fn set(&self, service: &str, user: &str, secret: &str) -> keyring::Result<()>;
    fn get(&self, service: &str, user: &str) -> keyring::Result<Option<String>>;
    fn delete(&self, service: &str, user: &str) -> keyring::Result<()>;
}

/// Platform secret store: Keychain, Windows Credential Manager, Secret Service
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyring;

impl SecretBackend for OsKeyring {
    fn set(&self, service: &str, user: &str, secret: &str) -> keyring::Result<()> {
        keyring::Entry::new(service, user)?.set_password(secret)
    }

    fn get(&self, service: &str, user: &str) -> keyring::Result<Option<String>> {
        match keyring::Entry::new(service, user)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, service: &str, user: &str) -> keyring::Result<()> {
        keyring::Entry::new(service, user)?.delete_credential()
    }
}
