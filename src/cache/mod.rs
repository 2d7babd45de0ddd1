//! Lock-guarded credential cache in the OS secret store.
//!
//! One secret per role identity, stored under the service
//! `aws-cli-auth-<encoded role>` for the local user. Every read and write
//! happens inside the cross-process file lock, which is held for that single
//! operation only and never across network calls.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    aws::{Credentials, RoleIdentity},
    constants::{self, DEFAULT_LOCK_TIMEOUT, SELF_NAME},
    error::{Error, Result},
};

pub mod index;
pub mod lock;
pub mod secret;

pub use self::index::RoleIndex;
pub use self::lock::FileLock;
pub use self::secret::{OsKeyring, SecretBackend};

/// Where the store keeps its lock and index
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub lock_dir: PathBuf,
    pub index_path: PathBuf,
    pub lock_timeout: Duration,
    pub username: String,
}

impl StoreConfig {
    pub fn from_env(username: impl Into<String>) -> Result<Self> {
        let index_path = constants::default_role_index_path().ok_or_else(|| {
            Error::InvalidConfig("cannot determine home directory for the role index".into())
        })?;

        Ok(Self {
            lock_dir: constants::default_lock_dir(),
            index_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            username: username.into(),
        })
    }
}

pub struct CredentialStore<S = OsKeyring> {
    backend: Arc<S>,
    lock: FileLock,
    index: RoleIndex,
    username: String,
}

impl<S> Clone for CredentialStore<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            lock: self.lock.clone(),
            index: self.index.clone(),
            username: self.username.clone(),
        }
    }
}

impl CredentialStore<OsKeyring> {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_backend(config, OsKeyring)
    }
}

impl<S: SecretBackend> CredentialStore<S> {
    pub fn with_backend(config: StoreConfig, backend: S) -> Self {
        Self {
            backend: Arc::new(backend),
            lock: FileLock::new(&config.lock_dir, SELF_NAME, config.lock_timeout),
            index: RoleIndex::new(config.index_path),
            username: config.username,
        }
    }

    /// Cached credential for `role`; `Ok(None)` when nothing is stored
    pub fn get(&self, role: &RoleIdentity) -> Result<Option<Credentials>> {
        let _guard = self.lock.acquire()?;

        let secret = self
            .backend
            .get(&role.service_name(), &self.username)
            .map_err(|source| Error::SecretStore {
                role: role.to_string(),
                source,
            })?;

        let Some(secret) = secret else {
            debug!("No cached credential for {}", role);
            return Ok(None);
        };

        let creds: Credentials =
            serde_json::from_str(&secret).map_err(|source| Error::CorruptedCache {
                role: role.to_string(),
                source,
            })?;

        self.register(role);
        info!("Got credential from OS secret store for {}", role);
        Ok(Some(creds))
    }

    /// Replace the cached credential for `role`
    pub fn put(&self, role: &RoleIdentity, creds: &Credentials) -> Result<()> {
        let secret = serde_json::to_string(creds).map_err(Error::Serialize)?;

        let _guard = self.lock.acquire()?;
        self.backend
            .set(&role.service_name(), &self.username, &secret)
            .map_err(|source| Error::SecretStore {
                role: role.to_string(),
                source,
            })?;
        self.register(role);

        debug!("Stored credential for {}", role);
        Ok(())
    }

    /// Remove the cached credential for `role`; a missing entry is fine
    pub fn clear(&self, role: &RoleIdentity) -> Result<()> {
        let _guard = self.lock.acquire()?;
        match self.backend.delete(&role.service_name(), &self.username) {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(source) => Err(Error::SecretStore {
                role: role.to_string(),
                source,
            }),
        }
    }

    /// Remove every indexed credential.
    ///
    /// All entries are attempted; failures are collected into
    /// [`Error::ClearAll`] and stay in the index for a later retry.
    pub fn clear_all(&self) -> Result<Vec<RoleIdentity>> {
        let _guard = self.lock.acquire()?;

        let mut cleared = Vec::new();
        let mut failures = Vec::new();
        for role in self.index.roles()? {
            match self.backend.delete(&role.service_name(), &self.username) {
                Ok(()) => cleared.push(role),
                Err(keyring::Error::NoEntry) => {
                    debug!("{} was indexed but not in the secret store", role);
                    cleared.push(role);
                }
                Err(e) => {
                    warn!("Failed to clear {}: {}", role, e);
                    failures.push((role.to_string(), e));
                }
            }
        }

        if let Err(e) = self.index.remove(&cleared) {
            warn!("Could not prune the role index: {}", e);
        }

        if failures.is_empty() {
            info!("Cleared {} cached credential(s)", cleared.len());
            Ok(cleared)
        } else {
            Err(Error::ClearAll { failures })
        }
    }

    /// Roles currently listed in the index
    pub fn known_roles(&self) -> Result<Vec<RoleIdentity>> {
        let _guard = self.lock.acquire()?;
        self.index.roles()
    }

    /// Index bookkeeping only affects bulk clear, so a failure is not fatal
    fn register(&self, role: &RoleIdentity) {
        if let Err(e) = self.index.register(role) {
            warn!("Could not record {} in the role index: {}", role, e);
        }
    }
}

/// Async entry points. Lock polling and keyring calls block, so they run on
/// the blocking pool instead of a runtime worker.
impl<S: SecretBackend + 'static> CredentialStore<S> {
    pub async fn get_async(&self, role: &RoleIdentity) -> Result<Option<Credentials>> {
        let store = self.clone();
        let role = role.clone();
        task::spawn_blocking(move || store.get(&role)).await?
    }

    pub async fn put_async(&self, role: &RoleIdentity, creds: &Credentials) -> Result<()> {
        let store = self.clone();
        let role = role.clone();
        let creds = creds.clone();
        task::spawn_blocking(move || store.put(&role, &creds)).await?
    }
}
