use std::{fs, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info, warn};

use crate::{
    cache::{CredentialStore, SecretBackend, StoreConfig},
    config, constants,
};

#[derive(Debug, Clone, Args)]
pub struct ClearCacheCommand {
    #[arg(
        short = 'f',
        long,
        help = "Also delete the browser profile, signing out of the IdP"
    )]
    pub force: bool,
}

impl ClearCacheCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let store = CredentialStore::new(StoreConfig::from_env(constants::current_username())?);

        // Browser data goes first so a partial keyring failure still signs out
        if self.force {
            let settings = config::load_or_default(profile).await;
            remove_browser_data(&settings.chrome_user_data_dir)?;
        }

        let cleared = clear_credentials(&store)?;
        eprintln!("Cleared {cleared} cached credential(s).");

        Ok(())
    }
}

/// Clear every indexed credential; returns how many were removed
fn clear_credentials<S: SecretBackend>(store: &CredentialStore<S>) -> Result<usize> {
    let known = store
        .known_roles()
        .context("Failed to read the role index")?;
    if known.is_empty() {
        info!("No cached credentials to clear");
        return Ok(0);
    }
    debug!("Clearing {} indexed role(s)", known.len());

    let cleared = store
        .clear_all()
        .context("Failed to clear cached credentials")?;
    for role in &cleared {
        info!("Cleared {}", role);
    }
    Ok(cleared.len())
}

fn remove_browser_data(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            info!("Removed browser data {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("No browser data at {}", dir.display());
            Ok(())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to remove browser data {}", dir.display()))
        }
    }
}
