use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config;

/// Prompts for the settings `saml` falls back to when flags are omitted
#[derive(Debug, Clone, Args)]
pub struct ConfigureCommand {}

impl ConfigureCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        info!("Configuring profile: {}", profile);
        config::configure_interactive(profile)
            .await
            .with_context(|| format!("Failed to configure profile '{profile}'"))
    }
}
