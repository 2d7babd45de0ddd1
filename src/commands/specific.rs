use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use super::sink_for;
use crate::{
    aws::sts::StsIdentityApi,
    cli::ExchangeArgs,
    config, constants,
    exchange::web_identity_login,
};

/// Non-interactive credential providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// AssumeRoleWithWebIdentity using AWS_ROLE_ARN and AWS_WEB_IDENTITY_TOKEN_FILE
    #[value(name = "WEB_ID")]
    WebId,
}

#[derive(Debug, Clone, Args)]
pub struct SpecificCommand {
    #[arg(
        short = 'm',
        long,
        value_enum,
        default_value = "WEB_ID",
        help = "Credential provider to run instead of the default chain"
    )]
    pub method: Method,
}

impl SpecificCommand {
    pub async fn execute(self, profile: &str, args: &ExchangeArgs) -> Result<()> {
        let sink = sink_for(args)?;
        let duration = match args.max_duration {
            Some(duration) => duration,
            None => {
                config::load_or_default(profile)
                    .await
                    .session_duration_seconds
            }
        };

        match self.method {
            Method::WebId => {
                info!("Exchanging web identity token");
                let api = StsIdentityApi::load(Some(profile)).await;
                web_identity_login(
                    &api,
                    sink.as_ref(),
                    &constants::current_username(),
                    &args.role_chain,
                    duration,
                )
                .await
                .context("Failed to exchange web identity token")?;
            }
        }

        Ok(())
    }
}
