use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::sink_for;
use crate::{
    aws::sts::StsIdentityApi,
    browser::ChromeBrowser,
    cache::{CredentialStore, StoreConfig},
    cli::ExchangeArgs,
    config::{self, Config},
    constants,
    exchange::{BaseConfig, CredentialExchange, ExchangeConfig, SsoConfig},
};

#[derive(Debug, Clone, Default, Args)]
pub struct SamlCommand {
    #[arg(long, help = "IdP start URL opened in the browser")]
    pub provider: Option<String>,

    #[arg(
        long,
        help = "ARN of the SAML provider in AWS; read from the SAML response when omitted"
    )]
    pub principal: Option<String>,

    #[arg(
        short = 'a',
        long,
        help = "ACS URL the SAMLResponse is posted to [default: https://signin.aws.amazon.com/saml]"
    )]
    pub acsurl: Option<String>,

    #[arg(
        long,
        help = "Use the AWS SSO user portal; --role must then be ACCOUNT_ID:ROLE_NAME"
    )]
    pub is_sso: bool,

    #[arg(long, help = "AWS SSO portal region [default: eu-west-1]")]
    pub sso_region: Option<String>,

    #[arg(long, help = "SSO user endpoint, %s is replaced with the region")]
    pub sso_user_endpoint: Option<String>,

    #[arg(long, help = "SSO federation credentials endpoint, %s is replaced with the region")]
    pub sso_fed_endpoint: Option<String>,

    #[arg(
        long,
        help = "Renew credentials this many seconds before they expire; must not exceed --max-duration"
    )]
    pub reload_before: Option<i64>,

    #[arg(long, help = "Seconds to wait for the browser login [default: 120]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Run the browser without a window")]
    pub headless: bool,
}

impl SamlCommand {
    pub async fn execute(self, profile: &str, args: &ExchangeArgs) -> Result<()> {
        info!("Starting authentication for profile: {}", profile);

        let settings = config::load_or_default(profile).await;
        let exchange_config = self.exchange_config(&settings, args, constants::current_username());
        // Fail fast on bad flags, before the keyring or AWS config are touched
        exchange_config.validate()?;

        let sink = sink_for(args)?;
        let store = CredentialStore::new(StoreConfig::from_env(
            exchange_config.base.username.clone(),
        )?);
        let api = StsIdentityApi::load(Some(profile)).await;
        let mut browser = ChromeBrowser::new(
            exchange_config.user_data_dir.clone(),
            exchange_config.headless,
        );

        let creds = CredentialExchange::new(&store, &api, sink.as_ref())
            .run(&exchange_config, &mut browser)
            .await
            .context("Failed to obtain AWS credentials")?;

        if let (true, Some(section)) = (args.store_profile, &args.cfg_section) {
            println!("\nAWS credentials saved to {section} profile.");
            if let Some(expiration) = creds.expiration {
                println!("Credentials will expire at: {}", expiration.to_rfc3339());
            }
        }

        Ok(())
    }

    /// Flags win over the profile settings
    fn exchange_config(
        &self,
        settings: &Config,
        args: &ExchangeArgs,
        username: String,
    ) -> ExchangeConfig {
        let sso = self.is_sso.then(|| {
            let region = self
                .sso_region
                .clone()
                .unwrap_or_else(|| settings.sso_region.clone());
            SsoConfig::for_region(region).with_endpoints(
                self.sso_user_endpoint.as_deref(),
                self.sso_fed_endpoint.as_deref(),
            )
        });

        let principal_arn = self
            .principal
            .clone()
            .or_else(|| Some(settings.saml_principal_arn.clone()))
            .filter(|arn| !arn.is_empty());

        ExchangeConfig {
            base: BaseConfig {
                role: args.role.clone().unwrap_or_default(),
                role_chain: args.role_chain.clone(),
                username,
                store_in_profile: args.store_profile,
                section_name: args.cfg_section.clone(),
                reload_before_seconds: self
                    .reload_before
                    .unwrap_or(settings.reload_before_seconds),
            },
            provider_url: self
                .provider
                .clone()
                .unwrap_or_else(|| settings.saml_provider_url.clone()),
            principal_arn,
            acs_url: self
                .acsurl
                .clone()
                .unwrap_or_else(|| settings.saml_acs_url.clone()),
            duration_seconds: args
                .max_duration
                .unwrap_or(settings.session_duration_seconds),
            sso,
            user_data_dir: settings.chrome_user_data_dir.clone(),
            headless: self.headless,
            capture_timeout: Duration::from_secs(
                self.timeout.unwrap_or(settings.browser_timeout_seconds),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::PathBuf;

    fn settings() -> Config {
        Config {
            saml_provider_url: "https://idp.example.com/configured".to_string(),
            saml_principal_arn: "arn:aws:iam::1:saml-provider/Configured".to_string(),
            reload_before_seconds: 300,
            browser_timeout_seconds: 60,
            session_duration_seconds: 3600,
            chrome_user_data_dir: PathBuf::from("/tmp/browser"),
            ..Config::default()
        }
    }

    fn args() -> ExchangeArgs {
        ExchangeArgs {
            role: Some("arn:aws:iam::1:role/Admin".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_settings_fill_missing_flags() {
        let config = SamlCommand::default().exchange_config(&settings(), &args(), "alice".into());

        assert_eq!(config.provider_url, "https://idp.example.com/configured");
        assert_eq!(
            config.principal_arn.as_deref(),
            Some("arn:aws:iam::1:saml-provider/Configured")
        );
        assert_eq!(config.acs_url, constants::DEFAULT_ACS_URL);
        assert_eq!(config.duration_seconds, 3600);
        assert_eq!(config.base.reload_before_seconds, 300);
        assert_eq!(config.capture_timeout, Duration::from_secs(60));
        assert_eq!(config.user_data_dir, PathBuf::from("/tmp/browser"));
        assert_eq!(config.base.username, "alice");
        assert!(config.sso.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override_settings() {
        let cmd = SamlCommand {
            provider: Some("https://idp.example.com/flag".to_string()),
            principal: Some(String::new()),
            reload_before: Some(0),
            timeout: Some(10),
            ..Default::default()
        };
        let args = ExchangeArgs {
            max_duration: Some(900),
            ..args()
        };

        let config = cmd.exchange_config(&settings(), &args, "alice".into());

        assert_eq!(config.provider_url, "https://idp.example.com/flag");
        // An empty principal means "read it from the SAML response"
        assert_eq!(config.principal_arn, None);
        assert_eq!(config.duration_seconds, 900);
        assert_eq!(config.base.reload_before_seconds, 0);
        assert_eq!(config.capture_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_sso_settings() {
        let cmd = SamlCommand {
            is_sso: true,
            sso_region: Some("us-west-2".to_string()),
            ..Default::default()
        };
        let args = ExchangeArgs {
            role: Some("123456789012:PowerUser".to_string()),
            ..Default::default()
        };

        let config = cmd.exchange_config(&settings(), &args, "alice".into());

        let sso = config.sso.as_ref().unwrap();
        assert_eq!(sso.region, "us-west-2");
        assert_eq!(
            sso.user_endpoint,
            "https://portal.sso.us-west-2.amazonaws.com/user"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_profile_without_section() {
        let args = ExchangeArgs {
            store_profile: true,
            ..args()
        };
        let config = SamlCommand::default().exchange_config(&settings(), &args, "alice".into());

        assert!(matches!(config.validate(), Err(Error::MissingSectionName)));
    }
}
