//! Credential exchange: cache lookup, renewal through the IdP, persistence.
//!
//! ```text
//! validate -> cache lookup -> hit:  emit
//!                          -> miss: capture -> assume -> chain -> persist -> emit
//! ```
//!
//! Config is validated before the cache or the network is touched. A usable
//! cached record is emitted as stored, since it already reflects the full
//! role chain it was obtained with.

use std::{env, path::PathBuf, time::Duration};

use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::{
    aws::{
        Credentials, RoleAssumptionRequest, RoleIdentity, credentials::CredentialSink,
        roles::{AvailableRoles, assume_chain},
        sts::IdentityApi,
    },
    browser::{BrowserAutomation, CaptureTarget, capture},
    cache::{CredentialStore, OsKeyring, SecretBackend},
    constants::{
        self, AWS_ROLE_ARN_VAR, MAX_SESSION_DURATION_SECONDS, MIN_SESSION_DURATION_SECONDS,
        WEB_ID_TOKEN_VAR,
    },
    error::{Error, Result},
    saml::SamlResponse,
    validity::is_usable,
};

/// Settings shared by every exchange method
#[derive(Debug, Clone, Default)]
pub struct BaseConfig {
    /// Primary role: an IAM role ARN, or `ACCOUNT:ROLE_NAME` for SSO
    pub role: String,
    /// Roles assumed after the primary one, in order
    pub role_chain: Vec<String>,
    pub username: String,
    pub store_in_profile: bool,
    pub section_name: Option<String>,
    /// Renew when no more than this many seconds of validity remain
    pub reload_before_seconds: i64,
}

/// AWS SSO portal endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoConfig {
    pub region: String,
    pub user_endpoint: String,
    pub credentials_endpoint: String,
}

impl SsoConfig {
    pub fn for_region(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            user_endpoint: constants::sso_user_endpoint(&region),
            credentials_endpoint: constants::sso_credentials_endpoint(&region),
            region,
        }
    }

    /// Override the endpoints; a `%s` in either is replaced with the region
    pub fn with_endpoints(mut self, user: Option<&str>, credentials: Option<&str>) -> Self {
        if let Some(user) = user {
            self.user_endpoint = user.replace("%s", &self.region);
        }
        if let Some(credentials) = credentials {
            self.credentials_endpoint = credentials.replace("%s", &self.region);
        }
        self
    }

    /// Federation URL returning the credentials of `account:role_name`
    pub fn credentials_url(&self, role: &str) -> Result<String> {
        let (account, role_name) = split_sso_role(role)?;
        let url = Url::parse_with_params(
            &self.credentials_endpoint,
            &[
                ("account_id", account),
                ("role_name", role_name),
                ("debug", "true"),
            ],
        )
        .map_err(|e| {
            Error::InvalidConfig(format!(
                "invalid SSO federation endpoint '{}': {e}",
                self.credentials_endpoint
            ))
        })?;
        Ok(url.into())
    }
}

fn split_sso_role(role: &str) -> Result<(&str, &str)> {
    match role.split_once(':') {
        Some((account, name)) if !account.is_empty() && !name.is_empty() && !name.contains(':') => {
            Ok((account, name))
        }
        _ => Err(Error::InvalidConfig(format!(
            "incorrectly formatted role for AWS SSO '{role}', must be ACCOUNT:ROLE_NAME"
        ))),
    }
}

/// Everything one interactive exchange needs
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base: BaseConfig,
    /// IdP start URL opened in the browser
    pub provider_url: String,
    /// SAML provider ARN; resolved from the assertion when absent
    pub principal_arn: Option<String>,
    pub acs_url: String,
    pub duration_seconds: i32,
    /// Set for the AWS SSO portal flow, absent for plain SAML
    pub sso: Option<SsoConfig>,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub capture_timeout: Duration,
}

impl ExchangeConfig {
    /// Checks that need no I/O
    pub fn validate(&self) -> Result<()> {
        let base = &self.base;

        if base.store_in_profile && base.section_name.as_deref().is_none_or(str::is_empty) {
            return Err(Error::MissingSectionName);
        }
        if base.role.is_empty() {
            return Err(Error::InvalidConfig("a role must be provided".to_string()));
        }
        if self.provider_url.is_empty() {
            return Err(Error::InvalidConfig(
                "an identity provider URL must be provided".to_string(),
            ));
        }
        if !(MIN_SESSION_DURATION_SECONDS..=MAX_SESSION_DURATION_SECONDS)
            .contains(&self.duration_seconds)
        {
            return Err(Error::InvalidConfig(format!(
                "max-duration {} must be within [{MIN_SESSION_DURATION_SECONDS}-{MAX_SESSION_DURATION_SECONDS}]",
                self.duration_seconds
            )));
        }
        if base.reload_before_seconds < 0
            || (base.reload_before_seconds != 0
                && base.reload_before_seconds > i64::from(self.duration_seconds))
        {
            return Err(Error::InvalidConfig(format!(
                "reload-before: {}, must be less than max-duration: {}",
                base.reload_before_seconds, self.duration_seconds
            )));
        }
        if self.sso.is_some() {
            split_sso_role(&base.role)?;
        }
        Ok(())
    }

    /// Primary role followed by the configured chain
    pub fn effective_chain(&self) -> Vec<String> {
        std::iter::once(self.base.role.clone())
            .chain(self.base.role_chain.iter().cloned())
            .collect()
    }

    /// Cache key: the role the final credential belongs to
    pub fn role_identity(&self) -> RoleIdentity {
        RoleIdentity::new(
            self.base
                .role_chain
                .last()
                .unwrap_or(&self.base.role)
                .as_str(),
        )
    }

    fn capture_target(&self) -> Result<(String, CaptureTarget)> {
        match &self.sso {
            None => Ok((
                self.provider_url.clone(),
                CaptureTarget::Saml {
                    acs_url: self.acs_url.clone(),
                },
            )),
            Some(sso) => Ok((
                self.provider_url.clone(),
                CaptureTarget::Sso {
                    user_endpoint: sso.user_endpoint.clone(),
                    credentials_endpoint: sso.credentials_url(&self.base.role)?,
                },
            )),
        }
    }
}

/// Runs exchanges against one store, identity API and sink
pub struct CredentialExchange<'a, S = OsKeyring> {
    store: &'a CredentialStore<S>,
    api: &'a dyn IdentityApi,
    sink: &'a dyn CredentialSink,
}

impl<'a, S: SecretBackend + 'static> CredentialExchange<'a, S> {
    pub fn new(
        store: &'a CredentialStore<S>,
        api: &'a dyn IdentityApi,
        sink: &'a dyn CredentialSink,
    ) -> Self {
        Self { store, api, sink }
    }

    /// Emit a usable credential for `config`, going through the IdP only on a miss.
    ///
    /// Returns the emitted record.
    pub async fn run(
        &self,
        config: &ExchangeConfig,
        browser: &mut dyn BrowserAutomation,
    ) -> Result<Credentials> {
        config.validate()?;
        let role = config.role_identity();

        if let Some(cached) = self.store.get_async(&role).await? {
            if is_usable(Some(&cached), config.base.reload_before_seconds, self.api).await? {
                info!("Reusing cached credential for {}", role);
                self.sink.emit(&cached).await?;
                return Ok(cached);
            }
        }

        info!("Renewing credential for {}", role);
        debug!("Role chain: {}", config.effective_chain().join(" -> "));
        let (url, target) = config.capture_target()?;
        let payload = capture(browser, &url, &target, config.capture_timeout).await?;

        let base = match config.sso {
            Some(_) => Credentials::from_role_credentials(&payload)?,
            None => self.assume_from_saml(config, &payload).await?,
        };

        let creds = assume_chain(
            self.api,
            base,
            &config.base.username,
            &config.base.role_chain,
            config.duration_seconds,
        )
        .await?
        .stamped();

        self.store.put_async(&role, &creds).await?;
        self.sink.emit(&creds).await?;
        Ok(creds)
    }

    async fn assume_from_saml(&self, config: &ExchangeConfig, assertion: &str) -> Result<Credentials> {
        let principal_arn = match &config.principal_arn {
            Some(arn) => arn.clone(),
            None => {
                let saml = SamlResponse::from_base64(assertion)?;
                let role = AvailableRoles::from_saml_response(&saml)?.select(&config.base.role)?;
                debug!("Resolved principal {} from the SAML response", role.principal_arn);
                role.principal_arn
            }
        };

        let request = RoleAssumptionRequest::new(
            config.base.role.as_str(),
            &config.base.username,
            config.duration_seconds,
        )
        .with_principal_arn(principal_arn);
        self.api.assume_with_saml(&request, assertion).await
    }
}

/// Non-interactive exchange of a web identity token, for CI.
///
/// Reads the role from `AWS_ROLE_ARN` and the token from the file named by
/// `AWS_WEB_IDENTITY_TOKEN_FILE`, then walks `role_chain`. Nothing is cached.
pub async fn web_identity_login(
    api: &dyn IdentityApi,
    sink: &dyn CredentialSink,
    username: &str,
    role_chain: &[String],
    duration_seconds: i32,
) -> Result<Credentials> {
    let role_arn = env::var(AWS_ROLE_ARN_VAR).map_err(|_| Error::MissingEnvVar(AWS_ROLE_ARN_VAR))?;
    let token_file =
        env::var(WEB_ID_TOKEN_VAR).map_err(|_| Error::MissingEnvVar(WEB_ID_TOKEN_VAR))?;
    let token = fs::read_to_string(&token_file).await?;

    let request = RoleAssumptionRequest::new(role_arn, username, duration_seconds);
    let base = api.assume_with_web_identity(&request, token.trim()).await?;

    let creds = assume_chain(api, base, username, role_chain, duration_seconds)
        .await?
        .stamped();
    sink.emit(&creds).await?;
    Ok(creds)
}
