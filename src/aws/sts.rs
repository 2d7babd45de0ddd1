use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::{
    Client as StsClient,
    config::{Builder as StsConfigBuilder, Credentials as StsCredentials},
    error::ProvideErrorMetadata,
    types::{AssumedRoleUser, Credentials as StsSessionCredentials},
};
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info};

use super::{Credentials, RoleAssumptionRequest};
use crate::{
    constants::{DEFAULT_AWS_REGION, SELF_NAME},
    error::{Error, Result},
};

/// Error code STS returns for a session token past its expiry
const EXPIRED_TOKEN_CODE: &str = "ExpiredToken";

/// Outcome of checking a credential against the remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Accepted,
    Expired,
}

/// The STS operations the credential lifecycle depends on.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// `AssumeRoleWithSAML`; the request must carry the principal ARN
    async fn assume_with_saml(
        &self,
        request: &RoleAssumptionRequest,
        assertion: &str,
    ) -> Result<Credentials>;

    /// `AssumeRole` signed with `caller`
    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &RoleAssumptionRequest,
    ) -> Result<Credentials>;

    /// `AssumeRoleWithWebIdentity`
    async fn assume_with_web_identity(
        &self,
        request: &RoleAssumptionRequest,
        token: &str,
    ) -> Result<Credentials>;

    /// `GetCallerIdentity` signed with `caller`
    async fn probe_identity(&self, caller: &Credentials) -> Result<Probe>;
}

/// [`IdentityApi`] backed by AWS STS
#[derive(Debug, Clone)]
pub struct StsIdentityApi {
    config: SdkConfig,
}

impl StsIdentityApi {
    /// Load the AWS config for `profile`, falling back to DEFAULT_AWS_REGION
    pub async fn load(profile: Option<&str>) -> Self {
        // Priority: ENV vars -> Config file -> EC2 metadata -> DEFAULT_AWS_REGION
        let loader = || {
            let loader = aws_config::defaults(BehaviorVersion::latest());
            match profile {
                Some(profile) => loader.profile_name(profile),
                None => loader,
            }
        };

        let loaded = loader().load().await;
        let config = match loaded.region() {
            Some(region) => {
                info!("Using region: {}", region);
                loaded
            }
            None => {
                info!(
                    "No region configured, using default {} for STS",
                    DEFAULT_AWS_REGION
                );
                loader()
                    .region(Region::new(DEFAULT_AWS_REGION))
                    .load()
                    .await
            }
        };

        Self { config }
    }

    fn client(&self) -> StsClient {
        StsClient::new(&self.config)
    }

    /// Client whose requests are signed with `caller` rather than the ambient chain
    fn client_as(&self, caller: &Credentials) -> StsClient {
        let provider = StsCredentials::new(
            caller.access_key_id.clone(),
            caller.secret_access_key.clone(),
            Some(caller.session_token.clone()),
            caller.expiration.map(Into::into),
            SELF_NAME,
        );
        let config = StsConfigBuilder::from(&self.config)
            .credentials_provider(provider)
            .build();
        StsClient::from_conf(config)
    }
}

#[async_trait]
impl IdentityApi for StsIdentityApi {
    async fn assume_with_saml(
        &self,
        request: &RoleAssumptionRequest,
        assertion: &str,
    ) -> Result<Credentials> {
        info!("Calling AWS STS AssumeRoleWithSAML");
        debug!("Role ARN: {}", request.role_arn);
        debug!("Principal ARN: {:?}", request.principal_arn);
        debug!("Duration: {} seconds", request.duration_seconds);

        let principal_arn = request.principal_arn.as_deref().ok_or_else(|| {
            Error::InvalidConfig(format!("no principal ARN for role {}", request.role_arn))
        })?;

        let response = self
            .client()
            .assume_role_with_saml()
            .role_arn(&request.role_arn)
            .principal_arn(principal_arn)
            .saml_assertion(assertion)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|e| Error::assume(&request.role_arn, e))?;

        into_credentials(
            &request.role_arn,
            response.credentials(),
            response.assumed_role_user(),
        )
    }

    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &RoleAssumptionRequest,
    ) -> Result<Credentials> {
        info!("Calling AWS STS AssumeRole for {}", request.role_arn);
        debug!("Session name: {}", request.session_name);

        let response = self
            .client_as(caller)
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .send()
            .await
            .map_err(|e| Error::assume(&request.role_arn, e))?;

        into_credentials(
            &request.role_arn,
            response.credentials(),
            response.assumed_role_user(),
        )
    }

    async fn assume_with_web_identity(
        &self,
        request: &RoleAssumptionRequest,
        token: &str,
    ) -> Result<Credentials> {
        info!("Calling AWS STS AssumeRoleWithWebIdentity");
        debug!("Role ARN: {}", request.role_arn);

        let response = self
            .client()
            .assume_role_with_web_identity()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .web_identity_token(token)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|e| Error::assume(&request.role_arn, e))?;

        into_credentials(
            &request.role_arn,
            response.credentials(),
            response.assumed_role_user(),
        )
    }

    async fn probe_identity(&self, caller: &Credentials) -> Result<Probe> {
        match self.client_as(caller).get_caller_identity().send().await {
            Ok(identity) => {
                debug!("Cached credential belongs to {:?}", identity.arn());
                Ok(Probe::Accepted)
            }
            Err(e) if e.code() == Some(EXPIRED_TOKEN_CODE) => Ok(Probe::Expired),
            Err(e) => Err(Error::Probe(e.into())),
        }
    }
}

fn into_credentials(
    role_arn: &str,
    credentials: Option<&StsSessionCredentials>,
    assumed: Option<&AssumedRoleUser>,
) -> Result<Credentials> {
    let sts_creds =
        credentials.ok_or_else(|| Error::assume(role_arn, "AWS STS returned no credentials"))?;

    let expiration = sts_creds.expiration();
    let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .map(|utc| utc.with_timezone(&Local));

    let mut creds = Credentials::new(
        sts_creds.access_key_id(),
        sts_creds.secret_access_key(),
        sts_creds.session_token(),
        expiration,
    );
    if let Some(user) = assumed {
        creds = creds.with_principal_arn(user.arn());
    }

    info!("Successfully obtained AWS credentials");
    Ok(creds)
}
