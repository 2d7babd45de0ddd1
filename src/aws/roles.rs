use tracing::{debug, info};

use super::{Credentials, RoleAssumptionRequest, sts::IdentityApi};
use crate::{
    constants::AWS_ROLE_ATTRIBUTE,
    error::{Error, Result},
    saml::SamlResponse,
};

/// A role granted by the SAML assertion, with the IdP principal that vouches for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamRole {
    pub name: String,
    pub role_arn: String,
    pub principal_arn: String,
}

/// Roles offered by a SAML assertion (never empty)
#[derive(Debug, Clone)]
pub struct AvailableRoles(Vec<IamRole>);

impl AvailableRoles {
    pub fn from_saml_response(saml_response: &SamlResponse) -> Result<Self> {
        let roles: Vec<IamRole> = saml_response
            .get_attribute_values(AWS_ROLE_ATTRIBUTE)?
            .iter()
            .filter_map(|value| IamRole::parse_arn_pair(value))
            .collect();

        if roles.is_empty() {
            return Err(Error::Saml("no roles found in SAML response".to_string()));
        }
        Ok(Self(roles))
    }

    /// Pick the role matching `role_arn`
    pub fn select(self, role_arn: &str) -> Result<IamRole> {
        let available = self.role_names().join(", ");
        self.0
            .into_iter()
            .find(|r| r.role_arn == role_arn)
            .ok_or_else(|| {
                Error::Saml(format!(
                    "role '{role_arn}' not granted by the IdP. Available roles: {available}"
                ))
            })
    }

    pub fn role_names(&self) -> Vec<&str> {
        self.0.iter().map(|r| r.name.as_str()).collect()
    }
}

impl IamRole {
    /// Parse `role_arn,principal_arn` (either order)
    fn parse_arn_pair(arn_pair: &str) -> Option<Self> {
        let (first, second) = arn_pair.split_once(',')?;
        let (first, second) = (first.trim(), second.trim());
        if second.contains(',') {
            return None;
        }

        let (role_arn, principal_arn) = if first.contains(":role/") {
            (first.to_string(), second.to_string())
        } else {
            (second.to_string(), first.to_string())
        };

        // arn:aws:iam::123456789012:role/RoleName
        let name = role_arn
            .split('/')
            .next_back()
            .map_or_else(|| "UnknownRole".to_string(), String::from);

        Some(IamRole {
            name,
            role_arn,
            principal_arn,
        })
    }
}

/// Assume every role of `chain` in order, each hop signed by the previous one.
///
/// An empty chain hands `base` back untouched. The first failing hop aborts
/// the chain; intermediate credentials are dropped.
pub async fn assume_chain(
    api: &dyn IdentityApi,
    base: Credentials,
    username: &str,
    chain: &[String],
    duration_seconds: i32,
) -> Result<Credentials> {
    let mut current = base;

    for (hop, role_arn) in chain.iter().enumerate() {
        debug!("Role chain hop {}: {}", hop + 1, role_arn);
        let request = RoleAssumptionRequest::new(role_arn.as_str(), username, duration_seconds);
        current = api.assume_role(&current, &request).await?;
    }

    if !chain.is_empty() {
        info!("Assumed {} chained role(s)", chain.len());
    }
    Ok(current)
}
