use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{CREDENTIAL_VERSION, SELF_NAME},
    error::{Error, Result},
};

pub mod credentials;
pub mod roles;
pub mod sts;

/// Sentinel standing in for `/` in storage keys
const SLASH_SENTINEL: &str = "____";

/// AWS temporary credentials, as cached and handed to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    #[serde(default)]
    pub version: u32,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Identity actually assumed, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Local>>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: Option<DateTime<Local>>,
    ) -> Self {
        Self {
            version: 0,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            principal_arn: None,
            expiration,
        }
    }

    pub fn with_principal_arn(mut self, principal_arn: impl Into<String>) -> Self {
        self.principal_arn = Some(principal_arn.into());
        self
    }

    /// Parse the `roleCredentials` JSON returned by the SSO federation endpoint
    pub fn from_role_credentials(payload: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            role_credentials: RoleCredentials,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RoleCredentials {
            access_key_id: String,
            secret_access_key: String,
            session_token: String,
            /// epoch milliseconds
            expiration: i64,
        }

        let payload: Payload = serde_json::from_str(payload).map_err(Error::RolePayload)?;
        let rc = payload.role_credentials;

        Ok(Self::new(
            rc.access_key_id,
            rc.secret_access_key,
            rc.session_token,
            Local.timestamp_millis_opt(rc.expiration).single(),
        ))
    }

    /// Stamp the current schema version on a freshly exchanged record
    pub fn stamped(mut self) -> Self {
        self.version = CREDENTIAL_VERSION;
        self
    }

    /// `credential_process` shape, which has no room for the principal ARN
    pub fn process_output(&self) -> ProcessCredentials<'_> {
        ProcessCredentials {
            version: CREDENTIAL_VERSION,
            access_key_id: &self.access_key_id,
            secret_access_key: &self.secret_access_key,
            session_token: &self.session_token,
            expiration: self.expiration.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessCredentials<'a> {
    pub version: u32,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<&'a DateTime<Local>>,
}

/// Cache key of a credential: a role ARN, or `ACCOUNT:ROLE` for SSO.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleIdentity(String);

impl RoleIdentity {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage-safe form: `:` becomes `_`, `/` becomes `____`.
    ///
    /// Not reversible once the identity itself holds `_`, as
    /// `AWSReservedSSO_*` roles do; the role index keeps the raw name too.
    pub fn encode(&self) -> String {
        self.0.replace(':', "_").replace('/', SLASH_SENTINEL)
    }

    pub fn decode(key: &str) -> Self {
        Self(key.replace(SLASH_SENTINEL, "/").replace('_', ":"))
    }

    /// Keyring service name holding this role's credential
    pub fn service_name(&self) -> String {
        format!("{SELF_NAME}-{}", self.encode())
    }
}

impl std::fmt::Display for RoleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs of a single STS assumption
#[derive(Debug, Clone)]
pub struct RoleAssumptionRequest {
    pub role_arn: String,
    /// SAML provider ARN, only used by the assertion-based assumption
    pub principal_arn: Option<String>,
    pub session_name: String,
    pub duration_seconds: i32,
}

impl RoleAssumptionRequest {
    pub fn new(role_arn: impl Into<String>, username: &str, duration_seconds: i32) -> Self {
        Self {
            role_arn: role_arn.into(),
            principal_arn: None,
            session_name: session_name(username),
            duration_seconds,
        }
    }

    pub fn with_principal_arn(mut self, principal_arn: impl Into<String>) -> Self {
        self.principal_arn = Some(principal_arn.into());
        self
    }
}

/// Role session name derived from the local user: `<user>-aws-cli-auth`
pub fn session_name(username: &str) -> String {
    // STS accepts [\w+=,.@-]{2,64}
    format!("{username}-{SELF_NAME}")
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '+' | '=' | ',' | '.' | '@' | '_' | '-' => c,
            _ => '-',
        })
        .take(64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ROLE: &str = "arn:aws:iam::111122342343:role/DevAdmin";
    const KEY: &str = "arn_aws_iam__111122342343_role____DevAdmin";

    #[test]
    fn test_encode_role_identity() {
        assert_eq!(RoleIdentity::new(ROLE).encode(), KEY);
        assert_eq!(RoleIdentity::decode(KEY).as_str(), ROLE);
    }

    #[test]
    fn test_encode_decode_is_reversible() {
        let roles = [
            "arn:aws:iam::123456789012:role/Admin",
            "arn:aws:iam::123456789012:role/path/to/Deep",
            "123456789012:PowerUser",
            "arn:aws-cn:iam::123456789012:role/Role-With.Dots",
            "",
        ];

        for role in roles {
            let identity = RoleIdentity::new(role);
            let key = identity.encode();
            assert!(!key.contains(':') && !key.contains('/'), "{key}");
            assert_eq!(RoleIdentity::decode(&key), identity);
        }
    }

    #[test]
    fn test_service_name() {
        assert_eq!(
            RoleIdentity::new(ROLE).service_name(),
            format!("aws-cli-auth-{KEY}")
        );
    }

    #[test]
    fn test_session_name_sanitized() {
        assert_eq!(session_name("alice"), "alice-aws-cli-auth");
        assert_eq!(session_name(r"CORP\bob smith"), "CORP-bob-smith-aws-cli-auth");
        assert_eq!(session_name(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn test_from_role_credentials() {
        let payload = r#"{"roleCredentials":{"accessKeyId":"ASIAXX","secretAccessKey":"secret","sessionToken":"token","expiration":1700000000000}}"#;
        let creds = Credentials::from_role_credentials(payload).unwrap();

        assert_eq!(creds.access_key_id, "ASIAXX");
        assert_eq!(creds.secret_access_key, "secret");
        assert_eq!(creds.session_token, "token");
        assert_eq!(creds.expiration.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_from_role_credentials_malformed() {
        let err = Credentials::from_role_credentials(r#"{"nope":1}"#).unwrap_err();
        assert!(matches!(err, Error::RolePayload(_)));
    }

    #[test]
    fn test_process_output_omits_principal() {
        let creds = Credentials::new("AK", "SK", "ST", Some(Local::now() + Duration::minutes(5)))
            .with_principal_arn("arn:aws:sts::1:assumed-role/R/s")
            .stamped();

        let json = serde_json::to_value(creds.process_output()).unwrap();
        assert_eq!(json["Version"], 1);
        assert_eq!(json["AccessKeyId"], "AK");
        assert!(json.get("PrincipalArn").is_none());
        assert!(json.get("Expiration").is_some());
    }

    #[test]
    fn test_cached_json_round_trip() {
        let creds = Credentials::new("AK", "SK", "ST", Some(Local::now()))
            .with_principal_arn("arn:aws:sts::1:assumed-role/R/s")
            .stamped();

        let json = serde_json::to_string(&creds).unwrap();
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, creds);
    }
}
