use std::{env, path::PathBuf, time::Duration};

use dirs;

/// Tool name, used for keyring service names, session names and file names
pub const SELF_NAME: &str = "aws-cli-auth";

/// Credential record schema version written on every fresh exchange
pub const CREDENTIAL_VERSION: u32 = 1;

/// Section prefix of role entries in the role index file
pub const INDEX_SECTION_PREFIX: &str = "role";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// Default ACS URL the SAML response is posted to
pub const DEFAULT_ACS_URL: &str = "https://signin.aws.amazon.com/saml";

/// SAML attribute carrying `role_arn,principal_arn` pairs
pub const AWS_ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// Default AWS SSO region
pub const DEFAULT_SSO_REGION: &str = "eu-west-1";

/// Default session duration in seconds
pub const DEFAULT_SESSION_DURATION_SECONDS: i32 = 900;

/// Minimum session duration accepted by STS
pub const MIN_SESSION_DURATION_SECONDS: i32 = 900;

/// Maximum session duration accepted by STS
pub const MAX_SESSION_DURATION_SECONDS: i32 = 43_200;

/// How long the browser flow may take before giving up
pub const DEFAULT_BROWSER_TIMEOUT: Duration = Duration::from_secs(120);

/// How long Chrome gets to exit after Browser.close before it is killed
pub const BROWSER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a store operation waits for the cross-process lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default AWS region for STS operations when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Env var naming the web identity token file
pub const WEB_ID_TOKEN_VAR: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";

/// Env var naming the role assumed with the web identity token
pub const AWS_ROLE_ARN_VAR: &str = "AWS_ROLE_ARN";

/// AWS SSO portal user-info endpoint for a region
pub fn sso_user_endpoint(region: &str) -> String {
    format!("https://portal.sso.{region}.amazonaws.com/user")
}

/// AWS SSO portal federation credentials endpoint for a region
pub fn sso_credentials_endpoint(region: &str) -> String {
    format!("https://portal.sso.{region}.amazonaws.com/federation/credentials/")
}

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| {
        env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    })
}

/// Browser profile reused across runs: ~/.aws-cli-auth-data
pub fn default_browser_data_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(format!(".{SELF_NAME}-data")))
}

/// Index of every role ever cached: ~/.aws-cli-auth.ini
pub fn default_role_index_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(format!(".{SELF_NAME}.ini")))
}

/// Directory holding the cross-process lock file
pub fn default_lock_dir() -> PathBuf {
    env::temp_dir().join(format!("{SELF_NAME}-lock"))
}

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join("credentials"))
}

/// Local user name, used as keyring account and in session names
pub fn current_username() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_sso_endpoints() {
        assert_eq!(
            sso_user_endpoint("eu-west-1"),
            "https://portal.sso.eu-west-1.amazonaws.com/user"
        );
        assert_eq!(
            sso_credentials_endpoint("us-east-2"),
            "https://portal.sso.us-east-2.amazonaws.com/federation/credentials/"
        );
    }

    #[test]
    #[serial]
    fn test_default_paths_use_self_name() {
        if let Some(dir) = default_browser_data_dir() {
            assert!(dir.to_string_lossy().ends_with(".aws-cli-auth-data"));
        }
        if let Some(index) = default_role_index_path() {
            assert!(index.to_string_lossy().ends_with(".aws-cli-auth.ini"));
        }
        assert!(
            default_lock_dir()
                .to_string_lossy()
                .ends_with("aws-cli-auth-lock")
        );
    }

    #[test]
    #[serial]
    fn test_get_aws_config_path_with_env() {
        let original = env::var("AWS_CONFIG_FILE").ok();

        unsafe {
            env::set_var("AWS_CONFIG_FILE", "/custom/aws/config");
        }
        let path = get_aws_config_path();
        assert_eq!(path, Some(PathBuf::from("/custom/aws/config")));

        unsafe {
            match original {
                Some(val) => env::set_var("AWS_CONFIG_FILE", val),
                None => env::remove_var("AWS_CONFIG_FILE"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_credentials_path_with_env() {
        let original = env::var("AWS_SHARED_CREDENTIALS_FILE").ok();

        unsafe {
            env::set_var("AWS_SHARED_CREDENTIALS_FILE", "/custom/path/credentials");
        }
        let path = get_aws_credentials_path();
        assert_eq!(path, Some(PathBuf::from("/custom/path/credentials")));

        unsafe {
            match original {
                Some(val) => env::set_var("AWS_SHARED_CREDENTIALS_FILE", val),
                None => env::remove_var("AWS_SHARED_CREDENTIALS_FILE"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_credentials_path_default() {
        let original = env::var("AWS_SHARED_CREDENTIALS_FILE").ok();

        unsafe {
            env::remove_var("AWS_SHARED_CREDENTIALS_FILE");
        }
        let path = get_aws_credentials_path();

        if let Some(p) = path {
            let path_str = p.to_string_lossy();
            assert!(path_str.contains(AWS_CONFIG_DIR_NAME));
            assert!(path_str.contains("credentials"));
        }

        unsafe {
            if let Some(val) = original {
                env::set_var("AWS_SHARED_CREDENTIALS_FILE", val);
            }
        }
    }
}
