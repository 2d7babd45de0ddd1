use crate::constants::{
    self, DEFAULT_ACS_URL, DEFAULT_BROWSER_TIMEOUT, DEFAULT_SESSION_DURATION_SECONDS,
    DEFAULT_SSO_REGION, MAX_SESSION_DURATION_SECONDS, MIN_SESSION_DURATION_SECONDS, SELF_NAME,
};
use anyhow::{Context, Result};
use dialoguer::{Input, theme::ColorfulTheme};
use ini::{Ini, Properties};
use std::{env, path::PathBuf};
use tokio::fs;
use tracing::debug;

/// Per-profile settings kept in the AWS config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub saml_provider_url: String,
    /// Empty when the principal is resolved from the SAML response
    pub saml_principal_arn: String,
    pub saml_acs_url: String,
    pub sso_region: String,
    pub session_duration_seconds: i32,
    pub reload_before_seconds: i64,
    pub browser_timeout_seconds: u64,
    pub chrome_user_data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            saml_provider_url: String::new(),
            saml_principal_arn: String::new(),
            saml_acs_url: DEFAULT_ACS_URL.to_string(),
            sso_region: DEFAULT_SSO_REGION.to_string(),
            session_duration_seconds: DEFAULT_SESSION_DURATION_SECONDS,
            reload_before_seconds: 0,
            browser_timeout_seconds: DEFAULT_BROWSER_TIMEOUT.as_secs(),
            chrome_user_data_dir: default_user_data_dir(),
        }
    }
}

impl Config {
    fn from_ini_section(section: &Properties) -> Self {
        let defaults = Self::default();
        Self {
            saml_provider_url: section
                .get("saml_provider_url")
                .unwrap_or("")
                .to_string(),
            saml_principal_arn: section
                .get("saml_principal_arn")
                .unwrap_or("")
                .to_string(),
            saml_acs_url: section
                .get("saml_acs_url")
                .map_or(defaults.saml_acs_url, str::to_string),
            sso_region: section
                .get("sso_region")
                .map_or(defaults.sso_region, str::to_string),
            session_duration_seconds: section
                .get("session_duration_seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.session_duration_seconds),
            reload_before_seconds: section
                .get("reload_before_seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reload_before_seconds),
            browser_timeout_seconds: section
                .get("browser_timeout_seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.browser_timeout_seconds),
            chrome_user_data_dir: section
                .get("chrome_user_data_dir")
                .map_or(defaults.chrome_user_data_dir, PathBuf::from),
        }
    }

    fn save_to_ini(&self, ini: &mut Ini, profile: &str) {
        ini.with_section(Some(section_name(profile)))
            .set("saml_provider_url", &self.saml_provider_url)
            .set("saml_principal_arn", &self.saml_principal_arn)
            .set("saml_acs_url", &self.saml_acs_url)
            .set("sso_region", &self.sso_region)
            .set(
                "session_duration_seconds",
                self.session_duration_seconds.to_string(),
            )
            .set(
                "reload_before_seconds",
                self.reload_before_seconds.to_string(),
            )
            .set(
                "browser_timeout_seconds",
                self.browser_timeout_seconds.to_string(),
            )
            .set(
                "chrome_user_data_dir",
                self.chrome_user_data_dir.to_string_lossy(),
            );
    }
}

fn section_name(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

fn default_user_data_dir() -> PathBuf {
    constants::default_browser_data_dir()
        .unwrap_or_else(|| env::temp_dir().join(format!(".{SELF_NAME}-data")))
}

pub async fn load(profile: &str) -> Result<Config> {
    let path = get_config_path()?;
    let ini = Ini::load_from_file(&path)
        .context("Failed to load config file. Please run `aws-cli-auth configure` first")?;

    let section = ini
        .section(Some(section_name(profile)))
        .with_context(|| format!("Profile '{profile}' not found in config"))?;

    Ok(Config::from_ini_section(section))
}

/// Settings for `profile`, or the defaults when it has none yet
pub async fn load_or_default(profile: &str) -> Config {
    match load(profile).await {
        Ok(config) => config,
        Err(e) => {
            debug!("Using default settings: {:#}", e);
            Config::default()
        }
    }
}

pub async fn save(profile: &str, config: &Config) -> Result<()> {
    let path = get_config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = if path.exists() {
        Ini::load_from_file(&path)
            .with_context(|| format!("Failed to parse existing config {}", path.display()))?
    } else {
        Ini::new()
    };

    config.save_to_ini(&mut ini, profile);

    ini.write_to_file(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub async fn configure_interactive(profile: &str) -> Result<()> {
    println!("Configuring aws-cli-auth for profile: {profile}");

    let existing_config = load(profile).await.ok();

    if existing_config.is_some() {
        println!("Press Enter to keep current values, or type new values.");
    }
    println!();

    let theme = ColorfulTheme::default();
    let current = existing_config.unwrap_or_default();

    let saml_provider_url = Input::<String>::with_theme(&theme)
        .with_prompt("IdP start URL")
        .default(current.saml_provider_url.clone())
        .allow_empty(!current.saml_provider_url.is_empty())
        .validate_with(|input: &String| {
            if input.starts_with("https://") || input.starts_with("http://") {
                Ok(())
            } else {
                Err("The IdP start URL must be an http(s) URL")
            }
        })
        .interact_text()
        .context("Failed to read IdP start URL")?;

    let saml_principal_arn = Input::<String>::with_theme(&theme)
        .with_prompt("SAML provider ARN (empty to read it from the SAML response)")
        .default(current.saml_principal_arn)
        .allow_empty(true)
        .validate_with(|input: &String| {
            if input.is_empty() || input.contains(":saml-provider/") {
                Ok(())
            } else {
                Err("Expected arn:aws:iam::ACCOUNT:saml-provider/NAME")
            }
        })
        .interact_text()
        .context("Failed to read SAML provider ARN")?;

    let saml_acs_url = Input::<String>::with_theme(&theme)
        .with_prompt("ACS URL")
        .default(current.saml_acs_url)
        .interact_text()
        .context("Failed to read ACS URL")?;

    let sso_region = Input::<String>::with_theme(&theme)
        .with_prompt("AWS SSO region")
        .default(current.sso_region)
        .interact_text()
        .context("Failed to read SSO region")?;

    let session_duration_seconds = Input::<i32>::with_theme(&theme)
        .with_prompt(format!(
            "Session duration seconds ({MIN_SESSION_DURATION_SECONDS}-{MAX_SESSION_DURATION_SECONDS})"
        ))
        .default(current.session_duration_seconds)
        .validate_with(|input: &i32| {
            if (MIN_SESSION_DURATION_SECONDS..=MAX_SESSION_DURATION_SECONDS).contains(input) {
                Ok(())
            } else {
                Err("Please enter a value between 900 and 43200")
            }
        })
        .interact_text()
        .context("Failed to read session duration")?;

    let reload_before_seconds = Input::<i64>::with_theme(&theme)
        .with_prompt("Renew this many seconds before expiry (0 to disable)")
        .default(current.reload_before_seconds)
        .validate_with(|input: &i64| {
            if *input >= 0 && *input <= i64::from(session_duration_seconds) {
                Ok(())
            } else {
                Err("Must be between 0 and the session duration")
            }
        })
        .interact_text()
        .context("Failed to read reload-before seconds")?;

    let browser_timeout_seconds = Input::<u64>::with_theme(&theme)
        .with_prompt("Browser login timeout seconds")
        .default(current.browser_timeout_seconds)
        .interact_text()
        .context("Failed to read browser timeout")?;

    let chrome_user_data_dir = Input::<String>::with_theme(&theme)
        .with_prompt("Chrome User Data Directory")
        .default(current.chrome_user_data_dir.to_string_lossy().to_string())
        .interact_text()
        .context("Failed to read Chrome user data directory")?;

    let config = Config {
        saml_provider_url,
        saml_principal_arn,
        saml_acs_url,
        sso_region,
        session_duration_seconds,
        reload_before_seconds,
        browser_timeout_seconds,
        chrome_user_data_dir: PathBuf::from(chrome_user_data_dir),
    };

    save(profile, &config).await?;

    println!("\nConfiguration saved successfully.");
    Ok(())
}

fn get_config_path() -> Result<PathBuf> {
    constants::get_aws_config_path().context("Failed to determine AWS config path")
}
