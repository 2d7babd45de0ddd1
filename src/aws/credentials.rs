use std::path::PathBuf;

use async_trait::async_trait;
use ini::Ini;
use tokio::fs;
use tracing::{debug, info};

use super::Credentials;
use crate::{
    constants,
    error::{Error, Result},
};

/// Where an obtained credential ends up
#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn emit(&self, creds: &Credentials) -> Result<()>;
}

/// Prints the `credential_process` JSON document on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl CredentialSink for StdoutSink {
    async fn emit(&self, creds: &Credentials) -> Result<()> {
        println!("{}", process_json(creds)?);
        Ok(())
    }
}

/// `credential_process` JSON for `creds`
pub fn process_json(creds: &Credentials) -> Result<String> {
    serde_json::to_string_pretty(&creds.process_output()).map_err(Error::Serialize)
}

/// Writes a named section of the shared AWS credentials file
#[derive(Debug, Clone)]
pub struct ProfileSink {
    path: PathBuf,
    section: String,
}

impl ProfileSink {
    pub fn new(path: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            section: section.into(),
        }
    }

    /// Sink for `section` of the credentials file the AWS CLI reads
    pub fn for_section(section: impl Into<String>) -> Result<Self> {
        let path = constants::get_aws_credentials_path()
            .ok_or_else(|| Error::Sink("cannot determine AWS credentials path".to_string()))?;
        Ok(Self::new(path, section))
    }

    fn load(&self) -> Result<Ini> {
        if !self.path.exists() {
            return Ok(Ini::new());
        }
        // An unreadable file is reported rather than overwritten
        Ini::load_from_file(&self.path)
            .map_err(|e| Error::Sink(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl CredentialSink for ProfileSink {
    async fn emit(&self, creds: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut ini = self.load()?;
        // Stale keys such as an old expiry must not survive
        ini.delete(Some(self.section.as_str()));

        let mut section = ini.with_section(Some(self.section.as_str()));
        section
            .set("aws_access_key_id", &creds.access_key_id)
            .set("aws_secret_access_key", &creds.secret_access_key)
            .set("aws_session_token", &creds.session_token);
        if let Some(expiration) = creds.expiration {
            section.set("aws_session_expiration", expiration.to_rfc3339());
        }

        ini.write_to_file(&self.path)
            .map_err(|e| Error::Sink(format!("{}: {e}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&self.path).await?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o600);
            fs::set_permissions(&self.path, permissions).await?;
        }

        debug!("Wrote {}", self.path.display());
        info!("Credentials saved to profile: {}", self.section);
        Ok(())
    }
}
