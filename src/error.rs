use std::{path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure kinds surfaced by the credential lifecycle.
///
/// Callers match on the variant; messages are for humans only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("a config section name must be provided when storing credentials in a profile")]
    MissingSectionName,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("environment variable {0} is not set")]
    MissingEnvVar(&'static str),

    #[error("cannot open credential lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot acquire credential lock {} within {timeout:?}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("OS secret store failed for {role}: {source}")]
    SecretStore {
        role: String,
        #[source]
        source: keyring::Error,
    },

    #[error("cached credential for {role} is corrupted, run `aws-cli-auth clear-cache`: {source}")]
    CorruptedCache {
        role: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize credential: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("role index {}: {message}", path.display())]
    Index { path: PathBuf, message: String },

    #[error("failed to clear {} cached credential(s): {}", failures.len(), failed_roles(failures))]
    ClearAll {
        failures: Vec<(String, keyring::Error)>,
    },

    #[error("timed out after {0:?} waiting for the identity provider, check the IdP login or your network")]
    CaptureTimeout(Duration),

    #[error("browser automation failed: {0}")]
    Browser(String),

    #[error("failed to assume role {role}: {source}")]
    Assume {
        role: String,
        #[source]
        source: BoxError,
    },

    #[error("the previous credential is invalid: {0}")]
    Probe(#[source] BoxError),

    #[error("malformed role-credential payload: {0}")]
    RolePayload(#[source] serde_json::Error),

    #[error("SAML response: {0}")]
    Saml(String),

    #[error("cannot write credentials: {0}")]
    Sink(String),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn assume(role: &str, source: impl Into<BoxError>) -> Self {
        Self::Assume {
            role: role.to_string(),
            source: source.into(),
        }
    }
}

fn failed_roles(failures: &[(String, keyring::Error)]) -> String {
    failures
        .iter()
        .map(|(role, err)| format!("{role} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}
