use chrono::{DateTime, Local, TimeDelta};
use tracing::{debug, info};

use crate::{
    aws::{
        Credentials,
        sts::{IdentityApi, Probe},
    },
    error::Result,
};

/// Whether a cached credential can be handed out again.
///
/// A missing record, a record without expiry, or a token STS reports as
/// expired are plain cache misses. Any other probe failure is returned as an
/// error rather than silently renewed.
pub async fn is_usable(
    record: Option<&Credentials>,
    reload_before_seconds: i64,
    api: &dyn IdentityApi,
) -> Result<bool> {
    let Some(record) = record else {
        return Ok(false);
    };
    let Some(expiration) = record.expiration else {
        debug!("Cached credential has no expiry, renewing");
        return Ok(false);
    };

    if api.probe_identity(record).await? == Probe::Expired {
        info!("Cached credential has expired");
        return Ok(false);
    }

    let renew = reload_before_expiry(expiration, reload_before_seconds, Local::now());
    if renew {
        info!(
            "Cached credential expires within {}s, renewing",
            reload_before_seconds
        );
    }
    Ok(!renew)
}

/// True when no more than `reload_before_seconds` remain before `expiration`.
///
/// A credential sitting exactly on the margin is renewed.
pub fn reload_before_expiry(
    expiration: DateTime<Local>,
    reload_before_seconds: i64,
    now: DateTime<Local>,
) -> bool {
    expiration.signed_duration_since(now) <= TimeDelta::seconds(reload_before_seconds)
}
