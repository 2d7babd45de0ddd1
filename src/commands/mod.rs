pub mod clear_cache;
pub mod completions;
pub mod configure;
pub mod saml;
pub mod specific;

pub use clear_cache::ClearCacheCommand;
pub use completions::CompletionsCommand;
pub use configure::ConfigureCommand;
pub use saml::SamlCommand;
pub use specific::SpecificCommand;

use anyhow::{Context, Result};

use crate::{
    aws::credentials::{CredentialSink, ProfileSink, StdoutSink},
    cli::ExchangeArgs,
    error::Error,
};

/// Sink chosen by `--store-profile`
fn sink_for(args: &ExchangeArgs) -> Result<Box<dyn CredentialSink>> {
    if !args.store_profile {
        return Ok(Box::new(StdoutSink));
    }
    let section = match args.cfg_section.as_deref() {
        Some(section) if !section.is_empty() => section,
        _ => return Err(Error::MissingSectionName.into()),
    };
    let sink = ProfileSink::for_section(section).context("Failed to locate AWS credentials file")?;
    Ok(Box::new(sink))
}
