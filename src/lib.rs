//! Exchange federated logins (SAML or AWS SSO) for short-lived AWS
//! credentials, cached per role in the OS secret store.

pub mod aws;
pub mod browser;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod saml;
pub mod validity;

pub use error::{Error, Result};
