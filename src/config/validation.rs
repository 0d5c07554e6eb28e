//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::defaults::MAX_FIRST_SEQ;
use super::{Config, DispatchModeConfig, StoreBackend};
use parley_proto::Address;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.domains contains an invalid domain: {0}")]
    InvalidDomain(String),
    #[error("server.resource must not be empty")]
    EmptyResource,
    #[error("server.muc_subdomain is not a valid domain label: {0}")]
    InvalidMucSubdomain(String),
    #[error("dispatch.workers must be at least 1 in sharded mode")]
    NoWorkers,
    #[error("store.path parent directory does not exist: {0}")]
    StorePathInvalid(String),
    #[error("directory.aliases has an invalid address: {0}")]
    InvalidAlias(String),
    #[error("chat.first_seq must not exceed {MAX_FIRST_SEQ}, got {0}")]
    FirstSeqTooLarge(u64),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    for domain in &config.server.domains {
        if Address::from_parts(None, domain).is_err() {
            errors.push(ValidationError::InvalidDomain(domain.clone()));
        }
    }

    if config.server.resource.trim().is_empty() {
        errors.push(ValidationError::EmptyResource);
    }

    let muc = &config.server.muc_subdomain;
    if muc.is_empty() || muc.contains('.') || Address::from_parts(None, muc).is_err() {
        errors.push(ValidationError::InvalidMucSubdomain(muc.clone()));
    }

    if config.dispatch.mode == DispatchModeConfig::Sharded && config.dispatch.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    if config.chat.first_seq > MAX_FIRST_SEQ {
        errors.push(ValidationError::FirstSeqTooLarge(config.chat.first_seq));
    }

    if config.store.backend == StoreBackend::Redb {
        let store_path = Path::new(&config.store.path);
        if let Some(parent) = store_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::StorePathInvalid(config.store.path.clone()));
        }
    }

    for (alias, canonical) in &config.directory.aliases {
        for candidate in [alias, canonical] {
            if Address::parse(candidate).is_err() {
                errors.push(ValidationError::InvalidAlias(candidate.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
