//! Address directory: resolves aliases to canonical persona addresses.

use async_trait::async_trait;
use parley_proto::{Address, ProtocolError};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::DirectoryConfig;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// The canonical address for `address`, which may be itself.
    async fn resolve_canonical(&self, address: &Address) -> Result<Address, DirectoryError>;
}

/// Fixed alias table. Unknown addresses are their own canonical form.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    aliases: HashMap<Address, Address>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, alias: Address, canonical: Address) -> Self {
        self.aliases.insert(alias, canonical);
        self
    }

    pub fn from_config(config: &DirectoryConfig) -> Result<Self, ProtocolError> {
        let mut directory = Self::new();
        for (alias, canonical) in &config.aliases {
            directory = directory.with_alias(Address::parse(alias)?, Address::parse(canonical)?);
        }
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn resolve_canonical(&self, address: &Address) -> Result<Address, DirectoryError> {
        Ok(self
            .aliases
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aliases_resolve_and_others_pass_through() {
        let mut config = DirectoryConfig::default();
        config
            .aliases
            .insert("Al@Example.com".into(), "alice@example.com".into());
        let directory = StaticDirectory::from_config(&config).unwrap();

        let alias: Address = "al@example.com".parse().unwrap();
        let carol: Address = "carol@example.com".parse().unwrap();
        assert_eq!(
            directory.resolve_canonical(&alias).await.unwrap().as_str(),
            "alice@example.com"
        );
        assert_eq!(directory.resolve_canonical(&carol).await.unwrap(), carol);
    }

    #[test]
    fn invalid_alias_is_rejected() {
        let mut config = DirectoryConfig::default();
        config.aliases.insert("".into(), "alice@example.com".into());
        assert!(StaticDirectory::from_config(&config).is_err());
    }
}
