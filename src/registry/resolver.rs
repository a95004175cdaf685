//! Name-resolution collaborator used to locate the registry contracts.

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::FeedError;

/// Addresses of the three watched registry contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryContracts {
    pub agent_registry: Address,
    pub scanner_registry: Address,
    pub dispatch: Address,
}

/// Resolves the registry contract addresses, typically through an ENS-style name
/// service. Implementations live outside this crate.
#[async_trait]
pub trait RegistryResolver: Send + Sync {
    async fn resolve_registry_contracts(&self) -> Result<RegistryContracts, FeedError>;
}

/// Resolver backed by a fixed address set, for deployments with known addresses and for
/// tests.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    contracts: RegistryContracts,
}

impl StaticResolver {
    pub fn new(contracts: RegistryContracts) -> Self {
        Self { contracts }
    }
}

#[async_trait]
impl RegistryResolver for StaticResolver {
    async fn resolve_registry_contracts(&self) -> Result<RegistryContracts, FeedError> {
        Ok(self.contracts)
    }
}
