//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod mock_provider;

pub use mock_provider::*;

use avalon_sale_sdk::{Amount, DeploymentRegistry, SaleClient, SaleClientBuilder, SaleConfig};
use std::sync::Arc;

/// Registry with the AVALON sale on Base Sepolia only
pub fn registry() -> DeploymentRegistry {
    [deployment()].into_iter().collect()
}

/// Client wired to `mock` with the default catalog
pub fn sale_client(mock: Arc<MockProvider>) -> SaleClient {
    SaleClientBuilder::new()
        .with_config(SaleConfig::default())
        .with_provider(mock)
        .with_deployments(registry())
        .build()
        .unwrap()
}

pub fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}
