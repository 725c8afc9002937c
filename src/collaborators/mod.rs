//! External collaborator services
//!
//! The core consumes three contracts: a content generator (plans and
//! code), an execution sandbox, and a dataset discovery service. HTTP
//! implementations live here; the engine only sees the traits.

mod client;
mod discovery;
mod generator;
mod sandbox;
mod types;

pub use discovery::HttpDiscovery;
pub use generator::HttpGenerator;
pub use sandbox::HttpSandbox;
pub use types::{
    CollaboratorError, ContentGenerator, DatasetCandidate, DiscoveryService, ExecutionOutcome,
    ExecutionSandbox, GenerationKind,
};

use crate::config::AutodsConfig;
use std::sync::Arc;

/// The full set of collaborators the engine needs
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ContentGenerator>,
    pub sandbox: Arc<dyn ExecutionSandbox>,
    pub discovery: Arc<dyn DiscoveryService>,
}

impl Collaborators {
    /// Build HTTP collaborators from configuration
    pub fn from_config(config: &AutodsConfig) -> Self {
        Self {
            generator: Arc::new(HttpGenerator::from_config(
                "generator",
                &config.collaborators.generator,
            )),
            sandbox: Arc::new(HttpSandbox::from_config(
                "sandbox",
                &config.collaborators.sandbox,
            )),
            discovery: Arc::new(HttpDiscovery::from_config(
                "discovery",
                &config.collaborators.discovery,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_configured_names() {
        let config = AutodsConfig::default();
        let collaborators = Collaborators::from_config(&config);

        assert_eq!(collaborators.generator.name(), "generator");
        assert_eq!(collaborators.sandbox.name(), "sandbox");
        assert_eq!(collaborators.discovery.name(), "discovery");
    }
}
