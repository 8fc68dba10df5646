use std::sync::Arc;

use crate::config::ScannerConfig;
use crate::mysql::Connector;
use crate::util::connection_pool_registry::ConnectionPoolRegistry;

/**
The state of the extension.

It is built once, when the extension is loaded, and handed to every table
function it registers. It owns the pool registry, so pools live as long as
the loaded extension and are closed when it goes away.
 */
#[derive(Debug)]
pub struct ExtensionState {
    registry: ConnectionPoolRegistry,
}

impl ExtensionState {
    pub fn new(connector: Arc<dyn Connector>, config: ScannerConfig) -> Self {
        Self {
            registry: ConnectionPoolRegistry::new(connector, config),
        }
    }

    pub fn registry(&self) -> &ConnectionPoolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScannerConfig {
        self.registry.config()
    }
}
