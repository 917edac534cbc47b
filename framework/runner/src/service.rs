use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::context::ServiceContext;

/// Deployer used when a scenario does not name one.
pub const DEFAULT_DEPLOYER: &str = "docker";

/// Starts the input service that produces the benchmark load.
#[async_trait]
pub trait ServiceDeployer: Send + Sync {
    async fn set_up(&self, ctx: &ServiceContext) -> anyhow::Result<Arc<dyn DeployedService>>;
}

/// A running input service.
#[async_trait]
pub trait DeployedService: Send + Sync {
    /// The context as completed by the deployer, with hostname and ports filled in.
    fn context(&self) -> ServiceContext;

    async fn signal(&self, name: &str) -> anyhow::Result<()>;

    async fn tear_down(&self) -> anyhow::Result<()>;
}

/// The service deployers available to a run, by name.
#[derive(Clone, Default)]
pub struct ServiceDeployers {
    deployers: BTreeMap<String, Arc<dyn ServiceDeployer>>,
}

impl ServiceDeployers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, deployer: Arc<dyn ServiceDeployer>) -> Self {
        self.deployers.insert(name.into(), deployer);
        self
    }

    pub fn get(&self, name: Option<&str>) -> anyhow::Result<Arc<dyn ServiceDeployer>> {
        let name = name.unwrap_or(DEFAULT_DEPLOYER);
        self.deployers
            .get(name)
            .cloned()
            .with_context(|| format!("No service deployer available for '{name}'"))
    }
}
