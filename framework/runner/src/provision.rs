use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use ingest_bench_core::prelude::{
    wait_until_true, DelegatedShutdownListener, TeardownStack, DEFAULT_RETRY_INTERVAL,
};
use ingest_bench_instruments::IngestStats;

use crate::context::ServiceContext;
use crate::fleet::{filter_agents, package_policy, Agent, FleetApi, PackagePolicy, Policy};
use crate::package::{DataStreamManifest, PackageManifest, PolicyTemplate};
use crate::scenario::Scenario;
use crate::service::{DeployedService, ServiceDeployer};

/// Longest wait for a data stream to be emptied before the benchmark.
pub const CLEAR_DATA_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Longest wait for an agent able to run the benchmark policy.
pub const AGENT_ENROLLMENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A rollback action for one provisioned resource.
pub enum Rollback {
    DeletePolicy(Policy),
    DeletePackagePolicy(PackagePolicy),
    WipeDataStream(String),
    ResetAgentPolicy { agent: Agent, original: Policy },
    ShutdownService(Arc<dyn DeployedService>),
    RemoveCorpusFile(PathBuf),
}

impl Display for Rollback {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rollback::DeletePolicy(policy) => write!(f, "delete policy {}", policy.name),
            Rollback::DeletePackagePolicy(package_policy) => {
                write!(f, "delete package policy {}", package_policy.name)
            }
            Rollback::WipeDataStream(data_stream) => write!(f, "wipe data stream {data_stream}"),
            Rollback::ResetAgentPolicy { agent, original } => {
                write!(f, "reset agent {} to policy {}", agent.id, original.id)
            }
            Rollback::ShutdownService(service) => {
                write!(f, "shut down service {}", service.context().name)
            }
            Rollback::RemoveCorpusFile(path) => write!(f, "remove corpus file {}", path.display()),
        }
    }
}

/// What a benchmark runs against.
pub struct BenchTarget<'a> {
    pub package: &'a PackageManifest,
    pub policy_template: &'a PolicyTemplate,
    pub data_stream: &'a DataStreamManifest,
    pub scenario: &'a Scenario,
}

/// The resources set up for a benchmark.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub policy: Policy,
    pub package_policy: PackagePolicy,
    /// The data stream receiving the load
    pub data_stream: String,
    /// Prefix of the ingest pipelines processing the load
    pub pipeline_prefix: String,
    pub agents: Vec<Agent>,
}

/// Brings the stack into a state where it accepts the benchmark load.
///
/// Every resource created is registered on the teardown stack right away, so a failure part way
/// through still cleans up what was created.
pub struct Provisioner {
    fleet: Arc<dyn FleetApi>,
    ingest: Arc<dyn IngestStats>,
    retry_interval: Duration,
}

impl Provisioner {
    pub fn new(fleet: Arc<dyn FleetApi>, ingest: Arc<dyn IngestStats>) -> Self {
        Self {
            fleet,
            ingest,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub async fn set_up(
        &self,
        bench_name: &str,
        target: &BenchTarget<'_>,
        teardown: &mut TeardownStack<Rollback>,
        shutdown: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<Provisioned> {
        log::debug!("creating benchmark policy...");
        let policy = self
            .fleet
            .create_policy(&Policy {
                name: format!(
                    "ep-bench-{bench_name}-{}",
                    chrono::Utc::now().format("%Y%m%dT%H:%M:%SZ")
                ),
                description: format!("policy created by ingest-bench for benchmark {bench_name}"),
                namespace: crate::fleet::BENCH_NAMESPACE.to_string(),
                monitoring_enabled: vec!["logs".to_string(), "metrics".to_string()],
                ..Default::default()
            })
            .await
            .context("could not create benchmark policy")?;
        teardown.register(Rollback::DeletePolicy(policy.clone()));

        log::debug!("adding package data stream to benchmark policy...");
        let requested = package_policy(
            &policy,
            target.package,
            target.policy_template,
            target.data_stream,
            target.scenario,
        );
        let (Some(data_stream), Some(pipeline_prefix)) =
            (requested.data_stream(), requested.pipeline_prefix())
        else {
            bail!("package policy does not configure a data stream");
        };
        let created = self
            .fleet
            .add_package_policy(&requested)
            .await
            .context("could not add data stream config to policy")?;
        teardown.register(Rollback::DeletePackagePolicy(created.clone()));

        teardown.register(Rollback::WipeDataStream(data_stream.clone()));
        self.clear_data_stream(&data_stream, shutdown).await?;

        let agents = self.enrolled_agents(shutdown).await?;
        for agent in &agents {
            teardown.register(Rollback::ResetAgentPolicy {
                agent: agent.clone(),
                original: Policy {
                    id: agent.policy_id.clone(),
                    revision: agent.policy_revision,
                    ..Default::default()
                },
            });

            let policy_with_data_stream = self
                .fleet
                .get_policy(&policy.id)
                .await
                .context("could not read the policy with data stream")?;

            log::debug!("assigning package data stream to agent {}...", agent.id);
            self.fleet
                .assign_policy(agent, &policy_with_data_stream)
                .await
                .context("could not assign policy to agent")?;
        }

        Ok(Provisioned {
            policy,
            package_policy: created,
            data_stream,
            pipeline_prefix,
            agents,
        })
    }

    /// Start the input service and fold its context into `ctx`.
    pub async fn start_service(
        &self,
        deployer: &dyn ServiceDeployer,
        ctx: &mut ServiceContext,
        teardown: &mut TeardownStack<Rollback>,
    ) -> anyhow::Result<Arc<dyn DeployedService>> {
        log::debug!("setting up service {}...", ctx.name);
        let service = deployer
            .set_up(ctx)
            .await
            .context("could not setup service")?;
        teardown.register(Rollback::ShutdownService(service.clone()));
        ctx.absorb(service.context());

        Ok(service)
    }

    /// Undo one provisioned resource.
    pub async fn rollback(&self, action: Rollback) -> anyhow::Result<()> {
        match action {
            Rollback::DeletePolicy(policy) => {
                log::debug!("deleting benchmark policy...");
                self.fleet
                    .delete_policy(&policy)
                    .await
                    .context("error cleaning up benchmark policy")
            }
            Rollback::DeletePackagePolicy(package_policy) => {
                log::debug!("deleting benchmark package policy...");
                self.fleet
                    .delete_package_policy(&package_policy)
                    .await
                    .context("error cleaning up benchmark package policy")
            }
            Rollback::WipeDataStream(data_stream) => {
                log::debug!("deleting data in data stream...");
                self.ingest
                    .delete_by_query(&data_stream)
                    .await
                    .context("error deleting data in data stream")
            }
            Rollback::ResetAgentPolicy { agent, original } => {
                log::debug!("reassigning original policy back to agent...");
                self.fleet
                    .assign_policy(&agent, &original)
                    .await
                    .with_context(|| {
                        format!("error reassigning original policy to agent {}", agent.id)
                    })
            }
            Rollback::ShutdownService(service) => {
                log::debug!("tearing down service...");
                service
                    .tear_down()
                    .await
                    .context("error tearing down service")
            }
            Rollback::RemoveCorpusFile(path) => {
                log::debug!("removing corpus file {}...", path.display());
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e).with_context(|| {
                        format!("error removing corpus file {}", path.display())
                    }),
                }
            }
        }
    }

    async fn clear_data_stream(
        &self,
        data_stream: &str,
        shutdown: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<()> {
        log::debug!("deleting old data in data stream {data_stream}...");
        self.ingest
            .delete_by_query(data_stream)
            .await
            .with_context(|| format!("error deleting old data in data stream: {data_stream}"))?;

        let cleared = wait_until_true(
            || async move { Ok::<_, anyhow::Error>(self.ingest.count_docs(data_stream).await? == 0) },
            CLEAR_DATA_TIMEOUT,
            self.retry_interval,
            shutdown,
        )
        .await
        .context("clearing previous data")?;

        if !cleared {
            bail!("unable to clear previous data");
        }

        Ok(())
    }

    async fn enrolled_agents(
        &self,
        shutdown: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<Vec<Agent>> {
        let eligible_agents = parking_lot::Mutex::new(Vec::new());
        let agents = &eligible_agents;

        let enrolled = wait_until_true(
            || async move {
                let all = self
                    .fleet
                    .list_agents()
                    .await
                    .context("could not list agents")?;
                let eligible = filter_agents(all);
                let found = !eligible.is_empty();
                *agents.lock() = eligible;
                Ok::<_, anyhow::Error>(found)
            },
            AGENT_ENROLLMENT_TIMEOUT,
            self.retry_interval,
            shutdown,
        )
        .await
        .context("agent enrollment failed")?;

        if !enrolled {
            bail!("no agent enrolled in time");
        }

        Ok(eligible_agents.into_inner())
    }
}
