#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingest_bench_runner::prelude::{
    Agent, AgentHost, AgentMetadata, BenchCli, BenchServices, CorpusGenerator, CorpusTarget,
    DeployedService, Emit, FleetApi, GeneratorAssets, GeneratorFactory, IngestStats,
    PackagePolicy, Policy, ServiceContext, ServiceDeployer, ServiceDeployers,
};
use ingest_bench_summary_model::{
    DataStreamStats, DiskUsage, NodePipelineStats, NodeStats, NodesStats, PipelineStats,
    PipelineStatsMap, ProcessorStats, StatsRecord,
};
use parking_lot::Mutex;

pub const PIPELINE_PREFIX: &str = "logs-nginx.access-1.2.0";
pub const DATA_STREAM: &str = "logs-nginx.access-ep";

const PACKAGE_MANIFEST: &str = r#"name: nginx
title: Nginx
version: 1.2.0
policy_templates:
  - name: nginx
    data_streams: [access]
    inputs:
      - type: logfile
"#;

const DATA_STREAM_MANIFEST: &str = r#"title: Nginx access logs
type: logs
streams:
  - input: logfile
    vars:
      - name: paths
        type: text
        default: [/var/log/nginx/access.log*]
"#;

const DEFAULT_PIPELINE: &str = r#"description: Pipeline for nginx access logs
processors:
  - set:
      field: ecs.version
      value: "8.11.0"
  - grok:
      field: message
      patterns:
        - "%{IP:source.ip} %{GREEDYDATA:rest}"
  - pipeline:
      name: logs-nginx.access-1.2.0-third-party
  - remove:
      field: message
"#;

const GENERATOR_SCENARIO: &str = r#"description: 100 nginx access logs
input: logfile
data_stream:
  name: access
  vars:
    paths:
      - "{{SERVICE_LOGS_DIR}}/corpus-*"
corpora:
  generator:
    total_events: 100
    template:
      path: ./access.tpl
    fields:
      path: ./fields.yml
"#;

const SERVICE_SCENARIO: &str = r#"input: logfile
deployer: docker
data_stream:
  name: access
corpora:
  input_service:
    name: nginx-svc
    signal: SIGHUP
"#;

const BAD_DEPLOYER_SCENARIO: &str = r#"input: logfile
deployer: nomad
data_stream:
  name: access
"#;

/// Write an integration package with one data stream and its benchmark scenarios.
pub fn package_fixture(root: &Path) {
    let write = |relative: &str, content: &str| {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    };

    write("manifest.yml", PACKAGE_MANIFEST);
    write("data_stream/access/manifest.yml", DATA_STREAM_MANIFEST);
    write(
        "data_stream/access/elasticsearch/ingest_pipeline/default.yml",
        DEFAULT_PIPELINE,
    );
    write("_dev/benchmark/system/access-benchmark.yml", GENERATOR_SCENARIO);
    write("_dev/benchmark/system/access.tpl", "{{.source.ip}} GET /");
    write(
        "_dev/benchmark/system/fields.yml",
        "- name: source.ip\n  type: ip\n",
    );
    write("_dev/benchmark/system/service-benchmark.yml", SERVICE_SCENARIO);
    write("_dev/benchmark/system/bad-deployer.yml", BAD_DEPLOYER_SCENARIO);
}

pub fn cli(package_root: &Path, benchmark: &str) -> BenchCli {
    BenchCli {
        package_root: package_root.to_path_buf(),
        benchmark: benchmark.to_string(),
        metrics_interval: Duration::from_secs(1),
        defer_cleanup: Duration::ZERO,
        num_top_procs: 2,
        report_output_dir: None,
        no_progress: true,
    }
}

/// Mutations observed by the fakes, in call order.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn agent(id: &str) -> Agent {
    Agent {
        id: id.to_string(),
        policy_id: "default-policy".to_string(),
        policy_revision: 2,
        local_metadata: AgentMetadata {
            host: AgentHost {
                name: "elastic-agent".to_string(),
            },
        },
    }
}

#[derive(Default)]
pub struct FakeFleet {
    pub journal: Journal,
    pub agents: Vec<Agent>,
    pub fail_delete_package_policy: bool,
    pub package_policy: Mutex<Option<PackagePolicy>>,
}

impl FakeFleet {
    /// The agent running the fleet server, never a benchmark target.
    pub fn fleet_server_agent() -> Agent {
        Agent {
            policy_id: "fleet-server-policy".to_string(),
            ..agent("fleet-server")
        }
    }
}

#[async_trait]
impl FleetApi for FakeFleet {
    async fn create_policy(&self, policy: &Policy) -> anyhow::Result<Policy> {
        self.journal.lock().push("create_policy".to_string());
        Ok(Policy {
            id: "policy-1".to_string(),
            revision: 1,
            ..policy.clone()
        })
    }

    async fn delete_policy(&self, policy: &Policy) -> anyhow::Result<()> {
        self.journal
            .lock()
            .push(format!("delete_policy {}", policy.id));
        Ok(())
    }

    async fn get_policy(&self, policy_id: &str) -> anyhow::Result<Policy> {
        Ok(Policy {
            id: policy_id.to_string(),
            package_policies: self.package_policy.lock().iter().cloned().collect(),
            ..Default::default()
        })
    }

    async fn add_package_policy(
        &self,
        package_policy: &PackagePolicy,
    ) -> anyhow::Result<PackagePolicy> {
        self.journal.lock().push("add_package_policy".to_string());
        let created = PackagePolicy {
            id: "package-policy-1".to_string(),
            ..package_policy.clone()
        };
        *self.package_policy.lock() = Some(created.clone());
        Ok(created)
    }

    async fn delete_package_policy(&self, package_policy: &PackagePolicy) -> anyhow::Result<()> {
        self.journal
            .lock()
            .push(format!("delete_package_policy {}", package_policy.id));
        if self.fail_delete_package_policy {
            anyhow::bail!("package policy is locked");
        }
        Ok(())
    }

    async fn list_agents(&self) -> anyhow::Result<Vec<Agent>> {
        Ok(self.agents.clone())
    }

    async fn assign_policy(&self, agent: &Agent, policy: &Policy) -> anyhow::Result<()> {
        self.journal
            .lock()
            .push(format!("assign_policy {} {}", agent.id, policy.id));
        Ok(())
    }
}

/// An in-memory cluster that ingests 100 documents once the baseline has been sampled.
///
/// The documents appear on the first node stats call, which is part of the baseline capture.
#[derive(Default)]
pub struct FakeCluster {
    pub journal: Journal,
    /// Old documents that can never be deleted
    pub never_cleared: bool,
    /// The load never reaches the data stream
    pub never_loaded: bool,
    loaded: AtomicBool,
    pipeline_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn never_cleared() -> Self {
        Self {
            never_cleared: true,
            ..Default::default()
        }
    }

    pub fn never_loaded() -> Self {
        Self {
            never_loaded: true,
            ..Default::default()
        }
    }
}

fn record(count: i64, time_in_millis: i64) -> StatsRecord {
    StatsRecord {
        count,
        time_in_millis,
        ..Default::default()
    }
}

fn processor(processor_type: &str, count: i64, time_in_millis: i64) -> ProcessorStats {
    ProcessorStats {
        processor_type: processor_type.to_string(),
        stats: record(count, time_in_millis),
        ..Default::default()
    }
}

#[async_trait]
impl IngestStats for FakeCluster {
    async fn pipeline_stats_by_prefix(&self, prefix: &str) -> anyhow::Result<NodePipelineStats> {
        let stats = if self.pipeline_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            PipelineStats {
                stats: record(10, 8),
                processors: vec![
                    processor("set", 10, 1),
                    processor("grok", 10, 5),
                    processor("pipeline", 10, 0),
                    processor("remove", 10, 2),
                ],
            }
        } else {
            PipelineStats {
                stats: record(110, 88),
                processors: vec![
                    processor("set", 110, 11),
                    processor("grok", 110, 55),
                    processor("pipeline", 110, 60),
                    processor("remove", 110, 22),
                ],
            }
        };

        Ok(NodePipelineStats::from([(
            "node-1".to_string(),
            PipelineStatsMap::from([(prefix.to_string(), stats)]),
        )]))
    }

    async fn nodes_stats(&self) -> anyhow::Result<NodesStats> {
        if !self.never_loaded {
            self.loaded.store(true, Ordering::SeqCst);
        }
        Ok(NodesStats {
            cluster_name: "bench".to_string(),
            nodes: BTreeMap::from([(
                "node-1".to_string(),
                NodeStats {
                    name: "es-1".to_string(),
                    ..Default::default()
                },
            )]),
        })
    }

    async fn data_stream_stats(
        &self,
        data_stream: &str,
    ) -> anyhow::Result<Option<DataStreamStats>> {
        Ok(Some(DataStreamStats {
            data_stream: data_stream.to_string(),
            backing_indices: 1,
            store_size_bytes: 4096,
            ..Default::default()
        }))
    }

    async fn disk_usage(&self, data_stream: &str) -> anyhow::Result<BTreeMap<String, DiskUsage>> {
        Ok(BTreeMap::from([(
            format!(".ds-{data_stream}-000001"),
            DiskUsage::default(),
        )]))
    }

    async fn delete_by_query(&self, data_stream: &str) -> anyhow::Result<()> {
        self.journal
            .lock()
            .push(format!("delete_by_query {data_stream}"));
        Ok(())
    }

    async fn count_docs(&self, _data_stream: &str) -> anyhow::Result<u64> {
        if self.never_cleared {
            return Ok(7);
        }
        Ok(if self.loaded.load(Ordering::SeqCst) {
            100
        } else {
            0
        })
    }
}

/// Creates generators of `total_events` numbered documents.
#[derive(Default)]
pub struct FakeGenerators {
    pub created: Mutex<Vec<GeneratorAssets>>,
}

impl GeneratorFactory for FakeGenerators {
    fn create(&self, assets: GeneratorAssets) -> anyhow::Result<Box<dyn CorpusGenerator>> {
        let CorpusTarget::Events(total) = assets.target else {
            anyhow::bail!("only event counts are supported");
        };
        self.created.lock().push(assets);
        Ok(Box::new(FakeGenerator { emitted: 0, total }))
    }
}

struct FakeGenerator {
    emitted: u64,
    total: u64,
}

impl CorpusGenerator for FakeGenerator {
    fn emit(&mut self, sink: &mut Vec<u8>) -> anyhow::Result<Emit> {
        if self.emitted == self.total {
            return Ok(Emit::Exhausted);
        }
        self.emitted += 1;
        sink.extend_from_slice(format!("10.0.0.{} GET /", self.emitted).as_bytes());
        Ok(Emit::Event)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct FakeDeployer {
    pub journal: Journal,
}

#[async_trait]
impl ServiceDeployer for FakeDeployer {
    async fn set_up(&self, ctx: &ServiceContext) -> anyhow::Result<Arc<dyn DeployedService>> {
        self.journal.lock().push(format!("set_up {}", ctx.name));
        Ok(Arc::new(FakeService {
            journal: self.journal.clone(),
            ctx: ServiceContext {
                name: ctx.name.clone(),
                hostname: format!("{}-host", ctx.name),
                ports: vec![8080],
                ..Default::default()
            },
        }))
    }
}

struct FakeService {
    journal: Journal,
    ctx: ServiceContext,
}

#[async_trait]
impl DeployedService for FakeService {
    fn context(&self) -> ServiceContext {
        self.ctx.clone()
    }

    async fn signal(&self, name: &str) -> anyhow::Result<()> {
        self.journal.lock().push(format!("signal {name}"));
        Ok(())
    }

    async fn tear_down(&self) -> anyhow::Result<()> {
        self.journal
            .lock()
            .push(format!("tear_down {}", self.ctx.name));
        Ok(())
    }
}

pub struct Fakes {
    pub journal: Journal,
    pub fleet: Arc<FakeFleet>,
    pub cluster: Arc<FakeCluster>,
    pub generators: Arc<FakeGenerators>,
}

impl Fakes {
    pub fn new(fleet: FakeFleet, cluster: FakeCluster) -> Self {
        let journal = Journal::default();
        Self {
            fleet: Arc::new(FakeFleet {
                journal: journal.clone(),
                ..fleet
            }),
            cluster: Arc::new(FakeCluster {
                journal: journal.clone(),
                ..cluster
            }),
            generators: Arc::new(FakeGenerators::default()),
            journal,
        }
    }

    /// One enrolled agent and a well-behaved cluster.
    pub fn healthy() -> Self {
        Self::new(
            FakeFleet {
                agents: vec![agent("agent-1")],
                ..Default::default()
            },
            FakeCluster::default(),
        )
    }

    pub fn services(&self) -> BenchServices {
        BenchServices {
            fleet: self.fleet.clone(),
            ingest: self.cluster.clone(),
            generators: self.generators.clone(),
            deployers: ServiceDeployers::new().with(
                "docker",
                Arc::new(FakeDeployer {
                    journal: self.journal.clone(),
                }),
            ),
            metrics_sink: None,
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }
}
