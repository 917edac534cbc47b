mod cli;
mod completion;
mod context;
mod corpus;
mod fleet;
mod init;
mod locations;
mod package;
mod progress;
mod provision;
mod report;
mod run;
mod scenario;
mod service;
mod shutdown;

pub mod prelude {
    pub use crate::cli::BenchCli;
    pub use crate::completion::{Completion, CompletionError, CompletionWaiter};
    pub use crate::context::{create_run_id, LogsFolders, ServiceContext};
    pub use crate::corpus::{
        generate_corpus, load_assets, parse_size, CorpusFile, CorpusGenerator, CorpusTarget, Emit,
        GeneratorAssets, GeneratorFactory, TemplateType,
    };
    pub use crate::fleet::{
        filter_agents, Agent, AgentHost, AgentMetadata, FleetApi, PackagePolicy, Policy,
        BENCH_NAMESPACE,
    };
    pub use crate::init::init;
    pub use crate::locations::{service_logs_dir, AGENT_SERVICE_LOGS_DIR, BENCH_SERVICE_LOGS_DIR_ENV};
    pub use crate::package::{
        find_policy_template_for_input, read_data_stream_manifest, read_package_manifest,
        DataStreamManifest, PackageManifest, PolicyTemplate,
    };
    pub use crate::provision::{
        BenchTarget, Provisioned, Provisioner, Rollback, AGENT_ENROLLMENT_TIMEOUT,
        CLEAR_DATA_TIMEOUT,
    };
    pub use crate::report::{build_report, render_human, write_report, REPORT_FILE};
    pub use crate::run::{run, run_benchmark, BenchError, BenchOutcome, BenchServices};
    pub use crate::scenario::{
        benchmark_dir, discover_scenarios, read_scenario, read_scenario_static, Scenario,
        ScenarioError, BENCHMARK_DEV_PATH,
    };
    pub use crate::service::{DeployedService, ServiceDeployer, ServiceDeployers, DEFAULT_DEPLOYER};

    pub use ingest_bench_core::prelude::{ShutdownHandle, ShutdownSignalError, TeardownError};
    pub use ingest_bench_instruments::{IngestStats, MetricsSink};
    pub use ingest_bench_summary_model::BenchReport;
}
