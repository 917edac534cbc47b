use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ingest_bench_core::prelude::{
    sleep_or_shutdown, DelegatedShutdownListener, ShutdownHandle, TeardownError, TeardownStack,
    DEFAULT_RETRY_INTERVAL,
};
use ingest_bench_instruments::{
    load_pipeline_sources, rank_processors, CollectorConfig, IngestStats, MetricsCollector,
    MetricsSink,
};
use ingest_bench_summary_model::{BenchReport, BenchmarkMetadata, MetadataInfo, RunInfo};

use crate::cli::BenchCli;
use crate::completion::CompletionWaiter;
use crate::context::{create_run_id, ServiceContext};
use crate::corpus::{generate_corpus, load_assets, CorpusGenerator, GeneratorFactory};
use crate::fleet::FleetApi;
use crate::locations::service_logs_dir;
use crate::package::{
    data_stream_path, find_policy_template_for_input, read_data_stream_manifest,
    read_package_manifest, select_policy_template_by_name, DataStreamManifest, PackageManifest,
};
use crate::progress::start_progress;
use crate::provision::{BenchTarget, Provisioned, Provisioner, Rollback};
use crate::report::{build_report, render_human, write_report};
use crate::scenario::{benchmark_dir, read_scenario, Scenario};
use crate::service::{ServiceDeployer, ServiceDeployers};
use crate::shutdown::start_shutdown_listener;

/// The collaborators a benchmark run talks to.
#[derive(Clone)]
pub struct BenchServices {
    pub fleet: Arc<dyn FleetApi>,
    pub ingest: Arc<dyn IngestStats>,
    pub generators: Arc<dyn GeneratorFactory>,
    pub deployers: ServiceDeployers,
    /// Where metrics samples are published, if anywhere
    pub metrics_sink: Option<Arc<dyn MetricsSink>>,
}

/// Final outcome of a failed benchmark.
///
/// Teardown always runs, so a teardown failure is reported next to the failure that ended the
/// run rather than in place of it.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("benchmark setup failed: {0:#}")]
    Setup(anyhow::Error),
    #[error("benchmark run failed: {0:#}")]
    Run(anyhow::Error),
    #[error("benchmark teardown failed: {0}")]
    Teardown(#[source] TeardownError),
    #[error("{run:#}, and then benchmark teardown failed: {teardown}")]
    RunAndTeardown {
        run: anyhow::Error,
        teardown: TeardownError,
    },
}

impl BenchError {
    /// The error that ended the setup or run phase, if any.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            BenchError::Setup(e) | BenchError::Run(e) => Some(e),
            BenchError::RunAndTeardown { run, .. } => Some(run),
            BenchError::Teardown(_) => None,
        }
    }

    pub fn teardown(&self) -> Option<&TeardownError> {
        match self {
            BenchError::Teardown(e) | BenchError::RunAndTeardown { teardown: e, .. } => Some(e),
            _ => None,
        }
    }

    fn into_cause(self) -> anyhow::Error {
        match self {
            BenchError::Setup(e) => e.context("benchmark setup failed"),
            BenchError::Run(e) => e.context("benchmark run failed"),
            BenchError::RunAndTeardown { run, .. } => run,
            BenchError::Teardown(e) => e.into(),
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct BenchOutcome {
    pub report: BenchReport,
    /// The report rendered as tables
    pub human: String,
    /// Where the JSON report was written, if an output directory was configured
    pub report_path: Option<PathBuf>,
}

/// Run a benchmark and print its report.
pub fn run(cli: BenchCli, services: BenchServices) -> anyhow::Result<BenchReport> {
    log::info!("Running benchmark: {}", cli.benchmark);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let logs_dir = service_logs_dir()?;

    let outcome = runtime.block_on(run_benchmark(&cli, &services, &shutdown_handle, &logs_dir))?;

    println!("{}", outcome.human);
    if let Some(path) = &outcome.report_path {
        log::info!("Report written to {}", path.display());
    }

    Ok(outcome.report)
}

/// Set up, run and tear down one benchmark.
///
/// Teardown runs whatever happened before it, including an interrupt through `shutdown`.
pub async fn run_benchmark(
    cli: &BenchCli,
    services: &BenchServices,
    shutdown: &ShutdownHandle,
    logs_dir: &Path,
) -> Result<BenchOutcome, BenchError> {
    let provisioner = Provisioner::new(services.fleet.clone(), services.ingest.clone());
    let mut teardown = TeardownStack::new();
    let mut listener = shutdown.new_listener();

    let result = match set_up(
        cli,
        services,
        &provisioner,
        logs_dir,
        &mut teardown,
        &mut listener,
    )
    .await
    {
        Ok(prepared) => execute(
            cli,
            services,
            &provisioner,
            prepared,
            &mut teardown,
            &mut listener,
        )
        .await
        .map_err(BenchError::Run),
        Err(e) => Err(BenchError::Setup(e)),
    };

    if let Err(e) = &result {
        log::error!("Benchmark failed: {e}");
    }

    if !cli.defer_cleanup.is_zero() {
        log::info!(
            "Waiting for {} before tearing down...",
            humantime::format_duration(cli.defer_cleanup)
        );
        if sleep_or_shutdown(cli.defer_cleanup, &mut listener)
            .await
            .is_err()
        {
            log::info!("Deferred cleanup interrupted");
        }
    }

    log::debug!("Tearing down {} benchmark resource(s)...", teardown.len());
    let provisioner = &provisioner;
    let teardown_result = teardown
        .unwind(move |action| provisioner.rollback(action))
        .await;

    match (result, teardown_result) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(teardown)) => Err(BenchError::Teardown(teardown)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown)) => Err(BenchError::RunAndTeardown {
            run: e.into_cause(),
            teardown,
        }),
    }
}

/// The state handed from setup to the run phase.
struct Prepared {
    ctx: ServiceContext,
    scenario: Scenario,
    package: PackageManifest,
    generator: Option<Box<dyn CorpusGenerator>>,
    deployer: Option<Arc<dyn ServiceDeployer>>,
    provisioned: Provisioned,
}

async fn set_up(
    cli: &BenchCli,
    services: &BenchServices,
    provisioner: &Provisioner,
    logs_dir: &Path,
    teardown: &mut TeardownStack<Rollback>,
    shutdown: &mut DelegatedShutdownListener,
) -> anyhow::Result<Prepared> {
    let ctx = ServiceContext::new(create_run_id(), logs_dir);
    log::info!("Benchmark run ID: {}", ctx.run_id);

    let bench_dir = benchmark_dir(&cli.package_root);
    let scenario = read_scenario(&bench_dir, &cli.benchmark, &ctx)?;

    let package = read_package_manifest(&cli.package_root)?;
    let data_stream = if package.is_input_package() {
        DataStreamManifest::default()
    } else {
        read_data_stream_manifest(&cli.package_root, &scenario.data_stream.name)?
    };

    let generator = match &scenario.corpora.generator {
        Some(config) => {
            let assets = load_assets(config, &bench_dir)?;
            Some(
                services
                    .generators
                    .create(assets)
                    .context("Can't create corpus generator")?,
            )
        }
        None => None,
    };

    let deployer = match &scenario.corpora.input_service {
        Some(_) => Some(services.deployers.get(scenario.deployer.as_deref())?),
        None => None,
    };

    let template_name = if scenario.policy_template.is_empty() {
        find_policy_template_for_input(&package, &data_stream, &scenario.input)?
    } else {
        scenario.policy_template.clone()
    };
    let policy_template = select_policy_template_by_name(&package.policy_templates, &template_name)?;

    let provisioned = provisioner
        .set_up(
            &cli.benchmark,
            &BenchTarget {
                package: &package,
                policy_template,
                data_stream: &data_stream,
                scenario: &scenario,
            },
            teardown,
            shutdown,
        )
        .await?;

    Ok(Prepared {
        ctx,
        scenario,
        package,
        generator,
        deployer,
        provisioned,
    })
}

async fn execute(
    cli: &BenchCli,
    services: &BenchServices,
    provisioner: &Provisioner,
    prepared: Prepared,
    teardown: &mut TeardownStack<Rollback>,
    shutdown: &mut DelegatedShutdownListener,
) -> anyhow::Result<BenchOutcome> {
    let Prepared {
        mut ctx,
        scenario,
        package,
        generator,
        deployer,
        provisioned,
    } = prepared;

    let sources = load_pipeline_sources(
        &data_stream_path(&cli.package_root, &scenario.data_stream.name),
        &provisioned.pipeline_prefix,
    )?;

    let collector = MetricsCollector::new(
        services.ingest.clone(),
        services.metrics_sink.clone(),
        CollectorConfig {
            interval: cli.metrics_interval,
            data_stream: provisioned.data_stream.clone(),
            pipeline_prefix: provisioned.pipeline_prefix.clone(),
            warmup: scenario.warmup_time_period,
            metadata: BenchmarkMetadata {
                info: MetadataInfo {
                    benchmark: cli.benchmark.clone(),
                    run_id: ctx.run_id.clone(),
                },
                parameters: scenario.parameters(),
            },
        },
    );
    collector.start().await?;

    let applied = apply_load(
        cli,
        services,
        provisioner,
        &mut ctx,
        &scenario,
        generator,
        deployer,
        &provisioned,
        teardown,
        shutdown,
    )
    .await;

    collector.stop().await;
    let corpus_file = applied?;

    let summary = collector.summarize()?;
    let rankings = rank_processors(
        &summary.ingest_pipeline_stats,
        &sources,
        cli.num_top_procs,
    )?;

    let report = build_report(
        RunInfo {
            benchmark: cli.benchmark.clone(),
            description: scenario.description.clone(),
            run_id: ctx.run_id.clone(),
            package: package.name.clone(),
            generated_corpora_file: corpus_file
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ..Default::default()
        },
        scenario.parameters(),
        &summary,
        rankings,
    );
    let human = render_human(&report);
    let report_path = cli
        .report_output_dir
        .as_deref()
        .map(|dir| write_report(&report, dir))
        .transpose()?;

    Ok(BenchOutcome {
        report,
        human,
        report_path,
    })
}

/// Start the input service and produce the corpus, then wait for the run to complete.
///
/// Returns the path of the generated corpus, if any.
#[allow(clippy::too_many_arguments)]
async fn apply_load(
    cli: &BenchCli,
    services: &BenchServices,
    provisioner: &Provisioner,
    ctx: &mut ServiceContext,
    scenario: &Scenario,
    generator: Option<Box<dyn CorpusGenerator>>,
    deployer: Option<Arc<dyn ServiceDeployer>>,
    provisioned: &Provisioned,
    teardown: &mut TeardownStack<Rollback>,
    shutdown: &mut DelegatedShutdownListener,
) -> anyhow::Result<Option<PathBuf>> {
    let service = match (&scenario.corpora.input_service, deployer) {
        (Some(input_service), Some(deployer)) => {
            ctx.name = input_service.name.clone();
            Some(
                provisioner
                    .start_service(deployer.as_ref(), ctx, teardown)
                    .await?,
            )
        }
        _ => None,
    };

    let mut corpus_file = None;
    if let Some(generator) = generator {
        shutdown.check()?;
        log::debug!("generating corpus data...");
        let corpus = generate_corpus(generator, ctx.logs.local.clone()).await?;
        teardown.register(Rollback::RemoveCorpusFile(corpus.path.clone()));
        log::info!(
            "Generated {} documents in {}",
            corpus.documents,
            corpus.path.display()
        );
        corpus_file = Some(corpus.path);
    }

    if let (Some(service), Some(signal)) = (
        &service,
        scenario
            .corpora
            .input_service
            .as_ref()
            .and_then(|s| s.signal.as_deref()),
    ) {
        log::debug!("sending signal {signal} to service...");
        service
            .signal(signal)
            .await
            .with_context(|| format!("failed to notify benchmark service with signal {signal}"))?;
    }

    let progress = ShutdownHandle::new();
    if let Some(period) = scenario.benchmark_time_period {
        if !cli.no_progress {
            start_progress(period, progress.new_listener())?;
        }
    }

    let waiter = CompletionWaiter {
        ingest: services.ingest.clone(),
        data_stream: provisioned.data_stream.clone(),
        benchmark_period: scenario.benchmark_time_period,
        timeout: scenario.wait_for_data_timeout,
        retry_interval: DEFAULT_RETRY_INTERVAL,
    };
    let completion = waiter.wait(shutdown).await;
    progress.shutdown();

    log::info!("Benchmark completed: {:?}", completion?);

    Ok(corpus_file)
}
