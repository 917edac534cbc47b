//! Loading of system benchmark scenarios.
//!
//! A scenario is a YAML document under `<package root>/_dev/benchmark/system/<name>.yml`. Before it
//! is decoded, the document is rendered as a handlebars template against the current
//! [ServiceContext]: the context fields are available as data (`{{ hostname }}`) and every
//! context alias is registered as a helper (`{{ SERVICE_LOGS_DIR }}`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use handlebars::{Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, ScopedJson};
use ingest_bench_summary_model::{
    CorporaParameters, DataStreamParameters, GeneratorParameters, InputServiceParameters,
    ScenarioParameters,
};
use serde::{Deserialize, Deserializer};
use walkdir::WalkDir;

use crate::context::ServiceContext;
use crate::corpus::parse_size;

/// Location of the scenarios, relative to the package root.
pub const BENCHMARK_DEV_PATH: &str = "_dev/benchmark/system";

/// Used when a scenario does not set `wait_for_data_timeout`.
pub const DEFAULT_WAIT_FOR_DATA_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Service deployers a scenario may name.
pub const KNOWN_DEPLOYERS: &[&str] = &["docker", "k8s", "tf"];

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("unable to find system benchmark configuration file: {}", .0.display())]
    NotFound(PathBuf),
    #[error("could not load system benchmark configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not render system benchmark configuration file {}: {reason}", .path.display())]
    Template { path: PathBuf, reason: String },
    #[error("can't unpack benchmark configuration {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(
        "invalid deployer name '{name}' in {}, expected one of [{}]",
        .path.display(),
        KNOWN_DEPLOYERS.join(", ")
    )]
    InvalidDeployer { path: PathBuf, name: String },
    #[error("invalid corpus size '{size}' in {}", .path.display())]
    InvalidSize { path: PathBuf, size: String },
}

/// One system benchmark run description. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub policy_template: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub data_stream: DataStream,
    #[serde(default, deserialize_with = "duration")]
    pub warmup_time_period: Duration,
    /// When set the benchmark runs for this long instead of until ingestion stabilizes.
    #[serde(default, deserialize_with = "optional_duration")]
    pub benchmark_time_period: Option<Duration>,
    #[serde(
        default = "default_wait_for_data_timeout",
        deserialize_with = "duration"
    )]
    pub wait_for_data_timeout: Duration,
    /// Service deployer used to start the input service
    #[serde(default)]
    pub deployer: Option<String>,
    #[serde(default)]
    pub corpora: Corpora,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DataStream {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

/// Where the benchmark load comes from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Corpora {
    pub generator: Option<Generator>,
    pub input_service: Option<InputService>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Generator {
    /// Number of documents to generate
    pub total_events: Option<u64>,
    /// Size of the corpus to generate, for example `20MiB`
    pub size: Option<String>,
    #[serde(default)]
    pub template: CorporaTemplate,
    #[serde(default)]
    pub config: CorporaAsset,
    #[serde(default)]
    pub fields: CorporaAsset,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorporaTemplate {
    pub raw: Option<String>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub template_type: Option<String>,
}

/// An asset given either inline or as a path relative to the benchmark directory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorporaAsset {
    pub raw: Option<serde_yaml::Value>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputService {
    pub name: String,
    /// Signal sent to the service once the agents have the benchmark policy
    pub signal: Option<String>,
}

impl Scenario {
    /// The parameters echoed into reports and metrics events.
    pub fn parameters(&self) -> ScenarioParameters {
        ScenarioParameters {
            package_version: self.version.clone(),
            input: self.input.clone(),
            vars: self.vars.clone(),
            data_stream: DataStreamParameters {
                name: self.data_stream.name.clone(),
                vars: self.data_stream.vars.clone(),
            },
            warmup_time_period_secs: self.warmup_time_period.as_secs(),
            benchmark_time_period_secs: self.benchmark_time_period.map(|d| d.as_secs()),
            wait_for_data_timeout_secs: self.wait_for_data_timeout.as_secs(),
            corpora: CorporaParameters {
                generator: self.corpora.generator.as_ref().map(|g| GeneratorParameters {
                    total_events: g.total_events,
                    size: g.size.clone(),
                    template_type: g.template.template_type.clone().unwrap_or_default(),
                    template_path: g.template.path.clone(),
                    config_path: g.config.path.clone(),
                    fields_path: g.fields.path.clone(),
                }),
                input_service: self.corpora.input_service.as_ref().map(|s| {
                    InputServiceParameters {
                        name: s.name.clone(),
                        signal: s.signal.clone(),
                    }
                }),
            },
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ScenarioError> {
        if let Some(deployer) = &self.deployer {
            if !KNOWN_DEPLOYERS.contains(&deployer.as_str()) {
                return Err(ScenarioError::InvalidDeployer {
                    path: path.to_path_buf(),
                    name: deployer.clone(),
                });
            }
        }

        if let Some(size) = self.corpora.generator.as_ref().and_then(|g| g.size.as_ref()) {
            if parse_size(size).is_none() {
                return Err(ScenarioError::InvalidSize {
                    path: path.to_path_buf(),
                    size: size.clone(),
                });
            }
        }

        Ok(())
    }
}

/// The directory holding the scenarios of a package.
pub fn benchmark_dir(package_root: &Path) -> PathBuf {
    package_root.join(BENCHMARK_DEV_PATH)
}

/// Read scenario `name` from `bench_dir`, rendered against `ctx`.
pub fn read_scenario(
    bench_dir: &Path,
    name: &str,
    ctx: &ServiceContext,
) -> Result<Scenario, ScenarioError> {
    let path = bench_dir.join(format!("{name}.yml"));
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScenarioError::NotFound(path))
        }
        Err(source) => return Err(ScenarioError::Read { path, source }),
    };

    let rendered = render(&path, &raw, ctx)?;
    let scenario: Scenario = serde_yaml::from_str(&rendered).map_err(|source| {
        ScenarioError::Decode {
            path: path.clone(),
            source,
        }
    })?;
    scenario.validate(&path)?;

    Ok(scenario)
}

/// Read scenario `name` without a running service, every context value renders empty.
pub fn read_scenario_static(bench_dir: &Path, name: &str) -> Result<Scenario, ScenarioError> {
    read_scenario(bench_dir, name, &ServiceContext::default())
}

/// Load every scenario of a package for validation, sorted by name.
pub fn discover_scenarios(package_root: &Path) -> anyhow::Result<Vec<(String, Scenario)>> {
    let bench_dir = benchmark_dir(package_root);
    if !bench_dir.is_dir() {
        log::debug!("No system benchmarks in {}", package_root.display());
        return Ok(Vec::new());
    }

    let mut scenarios = Vec::new();
    for entry in WalkDir::new(&bench_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("yml")
        {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let scenario = read_scenario_static(&bench_dir, name)?;
        scenarios.push((name.to_string(), scenario));
    }

    Ok(scenarios)
}

fn render(path: &Path, raw: &str, ctx: &ServiceContext) -> Result<String, ScenarioError> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    for (name, value) in ctx.aliases() {
        registry.register_helper(&name, Box::new(AliasHelper(value)));
    }

    registry
        .render_template(raw, ctx)
        .map_err(|e| ScenarioError::Template {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

struct AliasHelper(String);

impl HelperDef for AliasHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        _: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        Ok(ScopedJson::Derived(serde_json::Value::String(
            self.0.clone(),
        )))
    }
}

fn default_wait_for_data_timeout() -> Duration {
    DEFAULT_WAIT_FOR_DATA_TIMEOUT
}

/// A duration written as `30s`, `1m 30s` or a bare number of seconds.
struct ScenarioDuration(Duration);

impl<'de> Deserialize<'de> for ScenarioDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = ScenarioDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s) or integer seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ScenarioDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| ScenarioDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let v = v.trim();
                if let Ok(secs) = v.parse::<u64>() {
                    return Ok(ScenarioDuration(Duration::from_secs(secs)));
                }
                humantime::parse_duration(v)
                    .map(ScenarioDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    ScenarioDuration::deserialize(deserializer).map(|d| d.0)
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<ScenarioDuration>::deserialize(deserializer)?;
    Ok(value.map(|d| d.0).filter(|d| !d.is_zero()))
}
