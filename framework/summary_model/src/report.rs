use crate::stats::{DataStreamStats, DiskUsage, NodePipelineStats};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;

/// A single named, reportable value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub value: f64,
}

impl std::fmt::Display for BenchmarkValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}{}", self.value, self.unit)
    }
}

/// Identifies a single benchmark run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunInfo {
    /// The benchmark (scenario) name
    pub benchmark: String,
    #[serde(default)]
    pub description: String,
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The package that was benchmarked
    pub package: String,
    /// The time the baseline sample was taken, as a Unix timestamp in seconds.
    pub start_ts: i64,
    /// The time the final sample was taken, as a Unix timestamp in seconds.
    pub end_ts: i64,
    /// `end_ts - start_ts`, in seconds.
    pub duration_secs: i64,
    /// Path of the generated corpus file, empty when the load came from an input service.
    #[serde(default)]
    pub generated_corpora_file: String,
}

/// The scenario parameters, echoed into the report so two reports can be compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioParameters {
    pub package_version: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub data_stream: DataStreamParameters,
    pub warmup_time_period_secs: u64,
    /// Not set when the run ends once ingestion stabilizes.
    pub benchmark_time_period_secs: Option<u64>,
    pub wait_for_data_timeout_secs: u64,
    #[serde(default)]
    pub corpora: CorporaParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataStreamParameters {
    pub name: String,
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorporaParameters {
    pub generator: Option<GeneratorParameters>,
    pub input_service: Option<InputServiceParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratorParameters {
    pub total_events: Option<u64>,
    pub size: Option<String>,
    pub template_type: String,
    pub template_path: Option<String>,
    pub config_path: Option<String>,
    pub fields_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputServiceParameters {
    pub name: String,
    pub signal: Option<String>,
}

/// Run identity plus parameters, attached to every event published to the metrics sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkMetadata {
    pub info: MetadataInfo,
    pub parameters: ScenarioParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataInfo {
    pub benchmark: String,
    pub run_id: String,
}

/// The final artifact of a benchmark run.
///
/// The field names of the JSON encoding are stable so that tooling can diff two reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchReport {
    pub info: RunInfo,
    pub parameters: ScenarioParameters,
    pub cluster_name: String,
    /// Number of nodes seen in the final sample
    pub nodes: usize,
    pub data_stream_stats: Option<DataStreamStats>,
    /// Net number of documents ingested between the baseline and the final sample
    pub total_hits: i64,
    #[serde(default)]
    pub disk_usage: BTreeMap<String, DiskUsage>,
    /// Per-node, per-pipeline difference between the final and the baseline pipeline stats
    #[serde(default)]
    pub ingest_pipeline_stats: NodePipelineStats,
    /// Top processors ranked by their share of the total pipeline time
    #[serde(default)]
    pub top_processors_by_total_time: Vec<BenchmarkValue>,
    /// Top processors ranked by average time per document
    #[serde(default)]
    pub top_processors_by_avg_time: Vec<BenchmarkValue>,
    /// The version of the benchmark runner that produced this report
    pub ingest_bench_version: String,
}

impl BenchReport {
    /// Compute a fingerprint for the configuration of this run
    ///
    /// Two reports with the same fingerprint ran the same scenario with the same parameters and
    /// can be compared. It uses the
    ///     - Benchmark name
    ///     - Package and package version
    ///     - Input, vars and data stream configuration
    ///     - Warm-up, benchmark and wait-for-data periods
    ///     - Corpus configuration
    ///     - Runner version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.info.benchmark.as_bytes());
        Digest::update(&mut hasher, self.info.package.as_bytes());

        let params = &self.parameters;
        Digest::update(&mut hasher, params.package_version.as_bytes());
        Digest::update(&mut hasher, params.input.as_bytes());
        hash_vars(&mut hasher, &params.vars);
        Digest::update(&mut hasher, params.data_stream.name.as_bytes());
        hash_vars(&mut hasher, &params.data_stream.vars);
        Digest::update(&mut hasher, params.warmup_time_period_secs.to_le_bytes());
        if let Some(period) = params.benchmark_time_period_secs {
            Digest::update(&mut hasher, period.to_le_bytes());
        }
        Digest::update(&mut hasher, params.wait_for_data_timeout_secs.to_le_bytes());
        if let Some(generator) = &params.corpora.generator {
            if let Some(total_events) = generator.total_events {
                Digest::update(&mut hasher, total_events.to_le_bytes());
            }
            [
                generator.size.as_deref(),
                Some(generator.template_type.as_str()),
                generator.template_path.as_deref(),
                generator.config_path.as_deref(),
                generator.fields_path.as_deref(),
            ]
            .into_iter()
            .flatten()
            .for_each(|v| Digest::update(&mut hasher, v.as_bytes()));
        }
        if let Some(service) = &params.corpora.input_service {
            Digest::update(&mut hasher, service.name.as_bytes());
        }
        Digest::update(&mut hasher, self.ingest_bench_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

fn hash_vars(hasher: &mut sha3::Sha3_256, vars: &BTreeMap<String, serde_json::Value>) {
    vars.iter()
        .sorted_by_key(|(k, _)| k.to_owned())
        .for_each(|(k, v)| {
            Digest::update(hasher, k.as_bytes());
            Digest::update(hasher, v.to_string().as_bytes());
        });
}
