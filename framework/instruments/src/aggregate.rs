//! Reduction of per-processor pipeline stats into ranked performance values.
//!
//! ```text
//! aggregate(stats, sources, processor_key, by_absolute_time)?
//!     .filter(non_zero)
//!     .sort_by(descending)
//!     .top(10)
//!     .collect(as_percentage_of(total));
//! ```

use crate::source::{PipelineSource, Processor};
use ingest_bench_summary_model::{BenchmarkValue, NodePipelineStats, StatsRecord};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

const NANOS_PER_MILLI: i64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("unexpected pipeline '{0}'")]
    UnexpectedPipeline(String),
    #[error("pipeline '{pipeline}' processor count mismatch. source={declared} stats={reported}")]
    ProcessorCountMismatch {
        pipeline: String,
        declared: usize,
        reported: usize,
    },
    #[error("failure processing pipeline '{file}': {reason}")]
    PipelineSource { file: String, reason: String },
}

/// The measured value of one processor occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorPerformance {
    /// Identifies the processor occurrence, empty for processors that must not be ranked
    pub key: String,
    /// Nanoseconds
    pub value: i64,
}

/// An intermediate set of [ProcessorPerformance] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    entries: Vec<ProcessorPerformance>,
}

impl From<Vec<ProcessorPerformance>> for Aggregation {
    fn from(entries: Vec<ProcessorPerformance>) -> Self {
        Self { entries }
    }
}

/// Emit one entry for every processor of every pipeline on every node.
///
/// Fails if a pipeline has no known source, or if the number of processors reported for a
/// pipeline differs from its source, which means it was modified while being measured.
pub fn aggregate<K, V>(
    stats: &NodePipelineStats,
    sources: &[PipelineSource],
    key: K,
    value: V,
) -> Result<Aggregation, AggregationError>
where
    K: Fn(&PipelineSource, &Processor) -> String,
    V: Fn(&StatsRecord) -> i64,
{
    let sources = sources
        .iter()
        .map(|s| (s.name.as_str(), s))
        .collect::<HashMap<_, _>>();
    let mut processors_by_pipeline = HashMap::<&str, Vec<Processor>>::new();
    let mut entries = Vec::new();

    for pipelines in stats.values() {
        for (pipeline_name, pipeline_stats) in pipelines {
            let source: &PipelineSource = sources
                .get(pipeline_name.as_str())
                .copied()
                .ok_or_else(|| AggregationError::UnexpectedPipeline(pipeline_name.clone()))?;

            if !processors_by_pipeline.contains_key(source.name.as_str()) {
                processors_by_pipeline.insert(source.name.as_str(), source.processors()?);
            }
            let processors = &processors_by_pipeline[source.name.as_str()];

            if processors.len() != pipeline_stats.processors.len() {
                return Err(AggregationError::ProcessorCountMismatch {
                    pipeline: pipeline_name.clone(),
                    declared: processors.len(),
                    reported: pipeline_stats.processors.len(),
                });
            }

            entries.extend(processors.iter().zip(&pipeline_stats.processors).map(
                |(processor, processor_stats)| ProcessorPerformance {
                    key: key(source, processor),
                    value: value(&processor_stats.stats),
                },
            ));
        }
    }

    Ok(Aggregation { entries })
}

impl Aggregation {
    pub fn entries(&self) -> &[ProcessorPerformance] {
        &self.entries
    }

    pub fn filter(mut self, mut keep: impl FnMut(&ProcessorPerformance) -> bool) -> Self {
        self.entries.retain(|e| keep(e));
        self
    }

    /// Stable sort, entries comparing equal keep their relative order.
    pub fn sort_by(
        mut self,
        compare: impl FnMut(&ProcessorPerformance, &ProcessorPerformance) -> Ordering,
    ) -> Self {
        self.entries.sort_by(compare);
        self
    }

    pub fn top(mut self, n: usize) -> Self {
        self.entries.truncate(n);
        self
    }

    pub fn collect<T>(self, map: impl FnMut(ProcessorPerformance) -> T) -> Vec<T> {
        self.entries.into_iter().map(map).collect()
    }
}

/// `"type @ file:line"`, or empty for `pipeline` processors whose time already includes the
/// processors of the pipeline they call.
pub fn processor_key(source: &PipelineSource, processor: &Processor) -> String {
    if processor.processor_type == "pipeline" {
        return String::new();
    }
    format!(
        "{} @ {}:{}",
        processor.processor_type,
        source.filename(),
        processor.first_line
    )
}

pub fn by_absolute_time(record: &StatsRecord) -> i64 {
    record.time_in_millis * NANOS_PER_MILLI
}

/// Average time per processed document, zero when nothing was processed.
pub fn by_relative_time(record: &StatsRecord) -> i64 {
    if record.count == 0 {
        return 0;
    }
    record.time_in_millis * NANOS_PER_MILLI / record.count
}

pub fn non_zero(entry: &ProcessorPerformance) -> bool {
    !entry.key.is_empty() && entry.value != 0
}

pub fn descending(a: &ProcessorPerformance, b: &ProcessorPerformance) -> Ordering {
    b.value.cmp(&a.value)
}

/// Sum of the time spent in every pipeline on every node.
pub fn total_pipeline_time(stats: &NodePipelineStats) -> Duration {
    let millis = stats
        .values()
        .flat_map(|pipelines| pipelines.values())
        .map(|p| p.stats.time_in_millis.max(0) as u64)
        .sum::<u64>();
    Duration::from_millis(millis)
}

/// Map an entry to its share of `total`, in percent.
pub fn as_percentage_of(total: Duration) -> impl Fn(ProcessorPerformance) -> BenchmarkValue {
    move |perf| {
        let value = if total.is_zero() {
            0.0
        } else {
            perf.value as f64 / total.as_nanos() as f64 * 100.0
        };
        BenchmarkValue {
            description: perf.key.clone(),
            name: perf.key,
            unit: "%".to_string(),
            value,
        }
    }
}

/// Map an entry to its duration, in milliseconds.
pub fn as_duration(perf: ProcessorPerformance) -> BenchmarkValue {
    BenchmarkValue {
        description: perf.key.clone(),
        name: perf.key,
        unit: "ms".to_string(),
        value: perf.value as f64 / NANOS_PER_MILLI as f64,
    }
}

/// Both processor rankings of a benchmark run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorRankings {
    pub by_total_time: Vec<BenchmarkValue>,
    pub by_avg_time: Vec<BenchmarkValue>,
}

/// Rank the top `n` processors by share of total time and by average time per document.
pub fn rank_processors(
    stats: &NodePipelineStats,
    sources: &[PipelineSource],
    n: usize,
) -> Result<ProcessorRankings, AggregationError> {
    let total = total_pipeline_time(stats);

    let by_total_time = aggregate(stats, sources, processor_key, by_absolute_time)?
        .filter(non_zero)
        .sort_by(descending)
        .top(n)
        .collect(as_percentage_of(total));

    let by_avg_time = aggregate(stats, sources, processor_key, by_relative_time)?
        .filter(non_zero)
        .sort_by(descending)
        .top(n)
        .collect(as_duration);

    Ok(ProcessorRankings {
        by_total_time,
        by_avg_time,
    })
}
